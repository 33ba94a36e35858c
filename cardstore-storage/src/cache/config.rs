//! Card cache configuration and the per-type TTL table.

use std::collections::HashMap;
use std::time::Duration;

use cardstore_core::CardType;

/// Default maximum number of cached cards.
pub const DEFAULT_CACHE_MAX_SIZE: usize = 1000;

/// TTL for card types missing from the table.
pub const DEFAULT_CARD_TTL: Duration = Duration::from_secs(3600);

/// Configuration for the card cache.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Maximum number of entries held at once.
    pub max_size: usize,
    /// TTL for types without an explicit entry.
    pub default_ttl: Duration,
    /// Per-type TTLs. Voice changes least often, insights most.
    pub ttls: HashMap<CardType, Duration>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        let ttls = HashMap::from([
            (CardType::Voice, Duration::from_secs(7200)),
            (CardType::Company, Duration::from_secs(3600)),
            (CardType::Audience, Duration::from_secs(3600)),
            (CardType::Insight, Duration::from_secs(1800)),
        ]);
        Self {
            max_size: DEFAULT_CACHE_MAX_SIZE,
            default_ttl: DEFAULT_CARD_TTL,
            ttls,
        }
    }
}

impl CacheConfig {
    /// Create a new cache config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the maximum number of entries.
    pub fn with_max_size(mut self, max_size: usize) -> Self {
        self.max_size = max_size;
        self
    }

    /// Set the TTL used for types without an explicit entry.
    pub fn with_default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = ttl;
        self
    }

    /// Override the TTL for one card type.
    pub fn with_ttl(mut self, card_type: CardType, ttl: Duration) -> Self {
        self.ttls.insert(card_type, ttl);
        self
    }

    /// Drop the explicit TTL for one card type so it falls back to the default.
    pub fn without_ttl(mut self, card_type: CardType) -> Self {
        self.ttls.remove(&card_type);
        self
    }

    /// TTL for a card of the given type.
    pub fn ttl_for(&self, card_type: CardType) -> Duration {
        self.ttls.get(&card_type).copied().unwrap_or(self.default_ttl)
    }
}
