//! Card cache: process-local LRU with per-type TTL and strict tenant keys.
//!
//! Each process keeps its own cache. Nothing is propagated between
//! replicas, so a card soft-deleted through one replica may still be served
//! by another until its TTL runs out.

pub mod card_cache;
pub mod config;
pub mod tenant_key;

pub use card_cache::{CacheStats, CardCache};
pub use config::{CacheConfig, DEFAULT_CACHE_MAX_SIZE, DEFAULT_CARD_TTL};
pub use tenant_key::TenantScopedKey;
