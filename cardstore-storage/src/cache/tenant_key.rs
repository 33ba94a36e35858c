//! Tenant-scoped cache key.
//!
//! `TenantScopedKey`'s private inner struct means a cache slot can only be
//! addressed with an explicit tenant. Two tenants asking for the same card
//! id always land on different slots.

use cardstore_core::{CardId, TenantId};

/// A cache key that is scoped to a specific tenant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TenantScopedKey {
    /// Private inner data - cannot be constructed externally
    inner: TenantKeyInner,
}

/// Private inner struct - prevents external construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct TenantKeyInner {
    tenant_id: TenantId,
    card_id: CardId,
}

impl TenantScopedKey {
    /// Create a new tenant-scoped cache key.
    ///
    /// This is the only way to construct a `TenantScopedKey`.
    pub fn new(tenant_id: TenantId, card_id: CardId) -> Self {
        Self {
            inner: TenantKeyInner { tenant_id, card_id },
        }
    }

    /// Get the tenant ID this key is scoped to.
    pub fn tenant_id(&self) -> TenantId {
        self.inner.tenant_id
    }

    /// Get the card ID for this key.
    pub fn card_id(&self) -> CardId {
        self.inner.card_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_new_and_getters() {
        let tenant_id = Uuid::now_v7();
        let card_id = Uuid::now_v7();
        let key = TenantScopedKey::new(tenant_id, card_id);
        assert_eq!(key.tenant_id(), tenant_id);
        assert_eq!(key.card_id(), card_id);
    }

    #[test]
    fn test_different_tenants_different_keys() {
        let card_id = Uuid::now_v7();
        let key1 = TenantScopedKey::new(Uuid::now_v7(), card_id);
        let key2 = TenantScopedKey::new(Uuid::now_v7(), card_id);
        assert_ne!(key1, key2);
    }
}
