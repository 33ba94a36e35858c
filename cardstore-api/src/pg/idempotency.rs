//! PostgreSQL idempotency store.
//!
//! One row per (idempotency_key, tenant_id). A NULL `response_payload`
//! marks a pending reservation whose lease ends at `expires_at`; a
//! non-NULL payload is a finished result replayable until `expires_at`.

use std::time::Duration;

use async_trait::async_trait;
use cardstore_core::{CardStoreResult, StorageError, TenantId};
use cardstore_storage::{IdempotencyStore, Reservation};
use chrono::Utc;
use serde_json::Value;

use crate::db::{db_error, tenant_transaction, DbClient};

#[derive(Clone)]
pub struct PgIdempotencyStore {
    db: DbClient,
}

impl PgIdempotencyStore {
    pub fn new(db: DbClient) -> Self {
        Self { db }
    }
}

fn expiry_after(ttl: Duration) -> CardStoreResult<chrono::DateTime<Utc>> {
    chrono::Duration::from_std(ttl)
        .map(|d| Utc::now() + d)
        .map_err(|e| {
            StorageError::Serialization {
                reason: format!("ttl out of range: {}", e),
            }
            .into()
        })
}

#[async_trait]
impl IdempotencyStore for PgIdempotencyStore {
    async fn get(&self, key: &str, tenant_id: TenantId) -> CardStoreResult<Option<Value>> {
        let mut conn = self.db.get_conn().await?;
        let tx = tenant_transaction(&mut conn, tenant_id).await?;
        let row = tx
            .query_opt(
                "SELECT response_payload FROM idempotency_store \
                 WHERE idempotency_key = $1 AND tenant_id = $2 \
                 AND expires_at > NOW() AND response_payload IS NOT NULL",
                &[&key, &tenant_id],
            )
            .await
            .map_err(db_error)?;
        tx.commit().await.map_err(db_error)?;
        match row {
            Some(row) => Ok(row.try_get("response_payload").map_err(db_error)?),
            None => Ok(None),
        }
    }

    async fn set(
        &self,
        key: &str,
        tenant_id: TenantId,
        payload: &Value,
        ttl: Duration,
    ) -> CardStoreResult<()> {
        let expires_at = expiry_after(ttl)?;
        let mut conn = self.db.get_conn().await?;
        let tx = tenant_transaction(&mut conn, tenant_id).await?;
        tx.execute(
            "INSERT INTO idempotency_store \
             (idempotency_key, tenant_id, response_payload, expires_at) \
             VALUES ($1, $2, $3, $4) \
             ON CONFLICT (idempotency_key, tenant_id) DO UPDATE SET \
             response_payload = EXCLUDED.response_payload, \
             expires_at = EXCLUDED.expires_at",
            &[&key, &tenant_id, payload, &expires_at],
        )
        .await
        .map_err(db_error)?;
        tx.commit().await.map_err(db_error)?;
        Ok(())
    }

    async fn delete(&self, key: &str, tenant_id: TenantId) -> CardStoreResult<bool> {
        let mut conn = self.db.get_conn().await?;
        let tx = tenant_transaction(&mut conn, tenant_id).await?;
        let affected = tx
            .execute(
                "DELETE FROM idempotency_store WHERE idempotency_key = $1 AND tenant_id = $2",
                &[&key, &tenant_id],
            )
            .await
            .map_err(db_error)?;
        tx.commit().await.map_err(db_error)?;
        Ok(affected > 0)
    }

    async fn purge_expired(&self) -> CardStoreResult<u64> {
        // Cross-tenant; the SECURITY DEFINER function runs as the maintenance role.
        let conn = self.db.get_conn().await?;
        let row = conn
            .query_one("SELECT cardstore_purge_expired_idempotency() AS purged", &[])
            .await
            .map_err(db_error)?;
        let purged: i64 = row.try_get("purged").map_err(db_error)?;
        Ok(u64::try_from(purged).unwrap_or(0))
    }

    async fn reserve(
        &self,
        key: &str,
        tenant_id: TenantId,
        lease_ttl: Duration,
    ) -> CardStoreResult<Reservation> {
        let lease_until = expiry_after(lease_ttl)?;
        let mut conn = self.db.get_conn().await?;
        let tx = tenant_transaction(&mut conn, tenant_id).await?;

        // Claims the key when absent or expired. A live row makes the
        // conditional update a no-op and RETURNING yields nothing.
        let claimed = tx
            .query_opt(
                "INSERT INTO idempotency_store \
                 (idempotency_key, tenant_id, response_payload, expires_at) \
                 VALUES ($1, $2, NULL, $3) \
                 ON CONFLICT (idempotency_key, tenant_id) DO UPDATE SET \
                 response_payload = NULL, expires_at = EXCLUDED.expires_at, created_at = NOW() \
                 WHERE idempotency_store.expires_at <= NOW() \
                 RETURNING idempotency_key",
                &[&key, &tenant_id, &lease_until],
            )
            .await
            .map_err(db_error)?;

        let reservation = if claimed.is_some() {
            Reservation::Acquired
        } else {
            let row = tx
                .query_opt(
                    "SELECT response_payload FROM idempotency_store \
                     WHERE idempotency_key = $1 AND tenant_id = $2",
                    &[&key, &tenant_id],
                )
                .await
                .map_err(db_error)?;
            let payload: Option<Value> = match row {
                Some(row) => row.try_get("response_payload").map_err(db_error)?,
                None => None,
            };
            match payload {
                Some(payload) => Reservation::Completed(payload),
                None => Reservation::InFlight,
            }
        };

        tx.commit().await.map_err(db_error)?;
        Ok(reservation)
    }

    async fn release(&self, key: &str, tenant_id: TenantId) -> CardStoreResult<()> {
        let mut conn = self.db.get_conn().await?;
        let tx = tenant_transaction(&mut conn, tenant_id).await?;
        tx.execute(
            "DELETE FROM idempotency_store \
             WHERE idempotency_key = $1 AND tenant_id = $2 AND response_payload IS NULL",
            &[&key, &tenant_id],
        )
        .await
        .map_err(db_error)?;
        tx.commit().await.map_err(db_error)?;
        Ok(())
    }
}
