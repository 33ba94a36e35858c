//! PostgreSQL card store and usage tracking.

use std::collections::HashMap;

use async_trait::async_trait;
use cardstore_core::{
    new_entity_id, Card, CardCreate, CardFilter, CardId, CardStoreError, CardStoreResult,
    CardType, EntityType, StorageError, TenantId, UsageEvent, UsageOutcome, ValidationError,
};
use cardstore_storage::{CardStore, UsageStore};
use tokio_postgres::types::ToSql;
use tokio_postgres::Row;

use crate::db::{db_error, is_unique_violation, tenant_transaction, DbClient};

const CARD_COLUMNS: &str = "card_id, tenant_id, card_type, content, content_hash, \
     source_session_id, created_by, is_active, deleted_at, created_at, updated_at, \
     usage_count, last_used_at";

/// Card store backed by the `cards` and `card_usage` tables.
#[derive(Clone)]
pub struct PgCardStore {
    db: DbClient,
}

impl PgCardStore {
    pub fn new(db: DbClient) -> Self {
        Self { db }
    }
}

fn card_from_row(row: &Row) -> CardStoreResult<Card> {
    let card_type: String = row.try_get("card_type").map_err(db_error)?;
    let card_type: CardType = card_type.parse().map_err(|e: ValidationError| {
        CardStoreError::from(StorageError::Serialization {
            reason: e.to_string(),
        })
    })?;

    Ok(Card {
        card_id: row.try_get("card_id").map_err(db_error)?,
        tenant_id: row.try_get("tenant_id").map_err(db_error)?,
        card_type,
        content: row.try_get("content").map_err(db_error)?,
        content_hash: row.try_get("content_hash").map_err(db_error)?,
        source_session_id: row.try_get("source_session_id").map_err(db_error)?,
        created_by: row.try_get("created_by").map_err(db_error)?,
        is_active: row.try_get("is_active").map_err(db_error)?,
        deleted_at: row.try_get("deleted_at").map_err(db_error)?,
        created_at: row.try_get("created_at").map_err(db_error)?,
        updated_at: row.try_get("updated_at").map_err(db_error)?,
        usage_count: row.try_get("usage_count").map_err(db_error)?,
        last_used_at: row.try_get("last_used_at").map_err(db_error)?,
    })
}

/// Check tenant ownership and content of every card before any write.
fn prepare(cards: &[CardCreate], tenant_id: TenantId) -> CardStoreResult<()> {
    for card in cards {
        if card.tenant_id != tenant_id {
            return Err(ValidationError::TenantMismatch {
                expected: tenant_id,
                got: card.tenant_id,
            }
            .into());
        }
        card.validate()?;
    }
    Ok(())
}

#[async_trait]
impl CardStore for PgCardStore {
    async fn create(&self, card: CardCreate) -> CardStoreResult<Card> {
        let tenant_id = card.tenant_id;
        let mut created = self.batch_create(vec![card], tenant_id).await?;
        created.pop().ok_or_else(|| {
            StorageError::TransactionFailed {
                reason: "insert returned no row".to_string(),
            }
            .into()
        })
    }

    async fn get(&self, card_id: CardId, tenant_id: TenantId) -> CardStoreResult<Option<Card>> {
        let mut conn = self.db.get_conn().await?;
        let tx = tenant_transaction(&mut conn, tenant_id).await?;
        let sql = format!(
            "SELECT {CARD_COLUMNS} FROM cards \
             WHERE card_id = $1 AND tenant_id = $2 AND is_active = true"
        );
        let row = tx
            .query_opt(&sql, &[&card_id, &tenant_id])
            .await
            .map_err(db_error)?;
        tx.commit().await.map_err(db_error)?;
        row.as_ref().map(card_from_row).transpose()
    }

    async fn get_many(
        &self,
        card_ids: &[CardId],
        tenant_id: TenantId,
    ) -> CardStoreResult<Vec<Card>> {
        if card_ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut conn = self.db.get_conn().await?;
        let tx = tenant_transaction(&mut conn, tenant_id).await?;
        let sql = format!(
            "SELECT {CARD_COLUMNS} FROM cards \
             WHERE card_id = ANY($1) AND tenant_id = $2 AND is_active = true"
        );
        let rows = tx
            .query(&sql, &[&card_ids, &tenant_id])
            .await
            .map_err(db_error)?;
        tx.commit().await.map_err(db_error)?;

        let mut by_id: HashMap<CardId, Card> = HashMap::with_capacity(rows.len());
        for row in &rows {
            let card = card_from_row(row)?;
            by_id.insert(card.card_id, card);
        }
        Ok(card_ids.iter().filter_map(|id| by_id.remove(id)).collect())
    }

    async fn list(&self, filter: &CardFilter) -> CardStoreResult<Vec<Card>> {
        filter.validate()?;

        let mut clauses = vec!["tenant_id = $1".to_string(), "is_active = $2".to_string()];
        let mut params: Vec<Box<dyn ToSql + Sync + Send>> =
            vec![Box::new(filter.tenant_id), Box::new(filter.is_active)];
        if let Some(card_type) = filter.card_type {
            params.push(Box::new(card_type.as_str().to_string()));
            clauses.push(format!("card_type = ${}", params.len()));
        }
        if let Some(session_id) = filter.source_session_id {
            params.push(Box::new(session_id));
            clauses.push(format!("source_session_id = ${}", params.len()));
        }
        params.push(Box::new(filter.limit));
        let limit_idx = params.len();
        params.push(Box::new(filter.offset));
        let offset_idx = params.len();

        let sql = format!(
            "SELECT {CARD_COLUMNS} FROM cards WHERE {} \
             ORDER BY created_at DESC, card_id DESC LIMIT ${} OFFSET ${}",
            clauses.join(" AND "),
            limit_idx,
            offset_idx
        );
        let refs: Vec<&(dyn ToSql + Sync)> = params
            .iter()
            .map(|p| p.as_ref() as &(dyn ToSql + Sync))
            .collect();

        let mut conn = self.db.get_conn().await?;
        let tx = tenant_transaction(&mut conn, filter.tenant_id).await?;
        let rows = tx.query(&sql, &refs).await.map_err(db_error)?;
        tx.commit().await.map_err(db_error)?;
        rows.iter().map(card_from_row).collect()
    }

    async fn soft_delete(&self, card_id: CardId, tenant_id: TenantId) -> CardStoreResult<bool> {
        let mut conn = self.db.get_conn().await?;
        let tx = tenant_transaction(&mut conn, tenant_id).await?;
        let affected = tx
            .execute(
                "UPDATE cards SET is_active = false, deleted_at = NOW(), updated_at = NOW() \
                 WHERE card_id = $1 AND tenant_id = $2 AND is_active = true",
                &[&card_id, &tenant_id],
            )
            .await
            .map_err(db_error)?;
        tx.commit().await.map_err(db_error)?;
        Ok(affected > 0)
    }

    async fn batch_create(
        &self,
        cards: Vec<CardCreate>,
        tenant_id: TenantId,
    ) -> CardStoreResult<Vec<Card>> {
        prepare(&cards, tenant_id)?;

        let mut conn = self.db.get_conn().await?;
        let tx = tenant_transaction(&mut conn, tenant_id).await?;
        let sql = format!(
            "INSERT INTO cards (card_id, tenant_id, card_type, content, content_hash, \
             source_session_id, created_by) VALUES ($1, $2, $3, $4, $5, $6, $7) \
             RETURNING {CARD_COLUMNS}"
        );
        let stmt = tx.prepare_cached(&sql).await.map_err(db_error)?;

        let mut created = Vec::with_capacity(cards.len());
        for card in cards {
            let card_id = new_entity_id();
            let content_hash = card.content_hash();
            let row = tx
                .query_one(
                    &stmt,
                    &[
                        &card_id,
                        &tenant_id,
                        &card.card_type.as_str(),
                        &card.content,
                        &content_hash,
                        &card.source_session_id,
                        &card.created_by,
                    ],
                )
                .await
                .map_err(|e| {
                    if is_unique_violation(&e) {
                        StorageError::Conflict {
                            tenant_id,
                            card_type: card.card_type,
                            content_hash: content_hash.clone(),
                        }
                        .into()
                    } else {
                        db_error(e)
                    }
                })?;
            created.push(card_from_row(&row)?);
        }

        tx.commit().await.map_err(db_error)?;
        Ok(created)
    }
}

#[async_trait]
impl UsageStore for PgCardStore {
    async fn track_usage(&self, event: &UsageEvent) -> CardStoreResult<UsageOutcome> {
        event.validate()?;

        let mut conn = self.db.get_conn().await?;
        let tx = tenant_transaction(&mut conn, event.tenant_id).await?;

        let row = tx
            .query_opt(
                "UPDATE cards SET usage_count = usage_count + 1, last_used_at = NOW(), \
                 updated_at = NOW() \
                 WHERE card_id = $1 AND tenant_id = $2 AND is_active = true \
                 RETURNING usage_count, last_used_at",
                &[&event.card_id, &event.tenant_id],
            )
            .await
            .map_err(db_error)?;
        let Some(row) = row else {
            return Err(StorageError::NotFound {
                entity_type: EntityType::Card,
                id: event.card_id.to_string(),
            }
            .into());
        };

        let inserted = tx
            .execute(
                "INSERT INTO card_usage (event_id, card_id, tenant_id, workflow_id, \
                 workflow_type, session_id) VALUES ($1, $2, $3, $4, $5, $6) \
                 ON CONFLICT (tenant_id, card_id, workflow_id) DO NOTHING",
                &[
                    &new_entity_id(),
                    &event.card_id,
                    &event.tenant_id,
                    &event.workflow_id,
                    &event.workflow_type,
                    &event.session_id,
                ],
            )
            .await
            .map_err(db_error)?;

        tx.commit().await.map_err(db_error)?;

        Ok(UsageOutcome {
            card_id: event.card_id,
            usage_count: row.try_get("usage_count").map_err(db_error)?,
            last_used_at: row.try_get("last_used_at").map_err(db_error)?,
            event_recorded: inserted > 0,
        })
    }
}
