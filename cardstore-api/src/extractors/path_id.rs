//! Path extractor for card ids.
//!
//! The stock `Path<Uuid>` rejection is plain text; `CardPath` rejects with
//! the JSON error body every other endpoint uses.

use axum::{
    async_trait,
    extract::{FromRequestParts, Path},
    http::request::Parts,
};
use cardstore_core::CardId;
use uuid::Uuid;

use crate::error::ApiError;

/// A card id taken from the `{card_id}` path segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CardPath(pub CardId);

#[async_trait]
impl<S> FromRequestParts<S> for CardPath
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Path(raw): Path<String> = Path::from_request_parts(parts, state)
            .await
            .map_err(|_| ApiError::invalid_format("card_id", "UUID"))?;
        let id = Uuid::parse_str(&raw).map_err(|_| {
            ApiError::invalid_format("card_id", "UUID")
                .with_details(serde_json::json!({ "path_param": raw }))
        })?;
        Ok(CardPath(id))
    }
}
