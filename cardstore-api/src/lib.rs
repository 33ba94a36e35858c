//! Card Store API - HTTP Service Layer
//!
//! Exposes the context card store over REST (axum). PostgreSQL backs the
//! card and idempotency stores in production; the in-memory backends from
//! `cardstore-storage` plug into the same `AppState` for tests.

pub mod config;
pub mod db;
pub mod error;
pub mod extractors;
pub mod jobs;
pub mod openapi;
pub mod pg;
pub mod routes;
pub mod state;
pub mod telemetry;
pub mod types;

pub use config::ServiceConfig;
pub use db::{DbClient, DbConfig};
pub use error::{ApiError, ApiResult, ErrorCode};
pub use openapi::ApiDoc;
pub use routes::create_router;
pub use state::{AppState, Backends};
pub use types::*;
