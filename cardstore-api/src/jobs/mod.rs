//! Background Jobs
//!
//! - `idempotency_sweep`: deletes expired idempotency entries
//!
//! # Usage
//!
//! ```ignore
//! use cardstore_api::jobs::{idempotency_sweep_task, IdempotencySweepConfig};
//! use tokio::sync::watch;
//!
//! let (shutdown_tx, shutdown_rx) = watch::channel(false);
//! let sweep = tokio::spawn(idempotency_sweep_task(store, IdempotencySweepConfig::default(), shutdown_rx));
//!
//! // On shutdown
//! let _ = shutdown_tx.send(true);
//! let _ = sweep.await;
//! ```

pub mod idempotency_sweep;

pub use idempotency_sweep::{
    idempotency_sweep_task, IdempotencySweepConfig, IdempotencySweepMetrics,
    IdempotencySweepSnapshot,
};
