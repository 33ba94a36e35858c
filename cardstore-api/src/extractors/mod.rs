//! Custom request extractors.

pub mod path_id;
pub mod tenant;

pub use path_id::CardPath;
pub use tenant::{IdempotencyKey, Tenant, TraceId};
