//! Request header extractors.
//!
//! `X-Tenant-ID` scopes every card operation and is mandatory.
//! `X-Trace-ID` and `Idempotency-Key` are read where a handler needs them.

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{request::Parts, HeaderMap},
};
use cardstore_core::{parse_tenant_id, TenantId};

use crate::error::ApiError;

pub const TENANT_HEADER: &str = "x-tenant-id";
pub const TRACE_HEADER: &str = "x-trace-id";
pub const IDEMPOTENCY_HEADER: &str = "idempotency-key";

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// Tenant resolved from the `X-Tenant-ID` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tenant(pub TenantId);

#[async_trait]
impl<S> FromRequestParts<S> for Tenant
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let raw = match parts.headers.get(TENANT_HEADER) {
            None => return Err(ApiError::validation_failed("X-Tenant-ID header is required")),
            Some(value) => value
                .to_str()
                .map_err(|_| ApiError::validation_failed("X-Tenant-ID must be a valid UUID"))?,
        };
        Ok(Tenant(parse_tenant_id(raw)?))
    }
}

/// Optional caller-supplied trace id from `X-Trace-ID`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TraceId(pub Option<String>);

#[async_trait]
impl<S> FromRequestParts<S> for TraceId
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let trace = header_str(&parts.headers, TRACE_HEADER)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string);
        Ok(TraceId(trace))
    }
}

/// Raw `Idempotency-Key` header. Length rules are enforced by the batch service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdempotencyKey(pub String);

#[async_trait]
impl<S> FromRequestParts<S> for IdempotencyKey
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        header_str(&parts.headers, IDEMPOTENCY_HEADER)
            .map(|key| IdempotencyKey(key.to_string()))
            .ok_or_else(|| ApiError::missing_field("Idempotency-Key"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use axum::http::Request;
    use uuid::Uuid;

    fn parts_with(headers: &[(&str, &str)]) -> Parts {
        let mut builder = Request::builder().uri("/");
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        builder.body(()).unwrap().into_parts().0
    }

    #[tokio::test]
    async fn test_tenant_extracted() {
        let tenant = Uuid::new_v4();
        let mut parts = parts_with(&[("X-Tenant-ID", &tenant.to_string())]);
        let Tenant(got) = Tenant::from_request_parts(&mut parts, &()).await.unwrap();
        assert_eq!(got, tenant);
    }

    #[tokio::test]
    async fn test_tenant_missing_or_malformed() {
        let mut parts = parts_with(&[]);
        let err = Tenant::from_request_parts(&mut parts, &()).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::ValidationFailed);

        let mut parts = parts_with(&[("X-Tenant-ID", "acme")]);
        let err = Tenant::from_request_parts(&mut parts, &()).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::ValidationFailed);
    }

    #[tokio::test]
    async fn test_trace_id_optional() {
        let mut parts = parts_with(&[("X-Trace-ID", "abc123")]);
        let TraceId(trace) = TraceId::from_request_parts(&mut parts, &()).await.unwrap();
        assert_eq!(trace.as_deref(), Some("abc123"));

        let mut parts = parts_with(&[("X-Trace-ID", "  ")]);
        let TraceId(trace) = TraceId::from_request_parts(&mut parts, &()).await.unwrap();
        assert!(trace.is_none());
    }

    #[tokio::test]
    async fn test_idempotency_key_required() {
        let mut parts = parts_with(&[]);
        let err = IdempotencyKey::from_request_parts(&mut parts, &()).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::MissingField);
    }
}
