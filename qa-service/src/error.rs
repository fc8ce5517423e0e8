//! Error taxonomy for a chat turn.

use crate::services::providers::ProviderError;
use crate::services::registry::RegistryError;
use service_core::error::AppError;
use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum QaError {
    /// Missing or malformed input, reported before any work begins.
    #[error("Validation error: {0}")]
    Validation(String),

    /// The session exists but belongs to another user.
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// The session registry is unavailable or rejected the call.
    #[error("Upstream error: {0}")]
    Upstream(String),

    /// A registry round trip exceeded its deadline.
    #[error("Upstream timeout: {0}")]
    UpstreamTimeout(String),

    #[error("Generation error: {0}")]
    Generation(#[from] ProviderError),

    #[error("Persistence error: {0}")]
    Persistence(String),
}

impl QaError {
    /// Short label for metrics and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            QaError::Validation(_) => "validation",
            QaError::Forbidden(_) => "forbidden",
            QaError::Upstream(_) => "upstream",
            QaError::UpstreamTimeout(_) => "upstream_timeout",
            QaError::Generation(_) => "generation",
            QaError::Persistence(_) => "persistence",
        }
    }
}

impl From<RegistryError> for QaError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::Timeout(msg) => QaError::UpstreamTimeout(msg),
            RegistryError::Forbidden(msg) => QaError::Forbidden(msg),
            other => QaError::Upstream(other.to_string()),
        }
    }
}

impl From<QaError> for AppError {
    fn from(err: QaError) -> Self {
        match err {
            QaError::Validation(msg) => AppError::BadRequest(anyhow::anyhow!(msg)),
            QaError::Forbidden(msg) => AppError::Forbidden(anyhow::anyhow!(msg)),
            QaError::Upstream(msg) => AppError::BadGateway(msg),
            QaError::UpstreamTimeout(msg) => AppError::GatewayTimeout(msg),
            QaError::Generation(ProviderError::InvalidRequest(msg)) => {
                AppError::BadRequest(anyhow::anyhow!(msg))
            }
            QaError::Generation(ProviderError::RateLimited) => AppError::ServiceUnavailable,
            QaError::Generation(e) => AppError::BadGateway(e.to_string()),
            QaError::Persistence(msg) => AppError::DatabaseError(anyhow::anyhow!(msg)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;

    #[test]
    fn test_registry_timeout_is_not_plain_upstream() {
        let err: QaError = RegistryError::Timeout("lookup".into()).into();
        assert!(matches!(err, QaError::UpstreamTimeout(_)));

        let err: QaError = RegistryError::Unavailable("503".into()).into();
        assert!(matches!(err, QaError::Upstream(_)));
    }

    #[test]
    fn test_http_mapping() {
        let status = |e: QaError| AppError::from(e).status_code();

        assert_eq!(status(QaError::Validation("x".into())), StatusCode::BAD_REQUEST);
        assert_eq!(status(QaError::Forbidden("x".into())), StatusCode::FORBIDDEN);
        assert_eq!(status(QaError::Upstream("x".into())), StatusCode::BAD_GATEWAY);
        assert_eq!(
            status(QaError::UpstreamTimeout("x".into())),
            StatusCode::GATEWAY_TIMEOUT
        );
        assert_eq!(
            status(QaError::Generation(ProviderError::ApiError("x".into()))),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            status(QaError::Persistence("x".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
