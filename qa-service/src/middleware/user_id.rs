use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use service_core::error::AppError;

/// Header carrying the caller authenticated by the gateway.
pub const USER_ID_HEADER: &str = "X-User-ID";

/// Caller identity asserted by the gateway.
///
/// The chat payload also names a `userId`; it is only honoured when it
/// matches this header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallerId(pub i64);

impl CallerId {
    /// Reject a payload acting on behalf of someone else.
    pub fn assert_owns(&self, user_id: i64) -> Result<(), AppError> {
        if self.0 != user_id {
            tracing::warn!(
                caller_id = self.0,
                payload_user_id = user_id,
                "Payload userId does not match caller"
            );
            return Err(AppError::Forbidden(anyhow::anyhow!(
                "userId does not match the authenticated caller"
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for CallerId
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let raw = parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| {
                AppError::Unauthorized(anyhow::anyhow!(
                    "Missing X-User-ID header (required from gateway)"
                ))
            })?;

        let user_id = raw
            .trim()
            .parse::<i64>()
            .ok()
            .filter(|id| *id > 0)
            .ok_or_else(|| AppError::Unauthorized(anyhow::anyhow!("Malformed X-User-ID header")))?;

        Ok(CallerId(user_id))
    }
}
