//! Client side of the session registry (user-service).
//!
//! Lookup and create are the only two calls the QA service makes. Create
//! results are reported as a [`CreateSessionOutcome`] so the caller can
//! treat a conflict as "someone else created it first" without inspecting
//! transport errors.

use crate::config::UserServiceConfig;
use crate::models::{ChatSession, CreateSessionOutcome};
use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url};
use serde::Serialize;
use service_core::observability::TracedClientExt;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// The round trip exceeded its deadline. Never read as "not found".
    #[error("Session registry timed out: {0}")]
    Timeout(String),

    #[error("Session registry unavailable: {0}")]
    Unavailable(String),

    /// The identifier belongs to another user.
    #[error("Session owned by another user: {0}")]
    Forbidden(String),

    #[error("Session registry rejected the request: {0}")]
    Rejected(String),

    #[error("Unexpected session registry response: {0}")]
    Unexpected(String),
}

#[async_trait]
pub trait SessionRegistry: Send + Sync {
    /// Look up a session. `Ok(None)` means the registry answered "not found".
    async fn find_session(
        &self,
        user_id: i64,
        session_id: &str,
    ) -> Result<Option<ChatSession>, RegistryError>;

    /// Create a session. A `None` id asks the registry to generate one.
    async fn create_session(
        &self,
        user_id: i64,
        session_id: Option<&str>,
        title: &str,
    ) -> CreateSessionOutcome;
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateSessionBody<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    session_id: Option<&'a str>,
    title: &'a str,
}

/// HTTP client for user-service's session endpoints.
pub struct UserServiceRegistry {
    client: Client,
    base_url: Url,
    timeout: Duration,
}

impl UserServiceRegistry {
    pub fn new(config: &UserServiceConfig) -> Result<Self, RegistryError> {
        let base_url = Url::parse(&config.url).map_err(|e| {
            RegistryError::Unexpected(format!("Invalid user-service URL {}: {}", config.url, e))
        })?;

        Ok(Self {
            client: Client::new(),
            base_url,
            timeout: config.timeout(),
        })
    }

    /// `{base}/api/user/{user_id}/sessions[/{session_id}]`, with segments escaped.
    fn sessions_url(&self, user_id: i64, session_id: Option<&str>) -> Result<Url, RegistryError> {
        let mut url = self.base_url.clone();
        {
            let mut segments = url.path_segments_mut().map_err(|_| {
                RegistryError::Unexpected(format!("Base URL cannot carry a path: {}", self.base_url))
            })?;
            segments
                .pop_if_empty()
                .extend(["api", "user", &user_id.to_string(), "sessions"]);
            if let Some(id) = session_id {
                segments.push(id);
            }
        }
        Ok(url)
    }

    fn transport_error(&self, op: &str, err: reqwest::Error) -> RegistryError {
        if err.is_timeout() {
            RegistryError::Timeout(format!("{} exceeded {:?}", op, self.timeout))
        } else {
            RegistryError::Unavailable(format!("{}: {}", op, err))
        }
    }
}

/// Map a non-success registry status to an error.
fn status_error(status: StatusCode, body: String) -> RegistryError {
    match status {
        StatusCode::FORBIDDEN => RegistryError::Forbidden(body),
        StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => RegistryError::Rejected(body),
        StatusCode::GATEWAY_TIMEOUT => RegistryError::Timeout(body),
        s if s.is_server_error() => RegistryError::Unavailable(format!("{}: {}", s, body)),
        s => RegistryError::Unexpected(format!("{}: {}", s, body)),
    }
}

#[async_trait]
impl SessionRegistry for UserServiceRegistry {
    async fn find_session(
        &self,
        user_id: i64,
        session_id: &str,
    ) -> Result<Option<ChatSession>, RegistryError> {
        let url = self.sessions_url(user_id, Some(session_id))?;

        let response = self
            .client
            .traced_get(url.as_str())
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| self.transport_error("session lookup", e))?;

        match response.status() {
            StatusCode::OK => response
                .json::<ChatSession>()
                .await
                .map(Some)
                .map_err(|e| self.transport_error("session lookup body", e)),
            StatusCode::NOT_FOUND => Ok(None),
            status => {
                let body = response.text().await.unwrap_or_default();
                Err(status_error(status, body))
            }
        }
    }

    async fn create_session(
        &self,
        user_id: i64,
        session_id: Option<&str>,
        title: &str,
    ) -> CreateSessionOutcome {
        let url = match self.sessions_url(user_id, None) {
            Ok(url) => url,
            Err(e) => return CreateSessionOutcome::Error(e),
        };

        let body = CreateSessionBody { session_id, title };

        let response = match self
            .client
            .traced_post(url.as_str())
            .json(&body)
            .timeout(self.timeout)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => return CreateSessionOutcome::Error(self.transport_error("session create", e)),
        };

        match response.status() {
            StatusCode::CREATED | StatusCode::OK => match response.json::<ChatSession>().await {
                Ok(session) => CreateSessionOutcome::Created(session),
                Err(e) => {
                    CreateSessionOutcome::Error(self.transport_error("session create body", e))
                }
            },
            StatusCode::CONFLICT => CreateSessionOutcome::Conflict,
            status => {
                let body = response.text().await.unwrap_or_default();
                CreateSessionOutcome::Error(status_error(status, body))
            }
        }
    }
}
