use serde::Deserialize;
use service_core::config::{self as core_config, get_env, get_env_parsed, get_optional_env};
use service_core::error::AppError;
use std::time::Duration;

/// Default timeout for a session-registry round trip.
const DEFAULT_REGISTRY_TIMEOUT_MS: u64 = 3_000;

#[derive(Debug, Clone, Deserialize)]
pub struct QaConfig {
    #[serde(flatten)]
    pub common: core_config::Config,
    pub mongodb: MongoConfig,
    pub generation: GenerationConfig,
    pub user_service: UserServiceConfig,
    pub persistence: PersistenceConfig,
    pub stream: StreamConfig,
    pub otlp_endpoint: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MongoConfig {
    pub uri: String,
    pub database: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GenerationProvider {
    Gemini,
    Mock,
}

impl std::str::FromStr for GenerationProvider {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "gemini" => Ok(GenerationProvider::Gemini),
            "mock" => Ok(GenerationProvider::Mock),
            other => Err(AppError::ConfigError(anyhow::anyhow!(
                "Unknown generation provider: {}",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct GenerationConfig {
    pub provider: GenerationProvider,
    /// Model used for answers (e.g., gemini-2.0-flash)
    pub text_model: String,
    pub api_key: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UserServiceConfig {
    /// Base HTTP URL of the session registry (user-service)
    pub url: String,
    pub timeout_ms: u64,
}

impl UserServiceConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PersistenceConfig {
    /// Maximum number of concurrent history writes
    pub worker_count: usize,
    /// Completed turns waiting for a writer
    pub queue_size: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StreamConfig {
    /// Fragments buffered between the generation backend and the client
    pub buffer: usize,
}

impl QaConfig {
    pub fn load() -> Result<Self, AppError> {
        let common_config = core_config::Config::load()?;
        let is_prod = core_config::is_production();

        let provider: GenerationProvider =
            get_env("QA_GENERATION_PROVIDER", Some("gemini"), is_prod)?.parse()?;

        // Only the Gemini backend needs credentials.
        let api_key = match provider {
            GenerationProvider::Gemini => get_env("GOOGLE_API_KEY", None, is_prod)?,
            GenerationProvider::Mock => get_optional_env("GOOGLE_API_KEY").unwrap_or_default(),
        };

        let config = QaConfig {
            common: common_config,
            mongodb: MongoConfig {
                uri: get_env("MONGODB_URI", None, is_prod)?,
                database: get_env("MONGODB_DATABASE", Some("qa_db"), is_prod)?,
            },
            generation: GenerationConfig {
                provider,
                text_model: get_env("QA_TEXT_MODEL", Some("gemini-2.0-flash"), is_prod)?,
                api_key,
            },
            user_service: UserServiceConfig {
                url: get_env("USER_SERVICE_URL", Some("http://user-service:8081"), is_prod)?,
                timeout_ms: get_env_parsed(
                    "USER_SERVICE_TIMEOUT_MS",
                    DEFAULT_REGISTRY_TIMEOUT_MS,
                    is_prod,
                )?,
            },
            persistence: PersistenceConfig {
                worker_count: get_env_parsed("QA_PERSISTENCE_WORKERS", 4, is_prod)?,
                queue_size: get_env_parsed("QA_PERSISTENCE_QUEUE_SIZE", 256, is_prod)?,
            },
            stream: StreamConfig {
                buffer: get_env_parsed("QA_STREAM_BUFFER", 16, is_prod)?,
            },
            otlp_endpoint: get_optional_env("OTLP_ENDPOINT"),
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), AppError> {
        if self.persistence.worker_count == 0 || self.persistence.queue_size == 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "QA_PERSISTENCE_WORKERS and QA_PERSISTENCE_QUEUE_SIZE must be at least 1"
            )));
        }
        if self.stream.buffer == 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "QA_STREAM_BUFFER must be at least 1"
            )));
        }
        Ok(())
    }
}
