use serde::Deserialize;
use service_core::config::{self as core_config, get_env, get_optional_env};
use service_core::error::AppError;

#[derive(Debug, Clone, Deserialize)]
pub struct UserConfig {
    #[serde(flatten)]
    pub common: core_config::Config,
    pub store: StoreBackend,
    pub mongodb: MongoConfig,
    pub otlp_endpoint: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MongoConfig {
    pub uri: String,
    pub database: String,
}

/// Where sessions live.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Mongodb,
    /// Process-local; for development and tests.
    Memory,
}

impl std::str::FromStr for StoreBackend {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "mongodb" | "mongo" => Ok(StoreBackend::Mongodb),
            "memory" => Ok(StoreBackend::Memory),
            other => Err(AppError::ConfigError(anyhow::anyhow!(
                "Unknown session store: {}",
                other
            ))),
        }
    }
}

impl UserConfig {
    pub fn load() -> Result<Self, AppError> {
        let common_config = core_config::Config::load()?;
        let is_prod = core_config::is_production();

        let store: StoreBackend = get_env("SESSION_STORE", Some("mongodb"), is_prod)?.parse()?;

        // The memory store never touches MongoDB, so the URI is optional there.
        let uri = match store {
            StoreBackend::Mongodb => get_env("MONGODB_URI", None, is_prod)?,
            StoreBackend::Memory => get_optional_env("MONGODB_URI").unwrap_or_default(),
        };

        Ok(UserConfig {
            common: common_config,
            store,
            mongodb: MongoConfig {
                uri,
                database: get_env("MONGODB_DATABASE", Some("user_db"), is_prod)?,
            },
            otlp_endpoint: get_optional_env("OTLP_ENDPOINT"),
        })
    }
}
