use config::{Config as ConfigLoader, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub cors: CorsConfig,
    pub mongodb: MongoDbConfig,
    pub engine: EngineSection,
    pub retrieval: RetrievalConfig,
    pub ticket: TicketConfig,
    pub auth: AuthConfig,
    pub logging: LoggingConfig,

    // Secrets (from ENV only)
    #[serde(default)]
    pub mongodb_uri: String,
    #[serde(default)]
    pub mistral_api_key: String,
    #[serde(default)]
    pub qdrant_url: String,
    #[serde(default)]
    pub qdrant_api_key: Option<String>,
    #[serde(default)]
    pub jwt_secret: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Router-wide timeout; generous because /chat/stream holds the
    /// connection open for the whole turn
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CorsConfig {
    pub enabled: bool,
    pub origins: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MongoDbConfig {
    pub database: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EngineSection {
    pub model: String,
    pub temperature: f32,
    pub model_timeout_secs: u64,
    pub retrieval_timeout_secs: u64,
}

impl From<EngineSection> for valvedesk_engine::EngineConfig {
    fn from(section: EngineSection) -> Self {
        Self {
            model: section.model,
            temperature: section.temperature,
            model_timeout: Duration::from_secs(section.model_timeout_secs),
            retrieval_timeout: Duration::from_secs(section.retrieval_timeout_secs),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RetrievalConfig {
    pub collection: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TicketConfig {
    pub command: String,
    pub args: Vec<String>,
    #[serde(default)]
    pub working_dir: Option<String>,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    pub token_ttl_hours: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
}

impl Config {
    /// Load configuration from TOML files and environment variables
    ///
    /// Hierarchy (weakest to strongest):
    /// 1. config/default.toml
    /// 2. config/{ENV}.toml (if ENV is set)
    /// 3. Environment variables (SERVER_, MONGODB_, ENGINE_, LOG_ prefixes)
    pub fn load() -> Result<Self, ConfigError> {
        let env = std::env::var("ENV").unwrap_or_else(|_| "dev".to_string());

        let builder = ConfigLoader::builder()
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", env)).required(false))
            .add_source(
                Environment::default()
                    .prefix("SERVER")
                    .separator("_")
                    .try_parsing(true),
            )
            .add_source(
                Environment::default()
                    .prefix("MONGODB")
                    .separator("_")
                    .try_parsing(true),
            )
            .add_source(
                Environment::default()
                    .prefix("ENGINE")
                    .separator("_")
                    .try_parsing(true),
            )
            .add_source(
                Environment::default()
                    .prefix("LOG")
                    .separator("_")
                    .try_parsing(true),
            );

        let config = builder.build()?;
        let mut cfg: Config = config.try_deserialize()?;

        // Secrets never live in TOML
        cfg.mongodb_uri = require_env("MONGODB_URI")?;
        cfg.mistral_api_key = require_env("MISTRAL_API_KEY")?;
        cfg.qdrant_url = require_env("QDRANT_URL")?;
        cfg.qdrant_api_key = std::env::var("QDRANT_API_KEY").ok();
        cfg.jwt_secret = require_env("JWT_SECRET")?;

        Ok(cfg)
    }

    /// Load config from a specific path (useful for testing)
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let builder = ConfigLoader::builder().add_source(File::from(path.as_ref()));
        let config = builder.build()?;
        config.try_deserialize()
    }
}

fn require_env(name: &str) -> Result<String, ConfigError> {
    std::env::var(name)
        .map_err(|_| ConfigError::Message(format!("{} environment variable is required", name)))
}
