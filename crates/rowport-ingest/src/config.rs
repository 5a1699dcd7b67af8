//! Configuration management

use rowport_common::logging::LogLevel;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

// ============================================================================
// Configuration Constants
// ============================================================================

/// Default timeout for target API requests in seconds.
pub const DEFAULT_API_TIMEOUT_SECS: u64 = 300;

/// Default target API base URL for local development.
pub const DEFAULT_API_URL: &str = "http://localhost:54746/data/v3";

/// Default connection name used to select agents.
pub const DEFAULT_CONNECTION_NAME: &str = "default";

/// Default cap on concurrent row publishes when limiting is enabled.
pub const DEFAULT_MAX_CONCURRENT_POSTS: usize = 100;

/// Default location of the JSON catalog.
pub const DEFAULT_CATALOG_PATH: &str = "./rowport-catalog.json";

/// Default root directory of the local file store.
pub const DEFAULT_FILE_ROOT: &str = "./files";

/// Target connection and credentials
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionConfig {
    pub name: String,
    pub api_url: String,
    /// Token endpoint; when absent requests are sent without a bearer token
    pub token_url: Option<String>,
    pub client_id: String,
    pub client_secret: String,
    pub timeout_secs: u64,
}

/// Ingestion pipeline tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub limit_concurrent_posts: bool,
    pub max_concurrent_posts: usize,
    pub check_metadata: bool,
    pub ingestion_log_level: LogLevel,
    /// Skip agents whose weekly schedule has no slot due
    #[serde(default)]
    pub scheduled_only: bool,
}

impl PipelineConfig {
    /// Degree of row parallelism within one file, `None` when unbounded
    pub fn row_concurrency(&self) -> Option<usize> {
        self.limit_concurrent_posts.then_some(self.max_concurrent_posts)
    }
}

/// Where agents, maps and files are read from
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub catalog_path: PathBuf,
    pub file_root: PathBuf,
}

/// Rowport configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub connection: ConnectionConfig,
    pub pipeline: PipelineConfig,
    pub storage: StorageConfig,
}

fn env_parsed<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

impl Config {
    /// Load configuration from environment and defaults
    pub fn load() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let config = Config {
            connection: ConnectionConfig {
                name: std::env::var("ROWPORT_CONNECTION_NAME")
                    .unwrap_or_else(|_| DEFAULT_CONNECTION_NAME.to_string()),
                api_url: std::env::var("ROWPORT_API_URL")
                    .unwrap_or_else(|_| DEFAULT_API_URL.to_string()),
                token_url: std::env::var("ROWPORT_TOKEN_URL")
                    .ok()
                    .filter(|s| !s.trim().is_empty()),
                client_id: std::env::var("ROWPORT_CLIENT_ID").unwrap_or_default(),
                client_secret: std::env::var("ROWPORT_CLIENT_SECRET").unwrap_or_default(),
                timeout_secs: env_parsed("ROWPORT_API_TIMEOUT_SECS", DEFAULT_API_TIMEOUT_SECS),
            },
            pipeline: PipelineConfig {
                limit_concurrent_posts: env_parsed("ROWPORT_LIMIT_CONCURRENT_POSTS", false),
                max_concurrent_posts: env_parsed(
                    "ROWPORT_MAX_CONCURRENT_POSTS",
                    DEFAULT_MAX_CONCURRENT_POSTS,
                ),
                check_metadata: env_parsed("ROWPORT_CHECK_METADATA", true),
                ingestion_log_level: env_parsed("ROWPORT_INGESTION_LOG_LEVEL", LogLevel::Info),
                scheduled_only: env_parsed("ROWPORT_SCHEDULED_ONLY", false),
            },
            storage: StorageConfig {
                catalog_path: std::env::var("ROWPORT_CATALOG")
                    .unwrap_or_else(|_| DEFAULT_CATALOG_PATH.to_string())
                    .into(),
                file_root: std::env::var("ROWPORT_FILE_ROOT")
                    .unwrap_or_else(|_| DEFAULT_FILE_ROOT.to_string())
                    .into(),
            },
        };

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.connection.api_url.trim().is_empty() {
            anyhow::bail!("Target API URL cannot be empty");
        }

        if self.connection.name.trim().is_empty() {
            anyhow::bail!("Connection name cannot be empty");
        }

        if self.connection.timeout_secs == 0 {
            anyhow::bail!("API timeout must be greater than 0");
        }

        if self.pipeline.limit_concurrent_posts && self.pipeline.max_concurrent_posts == 0 {
            anyhow::bail!("max_concurrent_posts must be greater than 0 when limiting is enabled");
        }

        if self.connection.token_url.is_some() && self.connection.client_id.is_empty() {
            anyhow::bail!("A token URL is configured but ROWPORT_CLIENT_ID is empty");
        }

        if self.connection.token_url.is_none() {
            tracing::warn!("No token URL configured - requests will be sent unauthenticated");
        }

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            connection: ConnectionConfig {
                name: DEFAULT_CONNECTION_NAME.to_string(),
                api_url: DEFAULT_API_URL.to_string(),
                token_url: None,
                client_id: String::new(),
                client_secret: String::new(),
                timeout_secs: DEFAULT_API_TIMEOUT_SECS,
            },
            pipeline: PipelineConfig {
                limit_concurrent_posts: false,
                max_concurrent_posts: DEFAULT_MAX_CONCURRENT_POSTS,
                check_metadata: true,
                ingestion_log_level: LogLevel::Info,
                scheduled_only: false,
            },
            storage: StorageConfig {
                catalog_path: DEFAULT_CATALOG_PATH.into(),
                file_root: DEFAULT_FILE_ROOT.into(),
            },
        }
    }
}
