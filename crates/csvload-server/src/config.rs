//! Configuration management

use csvload_common::env;
use serde::{Deserialize, Serialize};
use sqlx::postgres::PgConnectOptions;
use std::path::PathBuf;

use crate::ingest::IngestConfig;

// ============================================================================
// Server Configuration Constants
// ============================================================================

/// Default server host binding.
pub const DEFAULT_SERVER_HOST: &str = "0.0.0.0";

/// Default server port.
pub const DEFAULT_SERVER_PORT: u16 = 8080;

/// Default request timeout in seconds (30 minutes).
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 1_800;

/// Default shutdown timeout in seconds.
pub const DEFAULT_SHUTDOWN_TIMEOUT_SECS: u64 = 30;

pub const DEFAULT_DB_HOST: &str = "localhost";

pub const DEFAULT_DB_PORT: u16 = 5432;

pub const DEFAULT_DB_USER: &str = "postgres";

pub const DEFAULT_DB_NAME: &str = "csvload";

/// Default maximum database connections in the pool.
pub const DEFAULT_DATABASE_MAX_CONNECTIONS: u32 = 100;

/// Default connections kept open while idle.
pub const DEFAULT_DATABASE_MIN_CONNECTIONS: u32 = 4;

/// Default time to wait for a pooled connection, in seconds.
pub const DEFAULT_DATABASE_ACQUIRE_TIMEOUT_SECS: u64 = 30;

/// Default database idle timeout in seconds (10 minutes).
pub const DEFAULT_DATABASE_IDLE_TIMEOUT_SECS: u64 = 600;

/// Any origin.
pub const DEFAULT_CORS_ALLOWED_ORIGIN: &str = "*";

pub const DEFAULT_UPLOAD_DIR: &str = "./static";

/// Default upload body limit (1 GiB).
pub const DEFAULT_UPLOAD_MAX_BYTES: usize = 1024 * 1024 * 1024;

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub cors: CorsConfig,
    pub upload: UploadConfig,
    pub ingest: IngestConfig,
}

/// Server-specific configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub request_timeout_secs: u64,
    pub shutdown_timeout_secs: u64,
}

/// Database configuration
///
/// `url` wins when set. Otherwise the parts are used.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: Option<String>,
    pub host: String,
    pub port: u16,
    pub user: String,
    #[serde(skip_serializing)]
    pub password: String,
    pub name: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub acquire_timeout_secs: u64,
    pub idle_timeout_secs: u64,
}

/// CORS configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorsConfig {
    pub allowed_origins: Vec<String>,
}

/// Where uploads land and how large they may be
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadConfig {
    pub dir: PathBuf,
    pub max_body_bytes: usize,
}

impl DatabaseConfig {
    /// Connection options, parsed from `DATABASE_URL` or built from the parts
    ///
    /// Parts are passed to sqlx as-is, so credentials need no URL escaping.
    pub fn connect_options(&self) -> Result<PgConnectOptions, sqlx::Error> {
        if let Some(url) = &self.url {
            return url.parse();
        }

        let options = PgConnectOptions::new()
            .host(&self.host)
            .port(self.port)
            .username(&self.user)
            .database(&self.name);

        Ok(if self.password.is_empty() {
            options
        } else {
            options.password(&self.password)
        })
    }
}

impl Config {
    /// Load configuration from environment and defaults
    pub fn load() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let port = match env::var_any(&["APP_PORT", "APPPORT"]) {
            Some(raw) => parse_port(&raw)?,
            None => DEFAULT_SERVER_PORT,
        };

        let config = Config {
            server: ServerConfig {
                host: env::var("APP_HOST").unwrap_or_else(|| DEFAULT_SERVER_HOST.to_string()),
                port,
                request_timeout_secs: env::parse_or(
                    "APP_REQUEST_TIMEOUT_SECS",
                    DEFAULT_REQUEST_TIMEOUT_SECS,
                )?,
                shutdown_timeout_secs: env::parse_or(
                    "APP_SHUTDOWN_TIMEOUT_SECS",
                    DEFAULT_SHUTDOWN_TIMEOUT_SECS,
                )?,
            },
            database: DatabaseConfig {
                url: env::var("DATABASE_URL"),
                host: env::var("DBHOST").unwrap_or_else(|| DEFAULT_DB_HOST.to_string()),
                port: env::parse_or("DBPORT", DEFAULT_DB_PORT)?,
                user: env::var("DBUSER").unwrap_or_else(|| DEFAULT_DB_USER.to_string()),
                password: env::var("DBPASSWORD").unwrap_or_default(),
                name: env::var("DBNAME").unwrap_or_else(|| DEFAULT_DB_NAME.to_string()),
                max_connections: env::parse_or(
                    "DB_MAX_CONNECTIONS",
                    DEFAULT_DATABASE_MAX_CONNECTIONS,
                )?,
                min_connections: env::parse_or(
                    "DB_MIN_CONNECTIONS",
                    DEFAULT_DATABASE_MIN_CONNECTIONS,
                )?,
                acquire_timeout_secs: env::parse_or(
                    "DB_ACQUIRE_TIMEOUT_SECS",
                    DEFAULT_DATABASE_ACQUIRE_TIMEOUT_SECS,
                )?,
                idle_timeout_secs: env::parse_or(
                    "DB_IDLE_TIMEOUT_SECS",
                    DEFAULT_DATABASE_IDLE_TIMEOUT_SECS,
                )?,
            },
            cors: CorsConfig {
                allowed_origins: env::var("CORS_ALLOWED_ORIGINS")
                    .unwrap_or_else(|| DEFAULT_CORS_ALLOWED_ORIGIN.to_string())
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect(),
            },
            upload: UploadConfig {
                dir: env::var("UPLOAD_DIR")
                    .map(PathBuf::from)
                    .unwrap_or_else(|| PathBuf::from(DEFAULT_UPLOAD_DIR)),
                max_body_bytes: env::parse_or("UPLOAD_MAX_BYTES", DEFAULT_UPLOAD_MAX_BYTES)?,
            },
            ingest: IngestConfig::from_env()?,
        };

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.server.port == 0 {
            anyhow::bail!("Server port must be greater than 0");
        }

        if let Err(e) = self.database.connect_options() {
            anyhow::bail!("Invalid database connection settings: {}", e);
        }

        if self.database.max_connections == 0 {
            anyhow::bail!("Database max_connections must be greater than 0");
        }

        if self.database.min_connections > self.database.max_connections {
            anyhow::bail!(
                "Database min_connections ({}) cannot be greater than max_connections ({})",
                self.database.min_connections,
                self.database.max_connections
            );
        }

        if self.upload.max_body_bytes == 0 {
            anyhow::bail!("Upload max_body_bytes must be greater than 0");
        }

        if self.cors.allowed_origins.is_empty() {
            tracing::warn!("No CORS origins configured - all origins will be allowed");
        }

        self.ingest.validate()
    }
}

/// Accepts `8080` as well as the `:8080` listen-address form.
fn parse_port(raw: &str) -> anyhow::Result<u16> {
    let trimmed = raw.trim();
    let digits = trimmed.rsplit(':').next().unwrap_or(trimmed);
    digits
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid port '{}': {}", raw, e))
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: DEFAULT_SERVER_HOST.to_string(),
                port: DEFAULT_SERVER_PORT,
                request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
                shutdown_timeout_secs: DEFAULT_SHUTDOWN_TIMEOUT_SECS,
            },
            database: DatabaseConfig {
                url: None,
                host: DEFAULT_DB_HOST.to_string(),
                port: DEFAULT_DB_PORT,
                user: DEFAULT_DB_USER.to_string(),
                password: String::new(),
                name: DEFAULT_DB_NAME.to_string(),
                max_connections: DEFAULT_DATABASE_MAX_CONNECTIONS,
                min_connections: DEFAULT_DATABASE_MIN_CONNECTIONS,
                acquire_timeout_secs: DEFAULT_DATABASE_ACQUIRE_TIMEOUT_SECS,
                idle_timeout_secs: DEFAULT_DATABASE_IDLE_TIMEOUT_SECS,
            },
            cors: CorsConfig {
                allowed_origins: vec![DEFAULT_CORS_ALLOWED_ORIGIN.to_string()],
            },
            upload: UploadConfig {
                dir: PathBuf::from(DEFAULT_UPLOAD_DIR),
                max_body_bytes: DEFAULT_UPLOAD_MAX_BYTES,
            },
            ingest: IngestConfig::default(),
        }
    }
}
