use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions};
use std::time::Duration;
use thiserror::Error;

use crate::config::DatabaseConfig;

/// Database operation errors with contextual information
#[derive(Error, Debug)]
pub enum DbError {
    /// SQL query or connection error
    #[error("Database query failed: {0}")]
    Sqlx(#[from] sqlx::Error),

    /// Migrations could not be applied
    #[error("Database migration failed: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    /// Database configuration is invalid or missing
    #[error("Database configuration error: {0}. Check DATABASE_URL or DBHOST/DBPORT/DBUSER/DBPASSWORD/DBNAME.")]
    Config(String),
}

impl DbError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }
}

pub type DbResult<T> = Result<T, DbError>;

#[derive(Debug, Clone)]
pub struct DbConfig {
    pub options: PgConnectOptions,
    pub max_connections: u32,
    pub min_connections: u32,
    pub acquire_timeout_secs: u64,
    pub idle_timeout_secs: Option<u64>,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            options: PgConnectOptions::new()
                .host("localhost")
                .port(5432)
                .username("postgres")
                .database("csvload"),
            max_connections: 100,
            min_connections: 4,
            acquire_timeout_secs: 30,
            idle_timeout_secs: Some(600),
        }
    }
}

impl DbConfig {
    /// Defaults with the target taken from a `postgres://` URL
    pub fn from_url(url: &str) -> DbResult<Self> {
        if url.trim().is_empty() {
            return Err(DbError::config("database URL is empty"));
        }
        Ok(Self {
            options: url.parse()?,
            ..Self::default()
        })
    }
}

impl TryFrom<&DatabaseConfig> for DbConfig {
    type Error = DbError;

    fn try_from(config: &DatabaseConfig) -> DbResult<Self> {
        if config.url.as_deref().is_some_and(|url| url.trim().is_empty()) {
            return Err(DbError::config("database URL is empty"));
        }

        Ok(Self {
            options: config.connect_options()?,
            max_connections: config.max_connections,
            min_connections: config.min_connections,
            acquire_timeout_secs: config.acquire_timeout_secs,
            idle_timeout_secs: Some(config.idle_timeout_secs).filter(|secs| *secs > 0),
        })
    }
}

fn pool_options(config: &DbConfig) -> PgPoolOptions {
    let mut options = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs));

    if let Some(idle_timeout) = config.idle_timeout_secs {
        options = options.idle_timeout(Duration::from_secs(idle_timeout));
    }

    options
}

/// Connect eagerly. Fails when the database is unreachable.
pub async fn create_pool(config: &DbConfig) -> DbResult<PgPool> {
    let pool = pool_options(config)
        .connect_with(config.options.clone())
        .await?;

    tracing::info!(
        host = config.options.get_host(),
        database = ?config.options.get_database(),
        max_connections = config.max_connections,
        min_connections = config.min_connections,
        "Database connection pool created"
    );

    Ok(pool)
}

/// Build the pool without opening a connection yet.
pub fn create_lazy_pool(config: &DbConfig) -> PgPool {
    pool_options(config).connect_lazy_with(config.options.clone())
}

pub async fn run_migrations(pool: &PgPool) -> DbResult<()> {
    sqlx::migrate!("../../migrations").run(pool).await?;
    tracing::info!("Database migrations completed");
    Ok(())
}

pub async fn health_check(pool: &PgPool) -> DbResult<()> {
    sqlx::query("SELECT 1")
        .execute(pool)
        .await
        .map(|_| ())
        .map_err(DbError::from)
}
