//! Connection pool setup.

use anyhow::{Context, Result};
use sqlx::postgres::{PgConnectOptions, PgPoolOptions, PgSslMode};
use sqlx::PgPool;
use tracing::info;

/// Pool bounds shared by every process that talks to the database.
const POOL_MIN_CONNECTIONS: u32 = 2;
const POOL_MAX_CONNECTIONS: u32 = 10;

/// Database endpoint configuration, assembled from the `RDS_*` environment.
#[derive(Debug, Clone)]
pub struct DbConfig {
    pub host: String,
    pub port: u16,
    pub dbname: String,
    pub username: String,
    pub password: String,
}

impl DbConfig {
    pub fn from_env() -> Result<Self> {
        // The proxy endpoint may carry a port suffix; the host part wins.
        let endpoint = std::env::var("RDS_PROXY_ENDPOINT").unwrap_or_default();
        let host = endpoint
            .split(':')
            .next()
            .unwrap_or_default()
            .to_string();
        Ok(Self {
            host,
            port: std::env::var("RDS_PORT")
                .unwrap_or_else(|_| "5432".to_string())
                .parse()
                .context("Invalid RDS_PORT")?,
            dbname: std::env::var("RDS_DBNAME").unwrap_or_else(|_| "scanner_db".to_string()),
            username: std::env::var("RDS_USERNAME")
                .unwrap_or_else(|_| "scanner_admin".to_string()),
            password: std::env::var("RDS_PASSWORD").unwrap_or_default(),
        })
    }

    fn connect_options(&self) -> PgConnectOptions {
        PgConnectOptions::new()
            .host(&self.host)
            .port(self.port)
            .database(&self.dbname)
            .username(&self.username)
            .password(&self.password)
            .ssl_mode(PgSslMode::Require)
    }
}

/// Handle over the pooled Postgres connection. Cheap to clone.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Connect with the shared pool bounds (min 2, max 10).
    pub async fn connect(config: &DbConfig) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .min_connections(POOL_MIN_CONNECTIONS)
            .max_connections(POOL_MAX_CONNECTIONS)
            .connect_with(config.connect_options())
            .await
            .context("Failed to initialize connection pool")?;
        info!("Database connection pool initialized");
        Ok(Self { pool })
    }

    /// Wrap an existing pool (used by tests and embedded setups).
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}
