//! PostgreSQL correction source for production use.
//!
//! Connection settings come from [`PostgresConfig`]; see `config` for the
//! environment variables.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions};
use sqlx::Row;

use super::{CorrectionQuery, CorrectionRow, CorrectionSource};
use crate::config::{DatabaseTarget, PostgresConfig};

/// Error type for the PostgreSQL source.
#[derive(Debug, thiserror::Error)]
pub enum PostgresError {
    /// Database error.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// PostgreSQL correction source.
///
/// Holds a small pool; [`CorrectionSource::close`] drains it.
pub struct PostgresCorrectionSource {
    pool: PgPool,
}

impl PostgresCorrectionSource {
    /// Connect with the given configuration.
    pub async fn new(config: &PostgresConfig) -> Result<Self, PostgresError> {
        tracing::info!(
            max_connections = config.max_connections,
            min_connections = config.min_connections,
            connect_timeout_secs = config.connect_timeout_secs,
            idle_timeout_secs = config.idle_timeout_secs,
            max_lifetime_secs = config.max_lifetime_secs,
            "Initializing PostgreSQL connection pool"
        );

        let options = match &config.target {
            DatabaseTarget::Url(url) => url.parse::<PgConnectOptions>()?,
            DatabaseTarget::Parts { host, port, database, user, password } => PgConnectOptions::new()
                .host(host)
                .port(*port)
                .database(database)
                .username(user)
                .password(password),
        };

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(Duration::from_secs(config.connect_timeout_secs))
            .idle_timeout(Duration::from_secs(config.idle_timeout_secs))
            .max_lifetime(Duration::from_secs(config.max_lifetime_secs))
            .test_before_acquire(true)
            .connect_with(options)
            .await?;

        Ok(Self { pool })
    }

    /// Check if the database is reachable.
    pub async fn is_healthy(&self) -> bool {
        sqlx::query("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .is_ok()
    }

    /// Parse a correction from a database row.
    fn parse_row(row: &sqlx::postgres::PgRow) -> Result<CorrectionRow, sqlx::Error> {
        let added_at: DateTime<Utc> = row.try_get("added_at")?;
        let difference: Option<f64> = row.try_get("difference")?;
        let id: Option<String> = row.try_get("id")?;

        Ok(CorrectionRow {
            added_at,
            difference: difference.unwrap_or(0.0),
            id: id.unwrap_or_default(),
            prefix: row.try_get("prefix")?,
            user_request: row.try_get("user_request")?,
            original: row.try_get("original")?,
            edited: row.try_get("edited")?,
        })
    }
}

#[async_trait]
impl CorrectionSource for PostgresCorrectionSource {
    type Error = PostgresError;

    async fn fetch_corrections(&self, query: &CorrectionQuery) -> Result<Vec<CorrectionRow>, Self::Error> {
        let rows = sqlx::query(&query.sql())
            .bind(query.since)
            .bind(query.max_difference)
            .fetch_all(&self.pool)
            .await?;

        tracing::info!(rows = rows.len(), "Fetched corrections from PostgreSQL");

        rows.iter()
            .map(Self::parse_row)
            .collect::<Result<Vec<_>, _>>()
            .map_err(PostgresError::from)
    }

    async fn close(&self) {
        self.pool.close().await;
        tracing::debug!("PostgreSQL pool closed");
    }
}
