//! Run configuration.
//!
//! Every component receives an explicit, immutable configuration value.
//! Values are read from environment variables once, at startup.
//!
//! ## Catalog sync
//! - `API_STREAM`: upstream catalog endpoint (required)
//! - `CATALOG_TIMEOUT_SECS`: upstream fetch timeout (default: 120)
//! - `CATALOG_ID_FIELD`: identifier field (default: `id`)
//! - `SYNC_CONCURRENCY`: parallel creates/deletes (default: 4)
//! - `SYNC_ALLOW_EMPTY_CATALOG`: allow pruning everything on an empty catalog (default: false)
//!
//! ## Feedback export
//! - `EXPORT_LOOKBACK_WEEKS`: selection window (default: 4)
//! - `EXPORT_DIFFERENCE_THRESHOLD`: maximum difference score (default: 0.81)
//! - `EXPORT_ORDER_BY`: ordering column (default: `added_at`)
//! - `EXPORT_SORT_DIRECTION`: `ASC` or `DESC` (default: `DESC`)
//! - `EXPORT_SEQUENCE_FLOOR`: first sequence number (default: 11)
//! - `DATABASE_URL`, or `DB_HOST`/`DB_PORT`/`DB_NAME`/`DB_USER`/`DB_PASSWORD`
//! - `DB_MAX_CONNECTIONS`, `DB_MIN_CONNECTIONS`, `DB_CONNECT_TIMEOUT_SECS`,
//!   `DB_IDLE_TIMEOUT_SECS`, `DB_MAX_LIFETIME_SECS`
//!
//! ## Storage (both runs)
//! - `AZURE_CONNECTION_STRING`, or `AZURE_STORAGE_ACCOUNT_NAME` + `AZURE_STORAGE_ACCOUNT_KEY`
//! - `AZURE_BLOB_ENDPOINT`: endpoint override (optional)
//! - `AZURE_CONTAINER_NAME` (required)
//!
//! ## Both runs
//! - `RUN_TIMEOUT_SECS`: stop the run after this many seconds (optional)

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::sequence::{SequencePattern, DEFAULT_SEQUENCE_FLOOR};
use crate::source::{CorrectionQuery, OrderColumn, SortDirection};
use crate::types::ID_FIELD;

/// Error type for configuration loading.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    /// A required variable is unset or empty.
    #[error("Missing environment variable: {0}")]
    Missing(String),
    /// A variable could not be parsed.
    #[error("Invalid value for {var}: {reason}")]
    Invalid {
        /// Variable name.
        var: String,
        /// Parse failure.
        reason: String,
    },
}

/// Variable lookup, normally `std::env::var`.
pub type Lookup<'a> = &'a dyn Fn(&str) -> Option<String>;

fn process_env(var: &str) -> Option<String> {
    std::env::var(var).ok()
}

fn optional(lookup: Lookup<'_>, var: &str) -> Option<String> {
    lookup(var).map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn required(lookup: Lookup<'_>, var: &str) -> Result<String, ConfigError> {
    optional(lookup, var).ok_or_else(|| ConfigError::Missing(var.to_string()))
}

fn parse_or<T>(lookup: Lookup<'_>, var: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    match optional(lookup, var) {
        Some(raw) => raw.parse().map_err(|e: T::Err| ConfigError::Invalid {
            var: var.to_string(),
            reason: e.to_string(),
        }),
        None => Ok(default),
    }
}

fn flag(lookup: Lookup<'_>, var: &str, default: bool) -> Result<bool, ConfigError> {
    match optional(lookup, var).map(|v| v.to_lowercase()) {
        None => Ok(default),
        Some(v) => match v.as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(ConfigError::Invalid {
                var: var.to_string(),
                reason: format!("expected a boolean, got '{v}'"),
            }),
        },
    }
}

fn run_timeout(lookup: Lookup<'_>) -> Result<Option<Duration>, ConfigError> {
    let secs: u64 = parse_or(lookup, "RUN_TIMEOUT_SECS", 0)?;
    Ok((secs > 0).then(|| Duration::from_secs(secs)))
}

// ─────────────────────────────────────────────────────────────────────────────
// Storage
// ─────────────────────────────────────────────────────────────────────────────

/// Blob storage account and container.
#[derive(Clone, PartialEq)]
pub struct AzureConfig {
    /// Storage account name.
    pub account_name: String,
    /// Base64-encoded account key.
    pub account_key: String,
    /// Blob service endpoint, e.g. `https://acct.blob.core.windows.net`.
    pub blob_endpoint: String,
    /// Container holding the artifacts.
    pub container: String,
}

impl AzureConfig {
    /// Configuration for the public cloud endpoint of an account.
    pub fn from_account(
        account_name: impl Into<String>,
        account_key: impl Into<String>,
        container: impl Into<String>,
    ) -> Self {
        let account_name = account_name.into();
        Self {
            blob_endpoint: format!("https://{}.blob.core.windows.net", account_name),
            account_name,
            account_key: account_key.into(),
            container: container.into(),
        }
    }

    /// Parse an account connection string.
    ///
    /// Recognizes `DefaultEndpointsProtocol`, `AccountName`, `AccountKey`,
    /// `EndpointSuffix` and `BlobEndpoint`; other keys are ignored.
    pub fn from_connection_string(
        connection_string: &str,
        container: impl Into<String>,
    ) -> Result<Self, ConfigError> {
        let mut protocol = "https".to_string();
        let mut suffix = "core.windows.net".to_string();
        let mut account_name = None;
        let mut account_key = None;
        let mut blob_endpoint = None;

        for part in connection_string.split(';').map(str::trim).filter(|p| !p.is_empty()) {
            // Keys are base64 and may themselves contain '='.
            let (key, value) = part.split_once('=').ok_or_else(|| ConfigError::Invalid {
                var: "AZURE_CONNECTION_STRING".to_string(),
                reason: format!("segment without '=': {part}"),
            })?;
            match key {
                "DefaultEndpointsProtocol" => protocol = value.to_string(),
                "AccountName" => account_name = Some(value.to_string()),
                "AccountKey" => account_key = Some(value.to_string()),
                "EndpointSuffix" => suffix = value.to_string(),
                "BlobEndpoint" => blob_endpoint = Some(value.trim_end_matches('/').to_string()),
                _ => {}
            }
        }

        let missing = |field: &str| ConfigError::Invalid {
            var: "AZURE_CONNECTION_STRING".to_string(),
            reason: format!("{field} is missing"),
        };
        let account_name = account_name.ok_or_else(|| missing("AccountName"))?;
        let account_key = account_key.ok_or_else(|| missing("AccountKey"))?;
        let blob_endpoint = blob_endpoint
            .unwrap_or_else(|| format!("{}://{}.blob.{}", protocol, account_name, suffix));

        Ok(Self {
            account_name,
            account_key,
            blob_endpoint,
            container: container.into(),
        })
    }

    /// Load from a variable lookup.
    pub fn from_lookup(lookup: Lookup<'_>) -> Result<Self, ConfigError> {
        let container = required(lookup, "AZURE_CONTAINER_NAME")?;

        let mut config = match optional(lookup, "AZURE_CONNECTION_STRING") {
            Some(conn) => Self::from_connection_string(&conn, container)?,
            None => Self::from_account(
                required(lookup, "AZURE_STORAGE_ACCOUNT_NAME")?,
                required(lookup, "AZURE_STORAGE_ACCOUNT_KEY")?,
                container,
            ),
        };
        if let Some(endpoint) = optional(lookup, "AZURE_BLOB_ENDPOINT") {
            config.blob_endpoint = endpoint.trim_end_matches('/').to_string();
        }
        Ok(config)
    }

    /// Load from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(&process_env)
    }
}

impl fmt::Debug for AzureConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AzureConfig")
            .field("account_name", &self.account_name)
            .field("account_key", &"<redacted>")
            .field("blob_endpoint", &self.blob_endpoint)
            .field("container", &self.container)
            .finish()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Database
// ─────────────────────────────────────────────────────────────────────────────

/// Where to connect.
#[derive(Clone, PartialEq)]
pub enum DatabaseTarget {
    /// Full connection URL.
    Url(String),
    /// Individual connection parameters.
    Parts {
        /// Host name.
        host: String,
        /// Port.
        port: u16,
        /// Database name.
        database: String,
        /// User name.
        user: String,
        /// Password.
        password: String,
    },
}

impl fmt::Debug for DatabaseTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Url(_) => f.write_str("Url(<redacted>)"),
            Self::Parts { host, port, database, user, .. } => f
                .debug_struct("Parts")
                .field("host", host)
                .field("port", port)
                .field("database", database)
                .field("user", user)
                .finish_non_exhaustive(),
        }
    }
}

/// Configuration for the PostgreSQL connection pool.
///
/// An export run issues a single query, so the pool stays small.
#[derive(Debug, Clone, PartialEq)]
pub struct PostgresConfig {
    /// Connection target.
    pub target: DatabaseTarget,
    /// Maximum connections in pool (default: 2).
    pub max_connections: u32,
    /// Minimum idle connections to keep warm (default: 0).
    pub min_connections: u32,
    /// Connection acquire timeout in seconds (default: 10).
    pub connect_timeout_secs: u64,
    /// Idle connection timeout in seconds (default: 300 = 5 min).
    pub idle_timeout_secs: u64,
    /// Maximum connection lifetime in seconds (default: 1800 = 30 min).
    pub max_lifetime_secs: u64,
}

impl PostgresConfig {
    /// Load from a variable lookup.
    pub fn from_lookup(lookup: Lookup<'_>) -> Result<Self, ConfigError> {
        let target = match optional(lookup, "DATABASE_URL") {
            Some(url) => DatabaseTarget::Url(url),
            None => DatabaseTarget::Parts {
                host: required(lookup, "DB_HOST")?,
                port: parse_or(lookup, "DB_PORT", 5432)?,
                database: required(lookup, "DB_NAME")?,
                user: required(lookup, "DB_USER")?,
                password: lookup("DB_PASSWORD").unwrap_or_default(),
            },
        };

        Ok(Self {
            target,
            max_connections: parse_or(lookup, "DB_MAX_CONNECTIONS", 2)?,
            min_connections: parse_or(lookup, "DB_MIN_CONNECTIONS", 0)?,
            connect_timeout_secs: parse_or(lookup, "DB_CONNECT_TIMEOUT_SECS", 10)?,
            idle_timeout_secs: parse_or(lookup, "DB_IDLE_TIMEOUT_SECS", 300)?,
            max_lifetime_secs: parse_or(lookup, "DB_MAX_LIFETIME_SECS", 1800)?,
        })
    }

    /// Load from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(&process_env)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Runs
// ─────────────────────────────────────────────────────────────────────────────

/// Configuration for a catalog-sync run.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncConfig {
    /// Upstream streaming endpoint.
    pub catalog_url: String,
    /// Timeout for the upstream fetch.
    pub catalog_timeout: Duration,
    /// Identifier field in catalog items and stored artifacts.
    pub id_field: String,
    /// Maximum concurrent creates or deletes.
    pub concurrency: usize,
    /// Allow an empty catalog to remove every stored artifact.
    pub allow_empty_catalog: bool,
    /// Optional limit on the whole run.
    pub run_timeout: Option<Duration>,
    /// Target storage.
    pub azure: AzureConfig,
}

impl SyncConfig {
    /// Load from a variable lookup.
    pub fn from_lookup(lookup: Lookup<'_>) -> Result<Self, ConfigError> {
        let concurrency: usize = parse_or(lookup, "SYNC_CONCURRENCY", 4)?;
        if concurrency == 0 {
            return Err(ConfigError::Invalid {
                var: "SYNC_CONCURRENCY".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }

        Ok(Self {
            catalog_url: required(lookup, "API_STREAM")?,
            catalog_timeout: Duration::from_secs(parse_or(lookup, "CATALOG_TIMEOUT_SECS", 120)?),
            id_field: optional(lookup, "CATALOG_ID_FIELD").unwrap_or_else(|| ID_FIELD.to_string()),
            concurrency,
            allow_empty_catalog: flag(lookup, "SYNC_ALLOW_EMPTY_CATALOG", false)?,
            run_timeout: run_timeout(lookup)?,
            azure: AzureConfig::from_lookup(lookup)?,
        })
    }

    /// Load from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(&process_env)
    }
}

/// Configuration for a feedback-export run.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportConfig {
    /// How far back to select rows, in weeks.
    pub lookback_weeks: u32,
    /// Maximum difference score, inclusive.
    pub difference_threshold: f64,
    /// Ordering column.
    pub order_by: OrderColumn,
    /// Ordering direction.
    pub direction: SortDirection,
    /// First sequence number when no example exists.
    pub sequence_floor: u64,
    /// Optional limit on the whole run.
    pub run_timeout: Option<Duration>,
    /// Target storage.
    pub azure: AzureConfig,
    /// Source database.
    pub database: PostgresConfig,
}

impl ExportConfig {
    /// Load from a variable lookup.
    pub fn from_lookup(lookup: Lookup<'_>) -> Result<Self, ConfigError> {
        let difference_threshold: f64 = parse_or(lookup, "EXPORT_DIFFERENCE_THRESHOLD", 0.81)?;
        if !difference_threshold.is_finite() {
            return Err(ConfigError::Invalid {
                var: "EXPORT_DIFFERENCE_THRESHOLD".to_string(),
                reason: "must be a finite number".to_string(),
            });
        }

        Ok(Self {
            lookback_weeks: parse_or(lookup, "EXPORT_LOOKBACK_WEEKS", 4)?,
            difference_threshold,
            order_by: parse_or(lookup, "EXPORT_ORDER_BY", OrderColumn::AddedAt)?,
            direction: parse_or(lookup, "EXPORT_SORT_DIRECTION", SortDirection::Desc)?,
            sequence_floor: parse_or(lookup, "EXPORT_SEQUENCE_FLOOR", DEFAULT_SEQUENCE_FLOOR)?,
            run_timeout: run_timeout(lookup)?,
            azure: AzureConfig::from_lookup(lookup)?,
            database: PostgresConfig::from_lookup(lookup)?,
        })
    }

    /// Load from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(&process_env)
    }

    /// Query window ending at `now`.
    pub fn query(&self, now: DateTime<Utc>) -> CorrectionQuery {
        CorrectionQuery {
            since: now - chrono::Duration::weeks(i64::from(self.lookback_weeks)),
            max_difference: self.difference_threshold,
            order_by: self.order_by,
            direction: self.direction,
        }
    }

    /// Naming pattern for exported examples.
    pub fn pattern(&self) -> SequencePattern {
        SequencePattern::examples().with_floor(self.sequence_floor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    fn lookup_in(map: &HashMap<String, String>) -> impl Fn(&str) -> Option<String> + '_ {
        move |k| map.get(k).cloned()
    }

    const STORAGE: &[(&str, &str)] = &[
        ("AZURE_STORAGE_ACCOUNT_NAME", "mirroracct"),
        ("AZURE_STORAGE_ACCOUNT_KEY", "a2V5"),
        ("AZURE_CONTAINER_NAME", "products"),
    ];

    #[test]
    fn test_sync_config_defaults() {
        let mut vars = env(STORAGE);
        vars.insert("API_STREAM".into(), "https://example.test/stream".into());

        let config = SyncConfig::from_lookup(&lookup_in(&vars)).unwrap();
        assert_eq!(config.catalog_url, "https://example.test/stream");
        assert_eq!(config.concurrency, 4);
        assert_eq!(config.id_field, "id");
        assert!(!config.allow_empty_catalog);
        assert_eq!(config.run_timeout, None);
        assert_eq!(config.azure.blob_endpoint, "https://mirroracct.blob.core.windows.net");
    }

    #[test]
    fn test_sync_config_requires_stream() {
        let vars = env(STORAGE);
        let err = SyncConfig::from_lookup(&lookup_in(&vars)).unwrap_err();
        assert_eq!(err, ConfigError::Missing("API_STREAM".into()));
    }

    #[test]
    fn test_sync_config_rejects_zero_concurrency() {
        let mut vars = env(STORAGE);
        vars.insert("API_STREAM".into(), "http://x".into());
        vars.insert("SYNC_CONCURRENCY".into(), "0".into());

        assert!(matches!(
            SyncConfig::from_lookup(&lookup_in(&vars)),
            Err(ConfigError::Invalid { .. })
        ));
    }

    #[test]
    fn test_invalid_flag() {
        let mut vars = env(STORAGE);
        vars.insert("API_STREAM".into(), "http://x".into());
        vars.insert("SYNC_ALLOW_EMPTY_CATALOG".into(), "maybe".into());

        assert!(SyncConfig::from_lookup(&lookup_in(&vars)).is_err());
    }

    #[test]
    fn test_connection_string() {
        let config = AzureConfig::from_connection_string(
            "DefaultEndpointsProtocol=https;AccountName=acct;AccountKey=abc+def==;EndpointSuffix=core.windows.net",
            "examples",
        )
        .unwrap();

        assert_eq!(config.account_name, "acct");
        assert_eq!(config.account_key, "abc+def==");
        assert_eq!(config.blob_endpoint, "https://acct.blob.core.windows.net");
        assert_eq!(config.container, "examples");
    }

    #[test]
    fn test_connection_string_blob_endpoint() {
        let config = AzureConfig::from_connection_string(
            "AccountName=devstoreaccount1;AccountKey=a2V5;BlobEndpoint=http://127.0.0.1:10000/devstoreaccount1/;",
            "c",
        )
        .unwrap();

        assert_eq!(config.blob_endpoint, "http://127.0.0.1:10000/devstoreaccount1");
    }

    #[test]
    fn test_connection_string_missing_key() {
        assert!(AzureConfig::from_connection_string("AccountName=acct", "c").is_err());
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let config = AzureConfig::from_account("acct", "topsecret", "c");
        assert!(!format!("{:?}", config).contains("topsecret"));

        let target = DatabaseTarget::Parts {
            host: "db".into(),
            port: 5432,
            database: "support".into(),
            user: "svc".into(),
            password: "hunter2".into(),
        };
        assert!(!format!("{:?}", target).contains("hunter2"));
    }

    #[test]
    fn test_export_config_from_parts() {
        let mut vars = env(STORAGE);
        vars.extend(env(&[
            ("DB_HOST", "db.internal"),
            ("DB_NAME", "support"),
            ("DB_USER", "svc"),
            ("DB_PASSWORD", "pw"),
            ("EXPORT_SORT_DIRECTION", "asc"),
            ("RUN_TIMEOUT_SECS", "600"),
        ]));

        let config = ExportConfig::from_lookup(&lookup_in(&vars)).unwrap();
        assert_eq!(config.lookback_weeks, 4);
        assert_eq!(config.difference_threshold, 0.81);
        assert_eq!(config.order_by, OrderColumn::AddedAt);
        assert_eq!(config.direction, SortDirection::Asc);
        assert_eq!(config.sequence_floor, 11);
        assert_eq!(config.run_timeout, Some(Duration::from_secs(600)));
        assert!(matches!(config.database.target, DatabaseTarget::Parts { port: 5432, .. }));
    }

    #[test]
    fn test_export_config_rejects_unknown_column() {
        let mut vars = env(STORAGE);
        vars.extend(env(&[
            ("DATABASE_URL", "postgres://localhost/support"),
            ("EXPORT_ORDER_BY", "added_at; DROP TABLE corrections"),
        ]));

        assert!(matches!(
            ExportConfig::from_lookup(&lookup_in(&vars)),
            Err(ConfigError::Invalid { .. })
        ));
    }

    #[test]
    fn test_export_query_window() {
        let mut vars = env(STORAGE);
        vars.insert("DATABASE_URL".into(), "postgres://localhost/support".into());
        let config = ExportConfig::from_lookup(&lookup_in(&vars)).unwrap();

        let now = Utc::now();
        let query = config.query(now);
        assert_eq!(now - query.since, chrono::Duration::weeks(4));
        assert_eq!(query.max_difference, 0.81);
    }
}
