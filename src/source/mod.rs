//! Relational sources for the feedback export.

pub mod memory;

#[cfg(feature = "postgres")]
pub mod postgres;

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Table holding reviewed support replies.
pub const CORRECTIONS_TABLE: &str = "corrections";

/// One reviewed support exchange.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrectionRow {
    /// When the correction was recorded.
    pub added_at: DateTime<Utc>,
    /// Edit distance score between original and edited reply.
    pub difference: f64,
    /// Row identifier.
    pub id: String,
    /// Prompt prefix used for the original reply.
    pub prefix: Option<String>,
    /// Customer request text.
    pub user_request: Option<String>,
    /// Reply as generated.
    pub original: Option<String>,
    /// Reply as sent by the support agent.
    pub edited: Option<String>,
}

/// Column a correction query may be ordered by.
///
/// Only these identifiers are ever placed in SQL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderColumn {
    /// `added_at`
    AddedAt,
    /// `difference`
    Difference,
    /// `id`
    Id,
    /// `prefix`
    Prefix,
    /// `user_request`
    UserRequest,
    /// `original`
    Original,
    /// `edited`
    Edited,
}

impl OrderColumn {
    /// Column name as used in SQL.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AddedAt => "added_at",
            Self::Difference => "difference",
            Self::Id => "id",
            Self::Prefix => "prefix",
            Self::UserRequest => "user_request",
            Self::Original => "original",
            Self::Edited => "edited",
        }
    }

    fn compare(&self, a: &CorrectionRow, b: &CorrectionRow) -> Ordering {
        match self {
            Self::AddedAt => a.added_at.cmp(&b.added_at),
            Self::Difference => a
                .difference
                .partial_cmp(&b.difference)
                .unwrap_or(Ordering::Equal),
            Self::Id => a.id.cmp(&b.id),
            Self::Prefix => a.prefix.cmp(&b.prefix),
            Self::UserRequest => a.user_request.cmp(&b.user_request),
            Self::Original => a.original.cmp(&b.original),
            Self::Edited => a.edited.cmp(&b.edited),
        }
    }
}

impl Default for OrderColumn {
    fn default() -> Self {
        Self::AddedAt
    }
}

impl fmt::Display for OrderColumn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderColumn {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "added_at" => Ok(Self::AddedAt),
            "difference" => Ok(Self::Difference),
            "id" => Ok(Self::Id),
            "prefix" => Ok(Self::Prefix),
            "user_request" => Ok(Self::UserRequest),
            "original" => Ok(Self::Original),
            "edited" => Ok(Self::Edited),
            other => Err(format!("unknown column '{other}'")),
        }
    }
}

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SortDirection {
    /// Ascending.
    Asc,
    /// Descending.
    Desc,
}

impl SortDirection {
    /// Keyword as used in SQL.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

impl Default for SortDirection {
    fn default() -> Self {
        Self::Desc
    }
}

impl fmt::Display for SortDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SortDirection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "ASC" => Ok(Self::Asc),
            "DESC" => Ok(Self::Desc),
            other => Err(format!("unknown sort direction '{other}'")),
        }
    }
}

/// Selection window for an export run.
#[derive(Debug, Clone, PartialEq)]
pub struct CorrectionQuery {
    /// Minimum `added_at`, inclusive.
    pub since: DateTime<Utc>,
    /// Maximum `difference`, inclusive.
    pub max_difference: f64,
    /// Ordering column.
    pub order_by: OrderColumn,
    /// Ordering direction.
    pub direction: SortDirection,
}

impl CorrectionQuery {
    /// Parameterized SQL for this query. `$1` = since, `$2` = max difference.
    ///
    /// Ordering is qualified by table so it binds to the stored column, not
    /// to the `::text` output aliases.
    pub fn sql(&self) -> String {
        format!(
            "SELECT added_at::timestamptz AS added_at, difference::float8 AS difference, \
             id::text AS id, prefix::text AS prefix, user_request::text AS user_request, \
             original::text AS original, edited::text AS edited \
             FROM {CORRECTIONS_TABLE} \
             WHERE added_at >= $1 AND difference <= $2 \
             ORDER BY {CORRECTIONS_TABLE}.{} {}",
            self.order_by.as_str(),
            self.direction.as_str()
        )
    }

    /// Whether a row falls inside the window.
    pub fn matches(&self, row: &CorrectionRow) -> bool {
        row.added_at >= self.since && row.difference <= self.max_difference
    }

    /// Sort rows the way the query orders them.
    pub fn sort(&self, rows: &mut [CorrectionRow]) {
        rows.sort_by(|a, b| {
            let ord = self.order_by.compare(a, b);
            match self.direction {
                SortDirection::Asc => ord,
                SortDirection::Desc => ord.reverse(),
            }
        });
    }
}

/// Trait for correction sources.
#[async_trait]
pub trait CorrectionSource: Send + Sync {
    /// Error type for source operations.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Fetch every row inside the query window, in query order.
    async fn fetch_corrections(&self, query: &CorrectionQuery) -> Result<Vec<CorrectionRow>, Self::Error>;

    /// Release any held connections. Called on every exit path of a run.
    async fn close(&self) {}
}

pub use memory::InMemoryCorrectionSource;

#[cfg(feature = "postgres")]
pub use postgres::PostgresCorrectionSource;
