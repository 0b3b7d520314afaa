//! In-memory correction source for testing.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;

use super::{CorrectionQuery, CorrectionRow, CorrectionSource};

/// Error type for the in-memory source.
#[derive(Debug, Clone, thiserror::Error)]
pub enum InMemorySourceError {
    /// Simulated connection failure.
    #[error("Source unavailable: {0}")]
    Unavailable(String),
}

/// In-memory correction source.
///
/// Applies the query window and ordering the way the SQL does.
#[derive(Debug, Default)]
pub struct InMemoryCorrectionSource {
    rows: Vec<CorrectionRow>,
    failure: Option<String>,
    closed: AtomicBool,
}

impl InMemoryCorrectionSource {
    /// Create a source over the given rows.
    pub fn new(rows: Vec<CorrectionRow>) -> Self {
        Self {
            rows,
            ..Self::default()
        }
    }

    /// Create a source whose every fetch fails.
    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            failure: Some(message.into()),
            ..Self::default()
        }
    }

    /// Whether `close` has been called.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CorrectionSource for InMemoryCorrectionSource {
    type Error = InMemorySourceError;

    async fn fetch_corrections(&self, query: &CorrectionQuery) -> Result<Vec<CorrectionRow>, Self::Error> {
        if let Some(message) = &self.failure {
            return Err(InMemorySourceError::Unavailable(message.clone()));
        }

        let mut rows: Vec<CorrectionRow> = self
            .rows
            .iter()
            .filter(|row| query.matches(row))
            .cloned()
            .collect();
        query.sort(&mut rows);
        Ok(rows)
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::{OrderColumn, SortDirection};
    use chrono::{Duration, TimeZone, Utc};

    fn row(id: &str, days_ago: i64, difference: f64) -> CorrectionRow {
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
        CorrectionRow {
            added_at: now - Duration::days(days_ago),
            difference,
            id: id.to_string(),
            prefix: None,
            user_request: Some(format!("question {id}")),
            original: Some("draft".to_string()),
            edited: Some(format!("answer {id}")),
        }
    }

    fn query(direction: SortDirection) -> CorrectionQuery {
        CorrectionQuery {
            since: Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap(),
            max_difference: 0.81,
            order_by: OrderColumn::AddedAt,
            direction,
        }
    }

    #[tokio::test]
    async fn test_filters_window() {
        let source = InMemoryCorrectionSource::new(vec![
            row("recent", 2, 0.2),
            row("old", 90, 0.2),
            row("too_different", 2, 0.95),
            row("edge", 3, 0.81),
        ]);

        let rows = source.fetch_corrections(&query(SortDirection::Desc)).await.unwrap();
        let ids: Vec<_> = rows.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["recent", "edge"]);
    }

    #[tokio::test]
    async fn test_ascending_order() {
        let source = InMemoryCorrectionSource::new(vec![row("a", 1, 0.1), row("b", 5, 0.1)]);

        let rows = source.fetch_corrections(&query(SortDirection::Asc)).await.unwrap();
        assert_eq!(rows[0].id, "b");
        assert_eq!(rows[1].id, "a");
    }

    #[tokio::test]
    async fn test_failing_source_and_close() {
        let source = InMemoryCorrectionSource::failing("connection refused");
        assert!(source.fetch_corrections(&query(SortDirection::Desc)).await.is_err());

        source.close().await;
        assert!(source.is_closed());
    }
}
