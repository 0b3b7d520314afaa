//! Feedback-export run.
//!
//! Selects reviewed support exchanges from the relational source and writes
//! each one as `examples/example<N>.txt`. `N` starts one past the highest
//! existing number and only advances when a name is consumed.

use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tracing::Instrument;
use uuid::Uuid;

use crate::sequence::{SequenceCounter, SequencePattern};
use crate::source::{CorrectionQuery, CorrectionRow, CorrectionSource};
use crate::store::{ObjectStore, PutOptions, StorageError, TEXT_CONTENT_TYPE};
use crate::types::{ExportSummary, ItemId, ItemOutcome};

/// Fixed preamble carried by every exported example.
pub const EXAMPLE_META: &str = "This is an example of a question that a customer has had, and the reply made by the company support agent.";

/// Record type tag.
pub const EXAMPLE_KIND: &str = "example";

/// Sequence numbers tried for one row before giving up on it.
pub const MAX_NAME_ATTEMPTS: usize = 8;

/// Exported example document. Field order is the serialized key order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportRecord {
    /// Fixed preamble.
    pub meta: String,
    /// The customer's request.
    pub customer_request: Option<String>,
    /// The reply as sent by the support agent.
    pub company_reply: Option<String>,
    /// Always `example`.
    #[serde(rename = "type")]
    pub kind: String,
}

impl ExportRecord {
    /// Format a correction row.
    pub fn from_row(row: &CorrectionRow) -> Self {
        Self {
            meta: EXAMPLE_META.to_string(),
            customer_request: row.user_request.clone(),
            company_reply: row.edited.clone(),
            kind: EXAMPLE_KIND.to_string(),
        }
    }

    /// JSON with four-space indentation.
    pub fn to_json(&self) -> Result<Vec<u8>, serde_json::Error> {
        let mut buf = Vec::new();
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
        let mut serializer = serde_json::Serializer::with_formatter(&mut buf, formatter);
        self.serialize(&mut serializer)?;
        Ok(buf)
    }
}

/// Error that aborts a feedback-export run.
#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    /// The relational query failed; nothing was written.
    #[error("Correction source: {0}")]
    Source(#[source] Box<dyn std::error::Error + Send + Sync>),
    /// Storage could not be bootstrapped or listed.
    #[error("Storage: {0}")]
    Storage(#[from] StorageError),
}

/// Exports correction rows into sequentially named artifacts.
pub struct FeedbackExport<Src: CorrectionSource, S: ObjectStore> {
    source: Src,
    store: Arc<S>,
    pattern: SequencePattern,
}

impl<Src: CorrectionSource, S: ObjectStore> FeedbackExport<Src, S> {
    /// Create an export writing `examples/example<N>.txt`.
    pub fn new(source: Src, store: Arc<S>) -> Self {
        Self::with_pattern(source, store, SequencePattern::examples())
    }

    /// Create an export with a custom naming pattern.
    pub fn with_pattern(source: Src, store: Arc<S>, pattern: SequencePattern) -> Self {
        Self {
            source,
            store,
            pattern,
        }
    }

    /// The correction source.
    pub fn source(&self) -> &Src {
        &self.source
    }

    /// Execute one run under a fresh `run_id`.
    ///
    /// The source is closed on every path once the query returns, before
    /// any write.
    pub async fn run(&self, query: &CorrectionQuery) -> Result<ExportSummary, ExportError> {
        let span = tracing::info_span!(
            "feedback_export",
            run_id = %Uuid::new_v4(),
            container = %self.store.container()
        );
        self.execute(query).instrument(span).await
    }

    async fn execute(&self, query: &CorrectionQuery) -> Result<ExportSummary, ExportError> {
        let start = Instant::now();

        let fetched = self.source.fetch_corrections(query).await;
        self.source.close().await;
        let rows = fetched.map_err(|e| {
            tracing::error!(error = %e, "Correction query failed, nothing exported");
            ExportError::Source(Box::new(e))
        })?;
        tracing::info!(
            rows = rows.len(),
            since = %query.since,
            max_difference = query.max_difference,
            "Fetched corrections"
        );

        if self.store.create_container_if_absent().await? {
            tracing::info!("Created container");
        }
        let names = self.store.list().await?;
        let mut counter = SequenceCounter::start(self.pattern.clone(), &names);
        let first_sequence = counter.peek();

        let mut outcomes = Vec::with_capacity(rows.len());
        for row in &rows {
            outcomes.push(self.export_row(row, &mut counter).await);
        }

        let summary = ExportSummary {
            rows: rows.len(),
            first_sequence,
            next_sequence: counter.peek(),
            outcomes,
        };
        tracing::info!(
            rows = summary.rows,
            written = summary.written(),
            failed = summary.failed(),
            first_sequence = summary.first_sequence,
            next_sequence = summary.next_sequence,
            latency_ms = start.elapsed().as_millis() as u64,
            "Feedback export complete"
        );
        Ok(summary)
    }

    /// Write one row, skipping numbers already taken in storage.
    async fn export_row(&self, row: &CorrectionRow, counter: &mut SequenceCounter) -> ItemOutcome {
        let row_id = Some(ItemId::Str(row.id.clone()));
        let body = match ExportRecord::from_row(row).to_json() {
            Ok(body) => Bytes::from(body),
            Err(e) => {
                tracing::warn!(row_id = %row.id, error = %e, "Could not format row");
                return ItemOutcome::failed(counter.next_name(), row_id, e);
            }
        };

        let mut name = counter.next_name();
        for _ in 0..MAX_NAME_ATTEMPTS {
            name = counter.next_name();
            match self
                .store
                .put(&name, body.clone(), PutOptions::create_new(TEXT_CONTENT_TYPE))
                .await
            {
                Ok(()) => {
                    counter.advance();
                    tracing::info!(artifact = %name, row_id = %row.id, "Uploaded example");
                    return ItemOutcome::succeeded(name, row_id);
                }
                Err(StorageError::AlreadyExists(_)) => {
                    tracing::warn!(artifact = %name, row_id = %row.id, "Name already taken, trying next number");
                    counter.advance();
                }
                Err(e) => {
                    tracing::warn!(artifact = %name, row_id = %row.id, error = %e, "Upload failed");
                    return ItemOutcome::failed(name, row_id, e);
                }
            }
        }

        tracing::warn!(
            artifact = %name,
            row_id = %row.id,
            attempts = MAX_NAME_ATTEMPTS,
            "No free sequence number found"
        );
        ItemOutcome::failed(
            name,
            row_id,
            format!("no free name after {MAX_NAME_ATTEMPTS} attempts"),
        )
    }
}
