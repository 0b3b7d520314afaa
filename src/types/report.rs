//! Per-item outcomes and per-run summaries.

use serde::{Deserialize, Serialize};

use super::item::ItemId;

/// Result of one create or delete against the object store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemOutcome {
    /// Artifact name acted on.
    pub artifact: String,
    /// Identifier of the catalog item, when known.
    pub item_id: Option<ItemId>,
    /// Error message if the operation failed.
    pub error: Option<String>,
}

impl ItemOutcome {
    /// A successful operation.
    pub fn succeeded(artifact: impl Into<String>, item_id: Option<ItemId>) -> Self {
        Self {
            artifact: artifact.into(),
            item_id,
            error: None,
        }
    }

    /// A failed operation.
    pub fn failed(
        artifact: impl Into<String>,
        item_id: Option<ItemId>,
        error: impl ToString,
    ) -> Self {
        Self {
            artifact: artifact.into(),
            item_id,
            error: Some(error.to_string()),
        }
    }

    /// Whether the operation succeeded.
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

fn sorted(mut outcomes: Vec<ItemOutcome>) -> Vec<ItemOutcome> {
    outcomes.sort_by(|a, b| a.artifact.cmp(&b.artifact));
    outcomes
}

/// Report of an artifact write pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WriteReport {
    /// Outcomes ordered by artifact name.
    pub outcomes: Vec<ItemOutcome>,
}

impl WriteReport {
    /// Build a report; outcomes are sorted by artifact name.
    pub fn from_outcomes(outcomes: Vec<ItemOutcome>) -> Self {
        Self {
            outcomes: sorted(outcomes),
        }
    }

    /// Number of successful writes.
    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_success()).count()
    }

    /// Number of failed writes.
    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.succeeded()
    }

    /// Failed outcomes only.
    pub fn failures(&self) -> impl Iterator<Item = &ItemOutcome> {
        self.outcomes.iter().filter(|o| !o.is_success())
    }
}

/// Report of an artifact prune pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PruneReport {
    /// Delete attempts ordered by artifact name.
    pub outcomes: Vec<ItemOutcome>,
    /// Artifacts that could not be read or parsed and were left in place.
    pub skipped: Vec<String>,
    /// Artifacts inspected and kept.
    pub retained: usize,
}

impl PruneReport {
    /// Build a report; outcomes and skipped names are sorted.
    pub fn new(outcomes: Vec<ItemOutcome>, mut skipped: Vec<String>, retained: usize) -> Self {
        skipped.sort();
        Self {
            outcomes: sorted(outcomes),
            skipped,
            retained,
        }
    }

    /// Number of artifacts deleted.
    pub fn deleted(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_success()).count()
    }

    /// Number of failed deletions.
    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.deleted()
    }
}

/// Summary of a catalog-sync run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SyncSummary {
    /// Distinct identifiers seen upstream.
    pub upstream: usize,
    /// Distinct identifiers found in storage.
    pub stored: usize,
    /// Identifiers that had to be created.
    pub to_create: usize,
    /// Identifiers that had to be removed.
    pub to_remove: usize,
    /// Create pass report.
    pub write: WriteReport,
    /// Prune pass report.
    pub prune: PruneReport,
}

impl SyncSummary {
    /// True when no create or delete failed.
    pub fn is_clean(&self) -> bool {
        self.write.failed() == 0 && self.prune.failed() == 0
    }
}

/// Summary of a feedback-export run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExportSummary {
    /// Rows returned by the source query.
    pub rows: usize,
    /// Sequence number allocated at the start of the run.
    pub first_sequence: u64,
    /// Next free sequence number at the end of the run.
    pub next_sequence: u64,
    /// Per-row outcomes in processing order.
    pub outcomes: Vec<ItemOutcome>,
}

impl ExportSummary {
    /// Number of rows written.
    pub fn written(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_success()).count()
    }

    /// Number of rows that failed.
    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.written()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_report_counts() {
        let report = WriteReport::from_outcomes(vec![
            ItemOutcome::succeeded("b.json", Some(ItemId::Int(2))),
            ItemOutcome::failed("c.json", Some(ItemId::Int(3)), "boom"),
            ItemOutcome::succeeded("a.json", Some(ItemId::Int(1))),
        ]);

        assert_eq!(report.succeeded(), 2);
        assert_eq!(report.failed(), 1);
        assert_eq!(report.outcomes[0].artifact, "a.json");
        assert_eq!(report.failures().next().unwrap().artifact, "c.json");
    }

    #[test]
    fn test_prune_report_counts() {
        let report = PruneReport::new(
            vec![
                ItemOutcome::succeeded("x.json", Some(ItemId::Int(9))),
                ItemOutcome::failed("y.json", Some(ItemId::Int(8)), "denied"),
            ],
            vec!["z.bin".to_string(), "readme.md".to_string()],
            4,
        );

        assert_eq!(report.deleted(), 1);
        assert_eq!(report.failed(), 1);
        assert_eq!(report.skipped, vec!["readme.md", "z.bin"]);
    }
}
