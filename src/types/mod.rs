//! Core types for catalog mirroring.

pub mod item;
pub mod report;

pub use item::{CatalogItem, ItemId, FILE_NAME_FIELD, ID_FIELD};
pub use report::{ExportSummary, ItemOutcome, PruneReport, SyncSummary, WriteReport};
