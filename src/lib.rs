//! # catalog-mirror
//!
//! Idempotent reconciliation of a streamed catalog into object storage,
//! plus sequential export of reviewed support replies.
//!
//! ## Core Contract
//!
//! 1. Every run recomputes both identifier sets from scratch; nothing but the
//!    stored artifacts survives between runs
//! 2. `to_create = upstream − stored`, `to_remove = stored − upstream`
//! 3. A failed or empty upstream fetch never turns into "delete everything"
//! 4. Export numbers continue from the highest existing `example<N>.txt`
//!
//! ## Architecture
//!
//! ```text
//! CatalogSource ──► FragmentDecoder ──► extract_ids ─┐
//!                                                    ├─► SetReconciler ──► ArtifactWriter
//! ObjectStore ────► read_inventory ───► extract_ids ─┘                 └─► ArtifactPruner
//!
//! CorrectionSource ──► ExportRecord ──► SequenceCounter ──► ObjectStore
//! ```
//!
//! ## Convergence Guarantees
//!
//! - Running a sync twice with no upstream change performs zero writes and
//!   zero deletes on the second run
//! - Artifact names derive from item content, never from the clock
//! - Per-item failures are reported, never fatal; the next run retries them

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod types;
pub mod catalog;
pub mod reconcile;
pub mod store;
pub mod inventory;
pub mod writer;
pub mod pruner;
pub mod sequence;
pub mod source;
pub mod sync;
pub mod export;
pub mod config;

// Re-exports
pub use types::{
    CatalogItem, ExportSummary, ItemId, ItemOutcome, PruneReport, SyncSummary, WriteReport,
    FILE_NAME_FIELD, ID_FIELD,
};
pub use catalog::{decode_stream, CatalogError, CatalogSource, FragmentDecoder, StaticCatalogSource};
#[cfg(feature = "remote")]
pub use catalog::HttpCatalogSource;
pub use reconcile::{extract_ids, reconcile, IdentifierSet, ReconcileError, Reconciliation, SetReconciler};
pub use store::{InMemoryObjectStore, ObjectStore, PutOptions, StorageError};
#[cfg(feature = "remote")]
pub use store::AzureBlobStore;
pub use inventory::{read_inventory, Inventory, StoredArtifact};
pub use writer::{artifact_name_for, ArtifactWriter};
pub use pruner::ArtifactPruner;
pub use sequence::{next_sequence, SequenceCounter, SequencePattern, DEFAULT_SEQUENCE_FLOOR};
pub use source::{
    CorrectionQuery, CorrectionRow, CorrectionSource, InMemoryCorrectionSource, OrderColumn,
    SortDirection,
};
#[cfg(feature = "postgres")]
pub use source::PostgresCorrectionSource;
pub use sync::{CatalogSync, SyncError, SyncOptions, SyncPhase};
pub use export::{ExportError, ExportRecord, FeedbackExport};
pub use config::{AzureConfig, ConfigError, ExportConfig, PostgresConfig, SyncConfig};
