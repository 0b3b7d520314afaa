//! Catalog-sync run.
//!
//! ```text
//! FETCH_UPSTREAM → FETCH_STORED → DIFF → CREATE → PRUNE → DONE
//! ```
//!
//! Upstream is fetched once and buffered; the same pass yields both the
//! identifier set and the items to write. Any failure before DIFF aborts the
//! run. Failures inside CREATE and PRUNE are per item.

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use tracing::Instrument;
use uuid::Uuid;

use crate::catalog::{CatalogError, CatalogSource};
use crate::config::SyncConfig;
use crate::inventory::{read_inventory, Inventory};
use crate::pruner::ArtifactPruner;
use crate::reconcile::{extract_ids, IdentifierSet, ReconcileError, SetReconciler};
use crate::store::{ObjectStore, StorageError};
use crate::types::{CatalogItem, ItemId, SyncSummary, ID_FIELD};
use crate::writer::ArtifactWriter;

/// Phase of a catalog-sync run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SyncPhase {
    /// Reading the upstream catalog.
    FetchUpstream,
    /// Reading the stored artifacts.
    FetchStored,
    /// Computing creations and removals.
    Diff,
    /// Writing new artifacts.
    Create,
    /// Deleting stale artifacts.
    Prune,
    /// Finished.
    Done,
}

impl SyncPhase {
    /// Phase name as logged.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FetchUpstream => "fetch_upstream",
            Self::FetchStored => "fetch_stored",
            Self::Diff => "diff",
            Self::Create => "create",
            Self::Prune => "prune",
            Self::Done => "done",
        }
    }
}

impl fmt::Display for SyncPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error that aborts a catalog-sync run.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// Upstream fetch or decode failed.
    #[error("Upstream catalog: {0}")]
    Catalog(#[from] CatalogError),
    /// Storage could not be bootstrapped or listed.
    #[error("Storage: {0}")]
    Storage(#[from] StorageError),
    /// The diff was refused.
    #[error(transparent)]
    Reconcile(#[from] ReconcileError),
}

/// Tuning for a catalog-sync run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncOptions {
    /// Identifier field on both sides.
    pub id_field: String,
    /// Maximum concurrent storage requests.
    pub concurrency: usize,
    /// Allow an empty catalog to remove every stored artifact.
    pub allow_empty_upstream: bool,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            id_field: ID_FIELD.to_string(),
            concurrency: 4,
            allow_empty_upstream: false,
        }
    }
}

impl From<&SyncConfig> for SyncOptions {
    fn from(config: &SyncConfig) -> Self {
        Self {
            id_field: config.id_field.clone(),
            concurrency: config.concurrency,
            allow_empty_upstream: config.allow_empty_catalog,
        }
    }
}

/// Reconciles an upstream catalog into an object store.
pub struct CatalogSync<C: CatalogSource, S: ObjectStore> {
    catalog: C,
    store: Arc<S>,
    options: SyncOptions,
}

impl<C: CatalogSource, S: ObjectStore> CatalogSync<C, S> {
    /// Create a run with default options.
    pub fn new(catalog: C, store: Arc<S>) -> Self {
        Self::with_options(catalog, store, SyncOptions::default())
    }

    /// Create a run with explicit options.
    pub fn with_options(catalog: C, store: Arc<S>, options: SyncOptions) -> Self {
        Self {
            catalog,
            store,
            options,
        }
    }

    /// Execute one full run under a fresh `run_id`.
    pub async fn run(&self) -> Result<SyncSummary, SyncError> {
        let span = tracing::info_span!(
            "catalog_sync",
            run_id = %Uuid::new_v4(),
            container = %self.store.container()
        );
        self.execute().instrument(span).await
    }

    async fn execute(&self) -> Result<SyncSummary, SyncError> {
        let start = Instant::now();
        let field = self.options.id_field.as_str();

        enter(SyncPhase::FetchUpstream);
        let upstream_items = self.catalog.fetch_all().await.map_err(|e| {
            tracing::error!(error = %e, "Upstream fetch failed, aborting before diff");
            e
        })?;
        let upstream_ids = extract_ids(&upstream_items, field);

        enter(SyncPhase::FetchStored);
        if self.store.create_container_if_absent().await? {
            tracing::info!("Created container");
        }
        let inventory = read_inventory(self.store.as_ref(), self.options.concurrency).await?;
        let stored_ids = extract_ids(inventory.items(), field);

        enter(SyncPhase::Diff);
        let plan = SetReconciler::new(self.options.allow_empty_upstream)
            .plan(&upstream_ids, &stored_ids)
            .map_err(|e| {
                tracing::error!(error = %e, "Reconciliation refused");
                e
            })?;

        enter(SyncPhase::Create);
        let creates = select_for_create(upstream_items, &plan.to_create, field);
        let write = ArtifactWriter::new(Arc::clone(&self.store), self.options.concurrency)
            .with_id_field(field)
            .with_reserved(retained_names(&inventory, &plan.to_remove, field))
            .write(creates)
            .await;

        enter(SyncPhase::Prune);
        let prune = ArtifactPruner::new(Arc::clone(&self.store), self.options.concurrency)
            .with_id_field(field)
            .prune(&plan.to_remove)
            .await
            .map_err(|e| {
                tracing::error!(
                    error = %e,
                    created = write.succeeded(),
                    "Could not list storage for pruning"
                );
                e
            })?;

        let summary = SyncSummary {
            upstream: upstream_ids.len(),
            stored: stored_ids.len(),
            to_create: plan.to_create.len(),
            to_remove: plan.to_remove.len(),
            write,
            prune,
        };

        enter(SyncPhase::Done);
        tracing::info!(
            upstream = summary.upstream,
            stored = summary.stored,
            created = summary.write.succeeded(),
            create_failed = summary.write.failed(),
            deleted = summary.prune.deleted(),
            delete_failed = summary.prune.failed(),
            latency_ms = start.elapsed().as_millis() as u64,
            "Catalog sync complete"
        );
        Ok(summary)
    }
}

fn enter(phase: SyncPhase) {
    tracing::debug!(phase = %phase, "Entering phase");
}

/// Names of stored artifacts that survive the prune, with their owners.
///
/// Artifacts that failed to decode are kept too; they are never pruned.
fn retained_names(
    inventory: &Inventory,
    to_remove: &IdentifierSet,
    field: &str,
) -> Vec<(String, Option<ItemId>)> {
    let decoded = inventory.artifacts.iter().filter_map(|artifact| {
        let id = artifact.item.id_by(field);
        match &id {
            Some(id) if to_remove.contains(id) => None,
            _ => Some((artifact.name.clone(), id)),
        }
    });
    let skipped = inventory.skipped.iter().map(|name| (name.clone(), None));
    decoded.chain(skipped).collect()
}

/// Keep the first upstream item for each identifier in `to_create`.
fn select_for_create(
    items: Vec<CatalogItem>,
    to_create: &IdentifierSet,
    field: &str,
) -> Vec<CatalogItem> {
    let mut pending = to_create.clone();
    items
        .into_iter()
        .filter(|item| item.id_by(field).is_some_and(|id| pending.remove(&id)))
        .collect()
}
