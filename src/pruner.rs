//! Removal of artifacts whose items left the catalog.

use std::sync::Arc;

use futures::{stream, StreamExt};

use crate::inventory::{read_inventory, StoredArtifact};
use crate::reconcile::IdentifierSet;
use crate::store::{ObjectStore, StorageError};
use crate::types::{ItemId, ItemOutcome, PruneReport, ID_FIELD};

/// Deletes stored artifacts by the identifier inside them.
///
/// The artifact name is never trusted: every candidate is read and its
/// identifier field compared against the removal set. Artifacts that cannot
/// be read or carry no identifier are left alone.
pub struct ArtifactPruner<S: ObjectStore> {
    store: Arc<S>,
    concurrency: usize,
    id_field: String,
}

impl<S: ObjectStore> ArtifactPruner<S> {
    /// Create a pruner with at most `concurrency` requests in flight.
    pub fn new(store: Arc<S>, concurrency: usize) -> Self {
        Self {
            store,
            concurrency: concurrency.max(1),
            id_field: ID_FIELD.to_string(),
        }
    }

    /// Read identifiers from a field other than `id`.
    pub fn with_id_field(mut self, field: impl Into<String>) -> Self {
        self.id_field = field.into();
        self
    }

    /// Delete every artifact whose identifier is in `to_remove`.
    ///
    /// Works from a fresh listing. A failed listing is an error; a failed
    /// delete is recorded and the pass continues.
    pub async fn prune(&self, to_remove: &IdentifierSet) -> Result<PruneReport, StorageError> {
        if to_remove.is_empty() {
            tracing::debug!("Nothing to prune");
            return Ok(PruneReport::default());
        }

        let inventory = read_inventory(self.store.as_ref(), self.concurrency).await?;

        let mut retained = 0usize;
        let mut targets: Vec<(StoredArtifact, ItemId)> = Vec::new();
        for artifact in inventory.artifacts {
            match artifact.item.id_by(&self.id_field) {
                Some(id) if to_remove.contains(&id) => targets.push((artifact, id)),
                _ => retained += 1,
            }
        }

        let outcomes: Vec<ItemOutcome> = stream::iter(targets)
            .map(|(artifact, id)| self.delete_one(artifact.name, id))
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        let report = PruneReport::new(outcomes, inventory.skipped, retained);
        tracing::info!(
            deleted = report.deleted(),
            failed = report.failed(),
            skipped = report.skipped.len(),
            retained = report.retained,
            "Prune pass complete"
        );
        Ok(report)
    }

    async fn delete_one(&self, name: String, id: ItemId) -> ItemOutcome {
        match self.store.delete(&name).await {
            Ok(()) => {
                tracing::info!(artifact = %name, item_id = %id, "Deleted artifact");
                ItemOutcome::succeeded(name, Some(id))
            }
            // Already gone; the desired end state holds.
            Err(StorageError::NotFound(_)) => {
                tracing::debug!(artifact = %name, item_id = %id, "Artifact already deleted");
                ItemOutcome::succeeded(name, Some(id))
            }
            Err(e) => {
                tracing::warn!(artifact = %name, item_id = %id, error = %e, "Delete failed");
                ItemOutcome::failed(name, Some(id), e)
            }
        }
    }
}
