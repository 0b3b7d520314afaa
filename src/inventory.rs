//! Reading the stored side of a reconciliation.

use futures::{stream, StreamExt};
use serde_json::Value;

use crate::store::{ObjectStore, StorageError};
use crate::types::CatalogItem;

/// A stored artifact whose content decoded as a catalog item.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredArtifact {
    /// Object name.
    pub name: String,
    /// Decoded content.
    pub item: CatalogItem,
}

/// Snapshot of a container's decodable artifacts.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Inventory {
    /// Artifacts in name order.
    pub artifacts: Vec<StoredArtifact>,
    /// Artifacts that could not be read or decoded, in name order.
    pub skipped: Vec<String>,
}

impl Inventory {
    /// Decoded items, for identifier extraction.
    pub fn items(&self) -> impl Iterator<Item = &CatalogItem> {
        self.artifacts.iter().map(|a| &a.item)
    }
}

enum Loaded {
    Artifact(StoredArtifact),
    Skipped(String),
}

/// List the container and decode every artifact.
///
/// Only a failed listing is an error. An artifact that cannot be read, or
/// whose content is not a JSON object, is skipped with a warning.
pub async fn read_inventory<S>(store: &S, concurrency: usize) -> Result<Inventory, StorageError>
where
    S: ObjectStore + ?Sized,
{
    let names = store.list().await?;

    let loaded: Vec<Loaded> = stream::iter(names)
        .map(|name| async move {
            let body = match store.get(&name).await {
                Ok(body) => body,
                Err(e) => {
                    tracing::warn!(artifact = %name, error = %e, "Could not read artifact, skipping");
                    return Loaded::Skipped(name);
                }
            };
            match serde_json::from_slice::<Value>(&body).ok().and_then(CatalogItem::from_value) {
                Some(item) => Loaded::Artifact(StoredArtifact { name, item }),
                None => {
                    tracing::warn!(artifact = %name, "Artifact is not a JSON object, skipping");
                    Loaded::Skipped(name)
                }
            }
        })
        .buffer_unordered(concurrency.max(1))
        .collect()
        .await;

    let mut inventory = Inventory::default();
    for entry in loaded {
        match entry {
            Loaded::Artifact(a) => inventory.artifacts.push(a),
            Loaded::Skipped(name) => inventory.skipped.push(name),
        }
    }
    inventory.artifacts.sort_by(|a, b| a.name.cmp(&b.name));
    inventory.skipped.sort();

    tracing::info!(
        container = %store.container(),
        artifacts = inventory.artifacts.len(),
        skipped = inventory.skipped.len(),
        "Read storage inventory"
    );
    Ok(inventory)
}
