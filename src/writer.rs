//! Artifact writer for catalog items.
//!
//! One artifact per item, named from the item's own `file_name` (never from
//! the clock), written create-or-overwrite so a repeated write converges.

use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use futures::{stream, StreamExt};

use crate::store::{ObjectStore, PutOptions, JSON_CONTENT_TYPE};
use crate::types::{CatalogItem, ItemId, ItemOutcome, WriteReport, ID_FIELD};

/// Extension given to every catalog artifact.
pub const ARTIFACT_EXTENSION: &str = ".json";

/// Derive the artifact name for an item.
///
/// `file_name` with its extension replaced by `.json`; items without a
/// usable `file_name` are named `<id>.json`.
pub fn artifact_name_for(item: &CatalogItem, id: &ItemId) -> String {
    match item.file_name() {
        Some(file_name) => {
            let base_start = file_name.rfind('/').map(|i| i + 1).unwrap_or(0);
            let stem = match file_name[base_start..].rfind('.') {
                Some(dot) if dot > 0 => &file_name[..base_start + dot],
                _ => file_name,
            };
            format!("{}{}", stem, ARTIFACT_EXTENSION)
        }
        None => format!("{}{}", id, ARTIFACT_EXTENSION),
    }
}

/// Writes catalog items to an object store.
pub struct ArtifactWriter<S: ObjectStore> {
    store: Arc<S>,
    concurrency: usize,
    id_field: String,
    reserved: HashMap<String, Option<ItemId>>,
}

impl<S: ObjectStore> ArtifactWriter<S> {
    /// Create a writer with at most `concurrency` puts in flight.
    pub fn new(store: Arc<S>, concurrency: usize) -> Self {
        Self {
            store,
            concurrency: concurrency.max(1),
            id_field: ID_FIELD.to_string(),
            reserved: HashMap::new(),
        }
    }

    /// Read identifiers from a field other than `id`.
    pub fn with_id_field(mut self, field: impl Into<String>) -> Self {
        self.id_field = field.into();
        self
    }

    /// Mark names already held in storage by artifacts that stay.
    ///
    /// A new item mapping to a reserved name is reported as failed instead
    /// of overwriting the stored owner.
    pub fn with_reserved<I>(mut self, reserved: I) -> Self
    where
        I: IntoIterator<Item = (String, Option<ItemId>)>,
    {
        self.reserved.extend(reserved);
        self
    }

    /// Write every item.
    ///
    /// A failure on one item is logged and recorded; it never stops the
    /// others. Items that map to a reserved name, or to a name already
    /// claimed by an earlier item in the same batch, are not written.
    pub async fn write(&self, items: Vec<CatalogItem>) -> WriteReport {
        let mut claimed = self.reserved.clone();
        let mut jobs = Vec::with_capacity(items.len());
        let mut outcomes = Vec::new();

        for item in items {
            let id = item.id_by(&self.id_field);
            let name = match &id {
                Some(id) => artifact_name_for(&item, id),
                None => {
                    tracing::warn!(field = %self.id_field, "Item has no identifier, not writing");
                    outcomes.push(ItemOutcome::failed("", None, "item has no identifier"));
                    continue;
                }
            };

            if let Some(owner) = claimed.get(&name) {
                let owner = owner.as_ref().map(ToString::to_string).unwrap_or_default();
                tracing::warn!(
                    artifact = %name,
                    item_id = ?id,
                    owner = %owner,
                    "Artifact name already claimed"
                );
                outcomes.push(ItemOutcome::failed(
                    name,
                    id,
                    format!("artifact name collides with item {owner}"),
                ));
                continue;
            }
            claimed.insert(name.clone(), id.clone());
            jobs.push((name, id, item));
        }

        let written: Vec<ItemOutcome> = stream::iter(jobs)
            .map(|(name, id, item)| self.write_one(name, id, item))
            .buffer_unordered(self.concurrency)
            .collect()
            .await;
        outcomes.extend(written);

        let report = WriteReport::from_outcomes(outcomes);
        tracing::info!(
            succeeded = report.succeeded(),
            failed = report.failed(),
            "Artifact write pass complete"
        );
        report
    }

    async fn write_one(&self, name: String, id: Option<ItemId>, item: CatalogItem) -> ItemOutcome {
        let body = match serde_json::to_vec_pretty(&item) {
            Ok(body) => Bytes::from(body),
            Err(e) => {
                tracing::warn!(artifact = %name, error = %e, "Could not serialize item");
                return ItemOutcome::failed(name, id, e);
            }
        };

        match self
            .store
            .put(&name, body, PutOptions::overwrite(JSON_CONTENT_TYPE))
            .await
        {
            Ok(()) => {
                tracing::info!(artifact = %name, item_id = ?id, "Uploaded artifact");
                ItemOutcome::succeeded(name, id)
            }
            Err(e) => {
                tracing::warn!(artifact = %name, item_id = ?id, error = %e, "Upload failed");
                ItemOutcome::failed(name, id, e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryObjectStore;
    use serde_json::{json, Value};

    fn item(value: Value) -> CatalogItem {
        CatalogItem::from_value(value).unwrap()
    }

    #[test]
    fn test_name_replaces_extension() {
        let id = ItemId::Int(1);
        assert_eq!(artifact_name_for(&item(json!({"file_name": "a.txt"})), &id), "a.json");
        assert_eq!(artifact_name_for(&item(json!({"file_name": "a.b.txt"})), &id), "a.b.json");
        assert_eq!(artifact_name_for(&item(json!({"file_name": "noext"})), &id), "noext.json");
        assert_eq!(artifact_name_for(&item(json!({"file_name": "a.json"})), &id), "a.json");
    }

    #[test]
    fn test_name_ignores_dots_in_directories() {
        let id = ItemId::Int(1);
        assert_eq!(artifact_name_for(&item(json!({"file_name": "v1.2/item"})), &id), "v1.2/item.json");
        assert_eq!(artifact_name_for(&item(json!({"file_name": "dir/.hidden"})), &id), "dir/.hidden.json");
    }

    #[test]
    fn test_name_falls_back_to_id() {
        assert_eq!(artifact_name_for(&item(json!({"id": 42})), &ItemId::Int(42)), "42.json");
        assert_eq!(
            artifact_name_for(&item(json!({"id": "sku", "file_name": ""})), &ItemId::from("sku")),
            "sku.json"
        );
    }

    #[tokio::test]
    async fn test_write_round_trip() {
        let store = Arc::new(InMemoryObjectStore::new("mirror"));
        let writer = ArtifactWriter::new(Arc::clone(&store), 2);
        let original = item(json!({"id": 1, "file_name": "a.txt", "tags": ["x", "y"], "price": 9.5}));

        let report = writer.write(vec![original.clone()]).await;
        assert_eq!(report.succeeded(), 1);

        let stored = store.object("a.json").unwrap();
        assert_eq!(stored.content_type, JSON_CONTENT_TYPE);
        let decoded: CatalogItem = serde_json::from_slice(&stored.body).unwrap();
        assert_eq!(decoded, original);
    }

    #[tokio::test]
    async fn test_partial_failure_is_isolated() {
        let store = Arc::new(InMemoryObjectStore::new("mirror"));
        store.fail_put("p3.json");
        let writer = ArtifactWriter::new(Arc::clone(&store), 3);

        let items = (1..=5)
            .map(|i| item(json!({"id": i, "file_name": format!("p{i}.txt")})))
            .collect();
        let report = writer.write(items).await;

        assert_eq!(report.succeeded(), 4);
        assert_eq!(report.failed(), 1);
        assert_eq!(report.failures().next().unwrap().item_id, Some(ItemId::Int(3)));
        assert_eq!(store.names(), vec!["p1.json", "p2.json", "p4.json", "p5.json"]);
    }

    #[tokio::test]
    async fn test_name_collision_in_batch() {
        let store = Arc::new(InMemoryObjectStore::new("mirror"));
        let writer = ArtifactWriter::new(Arc::clone(&store), 1);

        let report = writer
            .write(vec![
                item(json!({"id": 1, "file_name": "same.txt"})),
                item(json!({"id": 2, "file_name": "same.txt"})),
            ])
            .await;

        assert_eq!(report.succeeded(), 1);
        assert_eq!(report.failed(), 1);
        let stored: CatalogItem = serde_json::from_slice(&store.object("same.json").unwrap().body).unwrap();
        assert_eq!(stored.id(), Some(ItemId::Int(1)));
    }

    #[tokio::test]
    async fn test_reserved_name_is_not_overwritten() {
        let store = Arc::new(InMemoryObjectStore::new("mirror"));
        store.insert("same.json", r#"{"id": 1, "file_name": "same.txt"}"#);
        let writer = ArtifactWriter::new(Arc::clone(&store), 1)
            .with_reserved([("same.json".to_string(), Some(ItemId::Int(1)))]);

        let report = writer
            .write(vec![
                item(json!({"id": 2, "file_name": "same.txt"})),
                item(json!({"id": 3, "file_name": "other.txt"})),
            ])
            .await;

        assert_eq!(report.succeeded(), 1);
        let failure = report.failures().next().unwrap();
        assert_eq!(failure.item_id, Some(ItemId::Int(2)));
        assert_eq!(store.put_count(), 1);
        let stored: CatalogItem = serde_json::from_slice(&store.object("same.json").unwrap().body).unwrap();
        assert_eq!(stored.id(), Some(ItemId::Int(1)));
    }

    #[tokio::test]
    async fn test_rewrite_overwrites() {
        let store = Arc::new(InMemoryObjectStore::new("mirror"));
        let writer = ArtifactWriter::new(Arc::clone(&store), 1);

        writer.write(vec![item(json!({"id": 1, "file_name": "a.txt", "v": 1}))]).await;
        writer.write(vec![item(json!({"id": 1, "file_name": "a.txt", "v": 2}))]).await;

        let stored: CatalogItem = serde_json::from_slice(&store.object("a.json").unwrap().body).unwrap();
        assert_eq!(stored.get("v"), Some(&json!(2)));
        assert_eq!(store.len(), 1);
    }
}
