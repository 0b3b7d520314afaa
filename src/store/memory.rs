//! In-memory object store for testing.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;

use super::{ObjectStore, PutOptions, StorageError};

/// A stored object.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredObject {
    /// Object body.
    pub body: Bytes,
    /// Content type recorded at write time.
    pub content_type: String,
}

/// Names for which an operation should fail.
#[derive(Debug, Default)]
struct Faults {
    puts: BTreeSet<String>,
    gets: BTreeSet<String>,
    deletes: BTreeSet<String>,
    list: bool,
}

/// In-memory object store.
///
/// Uses a BTreeMap so listings come back in name order. Failures can be
/// injected per name to exercise partial-failure paths.
#[derive(Debug)]
pub struct InMemoryObjectStore {
    container: String,
    created: Mutex<bool>,
    objects: Mutex<BTreeMap<String, StoredObject>>,
    faults: Mutex<Faults>,
    puts: AtomicUsize,
    deletes: AtomicUsize,
}

impl InMemoryObjectStore {
    /// Create a new empty store. The container does not exist yet.
    pub fn new(container: impl Into<String>) -> Self {
        Self {
            container: container.into(),
            created: Mutex::new(false),
            objects: Mutex::new(BTreeMap::new()),
            faults: Mutex::new(Faults::default()),
            puts: AtomicUsize::new(0),
            deletes: AtomicUsize::new(0),
        }
    }

    /// Seed an object directly, bypassing counters and faults.
    pub fn insert(&self, name: impl Into<String>, body: impl Into<Bytes>) {
        *self.created.lock() = true;
        self.objects.lock().insert(
            name.into(),
            StoredObject {
                body: body.into(),
                content_type: super::JSON_CONTENT_TYPE.to_string(),
            },
        );
    }

    /// Read an object without going through the trait.
    pub fn object(&self, name: &str) -> Option<StoredObject> {
        self.objects.lock().get(name).cloned()
    }

    /// All object names.
    pub fn names(&self) -> Vec<String> {
        self.objects.lock().keys().cloned().collect()
    }

    /// Number of objects.
    pub fn len(&self) -> usize {
        self.objects.lock().len()
    }

    /// Whether the store holds no objects.
    pub fn is_empty(&self) -> bool {
        self.objects.lock().is_empty()
    }

    /// Whether the container has been created.
    pub fn container_exists(&self) -> bool {
        *self.created.lock()
    }

    /// Make every put to `name` fail.
    pub fn fail_put(&self, name: impl Into<String>) {
        self.faults.lock().puts.insert(name.into());
    }

    /// Make every get of `name` fail.
    pub fn fail_get(&self, name: impl Into<String>) {
        self.faults.lock().gets.insert(name.into());
    }

    /// Make every delete of `name` fail.
    pub fn fail_delete(&self, name: impl Into<String>) {
        self.faults.lock().deletes.insert(name.into());
    }

    /// Make listing fail.
    pub fn fail_list(&self) {
        self.faults.lock().list = true;
    }

    /// Remove every injected failure.
    pub fn clear_faults(&self) {
        *self.faults.lock() = Faults::default();
    }

    /// Successful puts so far.
    pub fn put_count(&self) -> usize {
        self.puts.load(Ordering::SeqCst)
    }

    /// Successful deletes so far.
    pub fn delete_count(&self) -> usize {
        self.deletes.load(Ordering::SeqCst)
    }

    fn injected(name: &str, op: &str) -> StorageError {
        StorageError::Request(format!("injected {op} failure for {name}"))
    }
}

#[async_trait]
impl ObjectStore for InMemoryObjectStore {
    fn container(&self) -> &str {
        &self.container
    }

    async fn create_container_if_absent(&self) -> Result<bool, StorageError> {
        let mut created = self.created.lock();
        if *created {
            return Ok(false);
        }
        *created = true;
        Ok(true)
    }

    async fn list(&self) -> Result<Vec<String>, StorageError> {
        if self.faults.lock().list {
            return Err(Self::injected(&self.container, "list"));
        }
        Ok(self.names())
    }

    async fn get(&self, name: &str) -> Result<Bytes, StorageError> {
        if self.faults.lock().gets.contains(name) {
            return Err(Self::injected(name, "get"));
        }
        self.objects
            .lock()
            .get(name)
            .map(|o| o.body.clone())
            .ok_or_else(|| StorageError::NotFound(name.to_string()))
    }

    async fn put(&self, name: &str, body: Bytes, options: PutOptions) -> Result<(), StorageError> {
        if self.faults.lock().puts.contains(name) {
            return Err(Self::injected(name, "put"));
        }

        let mut objects = self.objects.lock();
        if !options.overwrite && objects.contains_key(name) {
            return Err(StorageError::AlreadyExists(name.to_string()));
        }
        objects.insert(
            name.to_string(),
            StoredObject {
                body,
                content_type: options.content_type.to_string(),
            },
        );
        self.puts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn delete(&self, name: &str) -> Result<(), StorageError> {
        if self.faults.lock().deletes.contains(name) {
            return Err(Self::injected(name, "delete"));
        }
        match self.objects.lock().remove(name) {
            Some(_) => {
                self.deletes.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
            None => Err(StorageError::NotFound(name.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{JSON_CONTENT_TYPE, TEXT_CONTENT_TYPE};

    #[tokio::test]
    async fn test_create_container_once() {
        let store = InMemoryObjectStore::new("mirror");
        assert!(store.create_container_if_absent().await.unwrap());
        assert!(!store.create_container_if_absent().await.unwrap());
        assert!(store.container_exists());
    }

    #[tokio::test]
    async fn test_put_get_delete() {
        let store = InMemoryObjectStore::new("mirror");
        store
            .put("a.json", Bytes::from_static(b"{}"), PutOptions::overwrite(JSON_CONTENT_TYPE))
            .await
            .unwrap();

        assert_eq!(store.get("a.json").await.unwrap(), Bytes::from_static(b"{}"));
        assert_eq!(store.list().await.unwrap(), vec!["a.json"]);

        store.delete("a.json").await.unwrap();
        assert!(matches!(store.get("a.json").await, Err(StorageError::NotFound(_))));
        assert!(matches!(store.delete("a.json").await, Err(StorageError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_create_new_rejects_existing() {
        let store = InMemoryObjectStore::new("mirror");
        store.insert("examples/example11.txt", "x");

        let err = store
            .put(
                "examples/example11.txt",
                Bytes::from_static(b"y"),
                PutOptions::create_new(TEXT_CONTENT_TYPE),
            )
            .await
            .unwrap_err();

        assert_eq!(err, StorageError::AlreadyExists("examples/example11.txt".into()));
        assert_eq!(store.object("examples/example11.txt").unwrap().body, Bytes::from_static(b"x"));
    }

    #[tokio::test]
    async fn test_overwrite_is_last_write_wins() {
        let store = InMemoryObjectStore::new("mirror");
        let opts = PutOptions::overwrite(JSON_CONTENT_TYPE);
        store.put("a.json", Bytes::from_static(b"1"), opts).await.unwrap();
        store.put("a.json", Bytes::from_static(b"2"), opts).await.unwrap();

        assert_eq!(store.get("a.json").await.unwrap(), Bytes::from_static(b"2"));
        assert_eq!(store.put_count(), 2);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_injected_faults() {
        let store = InMemoryObjectStore::new("mirror");
        store.insert("a.json", "{}");
        store.fail_get("a.json");
        store.fail_delete("a.json");
        store.fail_put("b.json");

        assert!(store.get("a.json").await.is_err());
        assert!(store.delete("a.json").await.is_err());
        assert!(store
            .put("b.json", Bytes::new(), PutOptions::overwrite(JSON_CONTENT_TYPE))
            .await
            .is_err());

        store.fail_list();
        assert!(store.list().await.is_err());
    }
}
