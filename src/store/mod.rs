//! Object storage backends.

pub mod memory;

#[cfg(feature = "remote")]
pub mod azure;

use async_trait::async_trait;
use bytes::Bytes;

/// Content type for catalog artifacts.
pub const JSON_CONTENT_TYPE: &str = "application/json";

/// Content type for exported example artifacts.
pub const TEXT_CONTENT_TYPE: &str = "text/plain; charset=utf-8";

/// Options for a single put.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PutOptions {
    /// MIME type stored with the object.
    pub content_type: &'static str,
    /// Replace an existing object of the same name.
    pub overwrite: bool,
}

impl PutOptions {
    /// Create-or-overwrite.
    pub const fn overwrite(content_type: &'static str) -> Self {
        Self {
            content_type,
            overwrite: true,
        }
    }

    /// Create only; fails with [`StorageError::AlreadyExists`] if the name is taken.
    pub const fn create_new(content_type: &'static str) -> Self {
        Self {
            content_type,
            overwrite: false,
        }
    }
}

/// Error type for object store operations.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum StorageError {
    /// No object with that name.
    #[error("Object not found: {0}")]
    NotFound(String),
    /// Create-only put hit an existing object.
    #[error("Object already exists: {0}")]
    AlreadyExists(String),
    /// The request could not be sent or completed.
    #[error("Storage request failed: {0}")]
    Request(String),
    /// The service answered with an unexpected status.
    #[error("Storage returned HTTP {status} for {target}: {message}")]
    Status {
        /// Status code.
        status: u16,
        /// Container or object addressed.
        target: String,
        /// Service error code or body.
        message: String,
    },
    /// The service response could not be parsed.
    #[error("Malformed storage response: {0}")]
    Decode(String),
}

/// Trait for object storage over a single named container.
///
/// `list` returns names in lexicographic order. Puts are last-write-wins.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Name of the container this store addresses.
    fn container(&self) -> &str;

    /// Create the container if needed. Returns `true` if it was created.
    async fn create_container_if_absent(&self) -> Result<bool, StorageError>;

    /// List every object name in the container.
    async fn list(&self) -> Result<Vec<String>, StorageError>;

    /// Read an object.
    async fn get(&self, name: &str) -> Result<Bytes, StorageError>;

    /// Write an object.
    async fn put(&self, name: &str, body: Bytes, options: PutOptions) -> Result<(), StorageError>;

    /// Delete an object.
    async fn delete(&self, name: &str) -> Result<(), StorageError>;
}

pub use memory::InMemoryObjectStore;

#[cfg(feature = "remote")]
pub use azure::AzureBlobStore;
