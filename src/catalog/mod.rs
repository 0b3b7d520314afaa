//! Upstream catalog sources.

pub mod decoder;

#[cfg(feature = "remote")]
pub mod http;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use futures::TryStreamExt;

use crate::types::CatalogItem;

pub use decoder::{decode_stream, FragmentDecoder};

#[cfg(feature = "remote")]
pub use http::HttpCatalogSource;

/// Lazy, non-restartable stream of decoded catalog items.
pub type ItemStream = BoxStream<'static, Result<CatalogItem, CatalogError>>;

/// Error type for upstream catalog access.
#[derive(Debug, Clone, thiserror::Error)]
pub enum CatalogError {
    /// Network-level failure.
    #[error("Transport error: {0}")]
    Transport(String),
    /// Upstream answered with a non-success status.
    #[error("Upstream returned HTTP {status}: {body}")]
    Http {
        /// Status code.
        status: u16,
        /// Response body, possibly empty.
        body: String,
    },
    /// Upstream did not finish in time.
    #[error("Timed out fetching catalog")]
    Timeout,
    /// Malformed fragment in the body.
    #[error("Decode error: {0}")]
    Decode(String),
}

impl CatalogError {
    /// Whether this is a transport-level failure rather than bad content.
    pub fn is_transport(&self) -> bool {
        !matches!(self, Self::Decode(_))
    }
}

/// Trait for upstream catalog sources.
///
/// Each call opens a fresh fetch; the returned stream is consumed once.
#[async_trait]
pub trait CatalogSource: Send + Sync {
    /// Open the catalog stream.
    async fn open(&self) -> Result<ItemStream, CatalogError>;

    /// Read the whole catalog into memory in one pass.
    async fn fetch_all(&self) -> Result<Vec<CatalogItem>, CatalogError> {
        let items: Vec<CatalogItem> = self.open().await?.try_collect().await?;
        tracing::info!(items = items.len(), "Fetched upstream catalog");
        Ok(items)
    }
}

/// Catalog source over fixed body chunks.
///
/// Used in tests and for replaying a captured upstream body.
#[derive(Debug, Clone)]
pub struct StaticCatalogSource {
    body: Result<Vec<Bytes>, CatalogError>,
}

impl StaticCatalogSource {
    /// Serve the given chunks in order.
    pub fn from_chunks<I, B>(chunks: I) -> Self
    where
        I: IntoIterator<Item = B>,
        B: Into<Bytes>,
    {
        Self {
            body: Ok(chunks.into_iter().map(Into::into).collect()),
        }
    }

    /// Serve one newline-delimited fragment per item.
    pub fn from_items(items: &[serde_json::Value]) -> Self {
        Self::from_chunks(items.iter().map(|v| format!("{}\n", v)))
    }

    /// Fail every fetch with the given error.
    pub fn failing(error: CatalogError) -> Self {
        Self { body: Err(error) }
    }
}

#[async_trait]
impl CatalogSource for StaticCatalogSource {
    async fn open(&self) -> Result<ItemStream, CatalogError> {
        let chunks = self.body.clone()?;
        let bytes = futures::stream::iter(chunks.into_iter().map(Ok));
        Ok(Box::pin(decode_stream(bytes)))
    }
}
