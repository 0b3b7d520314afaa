//! Streaming HTTP catalog source.

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;

use super::{decode_stream, CatalogError, CatalogSource, ItemStream};

/// Catalog source that GETs a streaming endpoint.
///
/// The request timeout covers connecting and reading the whole body.
#[derive(Debug, Clone)]
pub struct HttpCatalogSource {
    client: reqwest::Client,
    url: String,
    timeout: Duration,
}

impl HttpCatalogSource {
    /// Create a source with a fresh client.
    pub fn new(url: impl Into<String>, timeout: Duration) -> Self {
        Self::with_client(reqwest::Client::new(), url, timeout)
    }

    /// Create a source sharing an existing client.
    pub fn with_client(client: reqwest::Client, url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client,
            url: url.into(),
            timeout,
        }
    }

    /// Endpoint URL.
    pub fn url(&self) -> &str {
        &self.url
    }

    fn map_error(err: reqwest::Error) -> CatalogError {
        if err.is_timeout() {
            CatalogError::Timeout
        } else {
            CatalogError::Transport(err.to_string())
        }
    }
}

#[async_trait]
impl CatalogSource for HttpCatalogSource {
    async fn open(&self) -> Result<ItemStream, CatalogError> {
        tracing::debug!(url = %self.url, "Opening catalog stream");

        let resp = self
            .client
            .get(&self.url)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(Self::map_error)?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(CatalogError::Http {
                status: status.as_u16(),
                body,
            });
        }

        let bytes = resp.bytes_stream().map(|r| r.map_err(Self::map_error));
        Ok(Box::pin(decode_stream(bytes)))
    }
}
