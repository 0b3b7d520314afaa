//! Azure Blob Storage backend over the REST API.
//!
//! Requests are authorized with SharedKey: an HMAC-SHA256 over the
//! canonical string-to-sign, keyed with the base64-decoded account key.
//!
//! ```text
//! VERB \n Content-Encoding \n Content-Language \n Content-Length \n
//! Content-MD5 \n Content-Type \n Date \n If-Modified-Since \n If-Match \n
//! If-None-Match \n If-Unmodified-Since \n Range \n
//! CanonicalizedHeaders CanonicalizedResource
//! ```

use std::collections::BTreeMap;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use bytes::Bytes;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE, IF_NONE_MATCH};
use reqwest::{Method, StatusCode, Url};
use serde::Deserialize;

use super::{ObjectStore, PutOptions, StorageError};
use crate::config::AzureConfig;

/// REST API version sent with every request.
pub const API_VERSION: &str = "2021-08-06";

/// Blob container accessed through the Blob service REST API.
pub struct AzureBlobStore {
    client: reqwest::Client,
    endpoint: Url,
    account: String,
    key: Vec<u8>,
    container: String,
}

impl AzureBlobStore {
    /// Create a store from configuration.
    pub fn new(config: &AzureConfig) -> Result<Self, StorageError> {
        Self::with_client(reqwest::Client::new(), config)
    }

    /// Create a store sharing an existing HTTP client.
    pub fn with_client(client: reqwest::Client, config: &AzureConfig) -> Result<Self, StorageError> {
        let endpoint = Url::parse(&config.blob_endpoint)
            .map_err(|e| StorageError::Request(format!("invalid blob endpoint: {e}")))?;
        let key = STANDARD
            .decode(config.account_key.trim())
            .map_err(|e| StorageError::Request(format!("account key is not base64: {e}")))?;

        Ok(Self {
            client,
            endpoint,
            account: config.account_name.clone(),
            key,
            container: config.container.clone(),
        })
    }

    fn url(&self, blob: Option<&str>, query: &[(&str, &str)]) -> Result<Url, StorageError> {
        let mut url = self.endpoint.clone();
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| StorageError::Request("blob endpoint cannot be a base URL".to_string()))?;
            segments.pop_if_empty().push(&self.container);
            if let Some(blob) = blob {
                segments.extend(blob.split('/'));
            }
        }
        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query);
        }
        Ok(url)
    }

    /// Compute the SharedKey authorization header value.
    fn authorization(
        &self,
        method: &Method,
        url: &Url,
        headers: &HeaderMap,
        content_length: usize,
    ) -> String {
        let string_to_sign = string_to_sign(&self.account, method, url, headers, content_length);

        use hmac::{Hmac, Mac};
        use sha2::Sha256;

        let mut mac = Hmac::<Sha256>::new_from_slice(&self.key)
            .expect("HMAC accepts any key size");
        mac.update(string_to_sign.as_bytes());
        let signature = STANDARD.encode(mac.finalize().into_bytes());

        format!("SharedKey {}:{}", self.account, signature)
    }

    async fn send(
        &self,
        method: Method,
        url: Url,
        mut headers: HeaderMap,
        body: Option<Bytes>,
    ) -> Result<reqwest::Response, StorageError> {
        let date = chrono::Utc::now().format("%a, %d %b %Y %H:%M:%S GMT").to_string();
        headers.insert(HeaderName::from_static("x-ms-date"), header_value(&date)?);
        headers.insert(HeaderName::from_static("x-ms-version"), HeaderValue::from_static(API_VERSION));

        let content_length = body.as_ref().map(Bytes::len).unwrap_or(0);
        let auth = self.authorization(&method, &url, &headers, content_length);
        headers.insert(reqwest::header::AUTHORIZATION, header_value(&auth)?);

        let mut request = self.client.request(method, url).headers(headers);
        if let Some(body) = body {
            request = request.body(body);
        }
        request
            .send()
            .await
            .map_err(|e| StorageError::Request(e.to_string()))
    }

    async fn status_error(resp: reqwest::Response, target: &str) -> StorageError {
        let status = resp.status().as_u16();
        let body = resp.text().await.unwrap_or_default();
        let message = error_code(&body).unwrap_or(body);
        StorageError::Status {
            status,
            target: target.to_string(),
            message,
        }
    }

    async fn list_page(&self, marker: Option<&str>) -> Result<(Vec<String>, Option<String>), StorageError> {
        let mut query = vec![("restype", "container"), ("comp", "list")];
        if let Some(marker) = marker {
            query.push(("marker", marker));
        }
        let url = self.url(None, &query)?;

        let resp = self.send(Method::GET, url, HeaderMap::new(), None).await?;
        if !resp.status().is_success() {
            return Err(Self::status_error(resp, &self.container).await);
        }
        let body = resp
            .text()
            .await
            .map_err(|e| StorageError::Request(e.to_string()))?;

        parse_listing(&body)
    }
}

#[async_trait]
impl ObjectStore for AzureBlobStore {
    fn container(&self) -> &str {
        &self.container
    }

    async fn create_container_if_absent(&self) -> Result<bool, StorageError> {
        let url = self.url(None, &[("restype", "container")])?;
        let resp = self.send(Method::PUT, url, HeaderMap::new(), None).await?;

        match resp.status() {
            StatusCode::CREATED => {
                tracing::info!(container = %self.container, "Container created");
                Ok(true)
            }
            StatusCode::CONFLICT => {
                tracing::info!(container = %self.container, "Container already exists");
                Ok(false)
            }
            _ => Err(Self::status_error(resp, &self.container).await),
        }
    }

    async fn list(&self) -> Result<Vec<String>, StorageError> {
        let mut names = Vec::new();
        let mut marker: Option<String> = None;

        loop {
            let (page, next) = self.list_page(marker.as_deref()).await?;
            names.extend(page);
            match next {
                Some(next) => marker = Some(next),
                None => break,
            }
        }

        names.sort();
        tracing::debug!(container = %self.container, objects = names.len(), "Listed container");
        Ok(names)
    }

    async fn get(&self, name: &str) -> Result<Bytes, StorageError> {
        let url = self.url(Some(name), &[])?;
        let resp = self.send(Method::GET, url, HeaderMap::new(), None).await?;

        match resp.status() {
            s if s.is_success() => resp
                .bytes()
                .await
                .map_err(|e| StorageError::Request(e.to_string())),
            StatusCode::NOT_FOUND => Err(StorageError::NotFound(name.to_string())),
            _ => Err(Self::status_error(resp, name).await),
        }
    }

    async fn put(&self, name: &str, body: Bytes, options: PutOptions) -> Result<(), StorageError> {
        let url = self.url(Some(name), &[])?;

        let mut headers = HeaderMap::new();
        headers.insert(HeaderName::from_static("x-ms-blob-type"), HeaderValue::from_static("BlockBlob"));
        headers.insert(CONTENT_TYPE, HeaderValue::from_static(options.content_type));
        if !options.overwrite {
            headers.insert(IF_NONE_MATCH, HeaderValue::from_static("*"));
        }

        let resp = self.send(Method::PUT, url, headers, Some(body)).await?;
        match resp.status() {
            s if s.is_success() => Ok(()),
            StatusCode::CONFLICT | StatusCode::PRECONDITION_FAILED if !options.overwrite => {
                Err(StorageError::AlreadyExists(name.to_string()))
            }
            _ => Err(Self::status_error(resp, name).await),
        }
    }

    async fn delete(&self, name: &str) -> Result<(), StorageError> {
        let url = self.url(Some(name), &[])?;
        let resp = self.send(Method::DELETE, url, HeaderMap::new(), None).await?;

        match resp.status() {
            s if s.is_success() => Ok(()),
            StatusCode::NOT_FOUND => Err(StorageError::NotFound(name.to_string())),
            _ => Err(Self::status_error(resp, name).await),
        }
    }
}

fn header_value(value: &str) -> Result<HeaderValue, StorageError> {
    HeaderValue::from_str(value).map_err(|e| StorageError::Request(e.to_string()))
}

fn header<'a>(headers: &'a HeaderMap, name: HeaderName) -> &'a str {
    headers.get(name).and_then(|v| v.to_str().ok()).unwrap_or("")
}

/// Build the SharedKey string-to-sign for a request.
fn string_to_sign(
    account: &str,
    method: &Method,
    url: &Url,
    headers: &HeaderMap,
    content_length: usize,
) -> String {
    use reqwest::header::{
        CONTENT_ENCODING, CONTENT_LANGUAGE, IF_MATCH, IF_MODIFIED_SINCE, IF_UNMODIFIED_SINCE, RANGE,
    };

    let length = if content_length == 0 {
        String::new()
    } else {
        content_length.to_string()
    };

    let mut out = String::new();
    out.push_str(method.as_str());
    out.push('\n');
    for value in [
        header(headers, CONTENT_ENCODING),
        header(headers, CONTENT_LANGUAGE),
        length.as_str(),
        "", // Content-MD5
        header(headers, CONTENT_TYPE),
        "", // Date; x-ms-date is used instead
        header(headers, IF_MODIFIED_SINCE),
        header(headers, IF_MATCH),
        header(headers, IF_NONE_MATCH),
        header(headers, IF_UNMODIFIED_SINCE),
        header(headers, RANGE),
    ] {
        out.push_str(value);
        out.push('\n');
    }

    // Canonicalized headers: x-ms-* sorted by lowercase name
    let mut ms_headers: BTreeMap<String, String> = BTreeMap::new();
    for (name, value) in headers {
        let name = name.as_str().to_lowercase();
        if name.starts_with("x-ms-") {
            ms_headers.insert(name, value.to_str().unwrap_or("").trim().to_string());
        }
    }
    for (name, value) in &ms_headers {
        out.push_str(name);
        out.push(':');
        out.push_str(value);
        out.push('\n');
    }

    // Canonicalized resource: /account/path then sorted query parameters
    out.push('/');
    out.push_str(account);
    out.push_str(url.path());

    let mut params: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for (name, value) in url.query_pairs() {
        params
            .entry(name.to_lowercase())
            .or_default()
            .push(value.into_owned());
    }
    for (name, mut values) in params {
        values.sort();
        out.push('\n');
        out.push_str(&name);
        out.push(':');
        out.push_str(&values.join(","));
    }

    out
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct EnumerationResults {
    #[serde(default)]
    blobs: BlobList,
    #[serde(default)]
    next_marker: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct BlobList {
    #[serde(rename = "Blob", default)]
    blobs: Vec<BlobEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct BlobEntry {
    name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ErrorBody {
    code: Option<String>,
}

/// Parse one `List Blobs` page into names and the continuation marker.
fn parse_listing(xml: &str) -> Result<(Vec<String>, Option<String>), StorageError> {
    let results: EnumerationResults =
        quick_xml::de::from_str(xml).map_err(|e| StorageError::Decode(e.to_string()))?;

    let names = results.blobs.blobs.into_iter().map(|b| b.name).collect();
    let marker = results.next_marker.filter(|m| !m.is_empty());
    Ok((names, marker))
}

fn error_code(xml: &str) -> Option<String> {
    quick_xml::de::from_str::<ErrorBody>(xml).ok().and_then(|e| e.code)
}
