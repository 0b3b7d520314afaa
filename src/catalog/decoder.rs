//! Incremental decoder for framed JSON catalog streams.
//!
//! The upstream body is a sequence of JSON fragments. Each fragment is
//! either a single object or an array of objects; fragments are usually
//! newline-delimited, but any whitespace separation is accepted and a
//! fragment may be split across transport chunks.

use async_stream::try_stream;
use bytes::Bytes;
use futures::{Stream, StreamExt};
use serde_json::Value;

use super::CatalogError;
use crate::types::CatalogItem;

/// Stateful decoder fed with raw transport chunks.
///
/// A bracket scanner finds fragment boundaries as bytes arrive; each byte is
/// scanned once and each complete fragment is parsed once. A malformed
/// fragment fails the whole decode; there is no partial-fragment recovery.
#[derive(Debug, Default)]
pub struct FragmentDecoder {
    buffer: Vec<u8>,
    scan: Scan,
    fragments: usize,
    items: usize,
    parses: usize,
}

/// Scanner state over the unconsumed buffer.
#[derive(Debug, Default)]
struct Scan {
    /// Next byte to inspect.
    pos: usize,
    /// Start of the open fragment.
    start: usize,
    depth: usize,
    in_string: bool,
    escaped: bool,
}

impl FragmentDecoder {
    /// Create an empty decoder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one chunk and return every item completed by it.
    pub fn push(&mut self, chunk: &[u8]) -> Result<Vec<CatalogItem>, CatalogError> {
        self.buffer.extend_from_slice(chunk);
        self.drain()
    }

    /// Signal end of input.
    ///
    /// Fails if a fragment was left incomplete.
    pub fn finish(mut self) -> Result<Vec<CatalogItem>, CatalogError> {
        let items = self.drain()?;
        if self.buffer.iter().any(|b| !b.is_ascii_whitespace()) {
            return Err(CatalogError::Decode(format!(
                "truncated fragment #{} ({} trailing bytes)",
                self.fragments + 1,
                self.buffer.len()
            )));
        }
        tracing::debug!(
            fragments = self.fragments,
            items = self.items + items.len(),
            "Catalog stream decoded"
        );
        Ok(items)
    }

    /// Number of complete fragments seen so far.
    pub fn fragments(&self) -> usize {
        self.fragments
    }

    fn drain(&mut self) -> Result<Vec<CatalogItem>, CatalogError> {
        let mut items = Vec::new();
        let mut consumed = 0;

        while self.scan.pos < self.buffer.len() {
            let at = self.scan.pos;
            let byte = self.buffer[at];
            self.scan.pos += 1;

            if self.scan.in_string {
                if self.scan.escaped {
                    self.scan.escaped = false;
                } else if byte == b'\\' {
                    self.scan.escaped = true;
                } else if byte == b'"' {
                    self.scan.in_string = false;
                }
                continue;
            }

            match byte {
                b'{' | b'[' => {
                    if self.scan.depth == 0 {
                        self.scan.start = at;
                    }
                    self.scan.depth += 1;
                }
                b'"' if self.scan.depth > 0 => self.scan.in_string = true,
                b'}' | b']' if self.scan.depth > 0 => {
                    self.scan.depth -= 1;
                    if self.scan.depth == 0 {
                        let fragment = &self.buffer[self.scan.start..self.scan.pos];
                        self.fragments += 1;
                        self.parses += 1;
                        let value: Value = serde_json::from_slice(fragment).map_err(|e| {
                            CatalogError::Decode(format!("fragment #{}: {}", self.fragments, e))
                        })?;
                        flatten_fragment(value, self.fragments, &mut items)?;
                        consumed = self.scan.pos;
                    }
                }
                _ if self.scan.depth > 0 => {}
                b if b.is_ascii_whitespace() => consumed = self.scan.pos,
                other => {
                    return Err(CatalogError::Decode(format!(
                        "fragment #{}: expected object or array, found {}",
                        self.fragments + 1,
                        leading_kind(other)
                    )));
                }
            }
        }

        self.buffer.drain(..consumed);
        self.scan.pos -= consumed;
        if self.scan.depth > 0 {
            self.scan.start -= consumed;
        }
        self.items += items.len();
        Ok(items)
    }
}

/// Kind of a top-level value from its first byte.
fn leading_kind(byte: u8) -> &'static str {
    match byte {
        b'"' => "string",
        b'-' | b'0'..=b'9' => "number",
        b't' | b'f' => "boolean",
        b'n' => "null",
        _ => "unexpected character",
    }
}

fn flatten_fragment(
    value: Value,
    index: usize,
    out: &mut Vec<CatalogItem>,
) -> Result<(), CatalogError> {
    match value {
        Value::Object(fields) => {
            out.push(CatalogItem::new(fields));
            Ok(())
        }
        Value::Array(values) => {
            for (position, value) in values.into_iter().enumerate() {
                match CatalogItem::from_value(value) {
                    Some(item) => out.push(item),
                    None => {
                        return Err(CatalogError::Decode(format!(
                            "fragment #{index}: element {position} is not an object"
                        )));
                    }
                }
            }
            Ok(())
        }
        other => Err(CatalogError::Decode(format!(
            "fragment #{index}: expected object or array, found {}",
            json_kind(&other)
        ))),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Decode a byte stream into a lazy stream of catalog items.
///
/// Transport errors from the input are passed through unchanged; the
/// stream ends at the first error.
pub fn decode_stream<S>(bytes: S) -> impl Stream<Item = Result<CatalogItem, CatalogError>> + Send
where
    S: Stream<Item = Result<Bytes, CatalogError>> + Send + 'static,
{
    try_stream! {
        let mut bytes = Box::pin(bytes);
        let mut decoder = FragmentDecoder::new();
        while let Some(chunk) = bytes.next().await {
            let chunk = chunk?;
            for item in decoder.push(&chunk)? {
                yield item;
            }
        }
        for item in decoder.finish()? {
            yield item;
        }
    }
}
