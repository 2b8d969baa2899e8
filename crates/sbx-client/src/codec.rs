//! # Response Codec
//!
//! Decodes the row API envelope and runs reference resolution over find
//! pages. Decoding is best-effort past the envelope itself: a missing or
//! malformed `model`/`fetched_results` leaves rows unresolved instead of
//! failing the page.

use sbx_core::{resolve, FieldSchema, ReferencePool, Result};
use serde::Deserialize;
use serde_json::Value;

/// Raw response envelope of the row API.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct Envelope {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub results: Option<Value>,
    #[serde(default)]
    pub total_pages: Option<u32>,
    /// Field schema of the queried model.
    #[serde(default)]
    pub model: Option<Value>,
    /// Reference pool for the models named in `fetch`.
    #[serde(default)]
    pub fetched_results: Option<Value>,
}

impl Envelope {
    /// Decoded field schema, `None` when absent or malformed.
    pub fn schema(&self) -> Option<Vec<FieldSchema>> {
        let model = self.model.as_ref()?;
        match serde_json::from_value(model.clone()) {
            Ok(fields) => Some(fields),
            Err(e) => {
                tracing::warn!("ignoring malformed model schema: {}", e);
                None
            }
        }
    }

    /// Decoded reference pool; empty when absent or malformed.
    pub fn pool(&self) -> ReferencePool {
        match &self.fetched_results {
            Some(Value::Object(map)) => ReferencePool::from(map.clone()),
            Some(Value::Null) | None => ReferencePool::new(),
            Some(_) => {
                tracing::warn!("ignoring malformed fetched_results");
                ReferencePool::new()
            }
        }
    }

    /// Result rows, `None` when absent or not an array.
    pub fn rows(&self) -> Option<&Vec<Value>> {
        self.results.as_ref()?.as_array()
    }
}

/// One decoded and resolved find page.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PageResponse {
    pub success: bool,
    pub error: Option<String>,
    pub results: Option<Vec<Value>>,
    pub total_pages: Option<u32>,
}

pub fn decode_envelope(bytes: &[u8]) -> Result<Envelope> {
    Ok(serde_json::from_slice(bytes)?)
}

/// Decode a find page and resolve its reference fields.
pub fn decode_page(bytes: &[u8]) -> Result<PageResponse> {
    let envelope = decode_envelope(bytes)?;
    Ok(resolve_page(&envelope))
}

pub fn resolve_page(envelope: &Envelope) -> PageResponse {
    let results = envelope.rows().map(|rows| match envelope.schema() {
        Some(schema) => resolve(rows, &schema, &envelope.pool()),
        None => rows.clone(),
    });

    if envelope.results.is_some() && results.is_none() {
        tracing::warn!("find page results is not an array");
    }

    PageResponse {
        success: envelope.success,
        error: envelope.error.clone(),
        results,
        total_pages: envelope.total_pages,
    }
}

/// Decode a JSON body straight into `T`.
pub fn decode_json<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    Ok(serde_json::from_slice(bytes)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use sbx_core::Error;
    use serde_json::json;

    fn bytes(v: Value) -> Vec<u8> {
        serde_json::to_vec(&v).unwrap()
    }

    #[test]
    fn test_decode_page_resolves_references() {
        let body = bytes(json!({
            "success": true,
            "total_pages": 2,
            "results": [{"_KEY": "r1", "owner": "k1"}],
            "model": [
                {"id": 1, "type": "REFERENCE", "name": "owner", "reference_type_name": "users"}
            ],
            "fetched_results": {"users": {"k1": {"name": "Amy"}}}
        }));

        let page = decode_page(&body).unwrap();
        assert!(page.success);
        assert_eq!(page.total_pages, Some(2));
        assert_eq!(
            page.results,
            Some(vec![json!({"_KEY": "r1", "owner": {"name": "Amy"}})])
        );
    }

    #[test]
    fn test_missing_model_passes_rows_through() {
        let body = bytes(json!({
            "success": true,
            "total_pages": 1,
            "results": [{"owner": "k1"}],
            "fetched_results": {"users": {"k1": {"name": "Amy"}}}
        }));
        let page = decode_page(&body).unwrap();
        assert_eq!(page.results, Some(vec![json!({"owner": "k1"})]));
    }

    #[test]
    fn test_malformed_model_passes_rows_through() {
        let body = bytes(json!({
            "success": true,
            "total_pages": 1,
            "results": [{"owner": "k1"}],
            "model": {"not": "a list"},
            "fetched_results": {"users": {"k1": {"name": "Amy"}}}
        }));
        let page = decode_page(&body).unwrap();
        assert_eq!(page.results, Some(vec![json!({"owner": "k1"})]));
    }

    #[test]
    fn test_missing_pool_leaves_keys() {
        let body = bytes(json!({
            "success": true,
            "results": [{"owner": "k1"}],
            "model": [{"id": 1, "type": "REFERENCE", "name": "owner", "reference_type_name": "users"}]
        }));
        let page = decode_page(&body).unwrap();
        assert_eq!(page.results, Some(vec![json!({"owner": "k1"})]));
        assert_eq!(page.total_pages, None);
    }

    #[test]
    fn test_non_array_results() {
        let body = bytes(json!({"success": true, "results": "nope", "total_pages": 1}));
        assert_eq!(decode_page(&body).unwrap().results, None);
    }

    #[test]
    fn test_server_failure_envelope() {
        let body = bytes(json!({"success": false, "error": "invalid token"}));
        let page = decode_page(&body).unwrap();
        assert!(!page.success);
        assert_eq!(page.error.as_deref(), Some("invalid token"));
        assert_eq!(page.results, None);
    }

    #[test]
    fn test_garbage_is_decode_error() {
        assert!(matches!(decode_page(b"<html>"), Err(Error::Decode(_))));
        assert!(matches!(decode_envelope(b"[1,2]"), Err(Error::Decode(_))));
    }
}
