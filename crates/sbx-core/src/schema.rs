//! # Field Schema & Reference Pool
//!
//! Server-supplied metadata that comes back with every find page: the
//! `model` field list and the `fetched_results` pool of referenced rows.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Type tag the backend uses for foreign-key fields.
pub const REFERENCE_TYPE: &str = "REFERENCE";

/// One field of a row model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FieldSchema {
    #[serde(default)]
    pub id: i64,
    #[serde(rename = "type")]
    pub kind: String,
    pub name: String,
    /// Numeric id of the referenced model.
    #[serde(rename = "reference_type", default, skip_serializing_if = "Option::is_none")]
    pub reference_type_id: Option<i64>,
    /// Name of the referenced model; the key into the reference pool.
    #[serde(
        rename = "reference_type_name",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub reference_target: Option<String>,
    /// Schema of the referenced model, keyed by field name, when the server
    /// sends it. Enables resolving references inside embedded rows.
    #[serde(rename = "reference_model", default, skip_serializing_if = "Option::is_none")]
    pub reference_schema: Option<BTreeMap<String, FieldSchema>>,
}

impl FieldSchema {
    pub fn is_reference(&self) -> bool {
        self.kind == REFERENCE_TYPE
    }

    /// Target model of a reference field. `None` for plain fields.
    pub fn target_model(&self) -> Option<&str> {
        if self.is_reference() {
            self.reference_target.as_deref()
        } else {
            None
        }
    }
}

/// Previously fetched rows of referenced models:
/// `model name -> primary key -> row object`.
///
/// Kept as raw JSON so that one malformed model entry does not make the whole
/// page undecodable.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct ReferencePool(serde_json::Map<String, serde_json::Value>);

impl ReferencePool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Row of `model` with primary key `key`, if present and an object.
    pub fn lookup(&self, model: &str, key: &str) -> Option<&serde_json::Map<String, serde_json::Value>> {
        self.0.get(model)?.as_object()?.get(key)?.as_object()
    }
}

impl From<serde_json::Map<String, serde_json::Value>> for ReferencePool {
    fn from(map: serde_json::Map<String, serde_json::Value>) -> Self {
        Self(map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_nested_schema() {
        let fields: Vec<FieldSchema> = serde_json::from_value(json!([
            {"id": 1, "type": "STRING", "name": "company_name"},
            {
                "id": 2, "type": "REFERENCE", "name": "state",
                "reference_type": 40, "reference_type_name": "state",
                "reference_model": {
                    "country": {
                        "id": 9, "type": "REFERENCE", "name": "country",
                        "reference_type_name": "country"
                    }
                }
            }
        ]))
        .unwrap();

        assert!(!fields[0].is_reference());
        assert_eq!(fields[0].target_model(), None);
        assert_eq!(fields[1].target_model(), Some("state"));
        assert_eq!(fields[1].reference_type_id, Some(40));
        let nested = fields[1].reference_schema.as_ref().unwrap();
        assert_eq!(nested["country"].target_model(), Some("country"));
    }

    #[test]
    fn test_pool_lookup_tolerates_malformed_entries() {
        let pool: ReferencePool = serde_json::from_value(json!({
            "users": {"k1": {"name": "Amy"}, "k2": "not an object"},
            "broken": [1, 2, 3]
        }))
        .unwrap();

        assert_eq!(pool.lookup("users", "k1").unwrap()["name"], json!("Amy"));
        assert!(pool.lookup("users", "k2").is_none());
        assert!(pool.lookup("users", "k3").is_none());
        assert!(pool.lookup("broken", "0").is_none());
        assert!(pool.lookup("missing", "k1").is_none());
    }
}
