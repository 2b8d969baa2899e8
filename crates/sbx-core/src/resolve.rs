//! # Reference Resolver
//!
//! Rewrites foreign-key fields of result rows into the referenced row objects
//! taken from the page's [`ReferencePool`]. Nested references are resolved
//! by following the sub-schema the server attaches to a reference field.
//!
//! Input rows are never modified; every call returns new values. Misses
//! (unknown key, non-string key, malformed pool entry) leave the field as it
//! was.

use serde_json::{Map, Value};

use crate::schema::{FieldSchema, ReferencePool};

/// Resolve every row of a page against `schema`.
///
/// Rows that are not JSON objects are passed through untouched.
pub fn resolve(rows: &[Value], schema: &[FieldSchema], pool: &ReferencePool) -> Vec<Value> {
    rows.iter()
        .map(|row| match row {
            Value::Object(obj) => Value::Object(resolve_row(obj, schema.iter(), pool)),
            other => other.clone(),
        })
        .collect()
}

/// Resolve the reference fields of one row.
pub fn resolve_row<'a>(
    row: &Map<String, Value>,
    fields: impl IntoIterator<Item = &'a FieldSchema>,
    pool: &ReferencePool,
) -> Map<String, Value> {
    let mut out = row.clone();
    for field in fields {
        if let Some(embedded) = resolve_field(&out, field, pool) {
            out.insert(field.name.clone(), Value::Object(embedded));
        }
    }
    out
}

/// The embedded object for `field` of `row`, or `None` when the field is not
/// a resolvable reference.
fn resolve_field(
    row: &Map<String, Value>,
    field: &FieldSchema,
    pool: &ReferencePool,
) -> Option<Map<String, Value>> {
    let target = field.target_model()?;
    let key = row.get(&field.name)?.as_str()?.trim();

    let Some(referenced) = pool.lookup(target, key) else {
        tracing::debug!(
            "reference '{}' -> {}[{}] not in fetched results",
            field.name,
            target,
            key
        );
        return None;
    };

    // Resolve the referenced row's own references before embedding it. Depth
    // is bounded by the schema tree, which is owned and therefore finite.
    Some(match &field.reference_schema {
        Some(sub_schema) => resolve_row(
            referenced,
            sub_schema.values().filter(|f| f.is_reference()),
            pool,
        ),
        None => referenced.clone(),
    })
}
