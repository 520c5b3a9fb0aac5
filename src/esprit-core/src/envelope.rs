//! Record envelopes on the wire.
//!
//! Bulk writes use two-line units, an action object followed by the record
//! itself, each terminated by a newline. Search, get and mget responses wrap
//! records in hits that carry either `_source` or `fields`.

use serde::Serialize;
use serde_json::{json, Map, Value};

use crate::error::{Error, Result};
use crate::models::Record;

/// Resolve a dotted path such as `admin.ids.primary` inside a record.
pub fn lookup_path<'a>(record: &'a Record, path: &str) -> Option<&'a Value> {
    let mut parts = path.split('.');
    let first = parts.next()?;
    let mut current = record.get(first)?;
    for part in parts {
        current = current.as_object()?.get(part)?;
    }
    Some(current)
}

/// The identity value found at `idkey`, or `MissingIdentity`.
pub fn identity_of<'a>(record: &'a Record, idkey: &str) -> Result<&'a Value> {
    match lookup_path(record, idkey) {
        Some(Value::Null) | None => Err(Error::MissingIdentity {
            path: idkey.to_string(),
        }),
        Some(v) => Ok(v),
    }
}

/// One `{"index": {...}}` action line, without the trailing newline.
pub fn bulk_action(id: &Value, index: Option<&str>, doc_type: Option<&str>) -> String {
    let mut meta = Map::new();
    meta.insert("_id".to_string(), id.clone());
    if let Some(index) = index {
        meta.insert("_index".to_string(), Value::String(index.to_string()));
    }
    if let Some(doc_type) = doc_type {
        meta.insert("_type".to_string(), Value::String(doc_type.to_string()));
    }
    json!({ "index": meta }).to_string()
}

/// Serialise records into a bulk payload.
///
/// Fails on the first record whose identity cannot be found, so a batch is
/// never sent with holes in it.
pub fn to_bulk(
    records: &[Record],
    idkey: &str,
    index: Option<&str>,
    doc_type: Option<&str>,
) -> Result<String> {
    let mut data = String::new();
    for record in records {
        let id = identity_of(record, idkey)?;
        data.push_str(&bulk_action(id, index, doc_type));
        data.push('\n');
        data.push_str(&serde_json::to_string(record)?);
        data.push('\n');
    }
    Ok(data)
}

pub fn to_bulk_delete<S: AsRef<str>>(ids: &[S]) -> String {
    let mut data = String::new();
    for id in ids {
        data.push_str(&json!({ "delete": { "_id": id.as_ref() } }).to_string());
        data.push('\n');
    }
    data
}

/// Structural test for a minimal action line: a JSON object whose only key is
/// `index`, holding an object whose keys are a subset of `{_id}`.
pub fn is_action_line(line: &[u8]) -> bool {
    let line = trim_line_end(line);
    if line.is_empty() {
        return false;
    }
    let Ok(Value::Object(outer)) = serde_json::from_slice::<Value>(line) else {
        return false;
    };
    if outer.len() != 1 {
        return false;
    }
    match outer.get("index") {
        Some(Value::Object(meta)) => meta.keys().all(|k| k == "_id"),
        _ => false,
    }
}

/// Rewrite an action line so that it targets `index`.
pub fn rewrite_action_index(line: &[u8], index: &str) -> Result<String> {
    let mut action: Value = serde_json::from_slice(trim_line_end(line))?;
    let meta = action
        .as_object_mut()
        .and_then(|o| o.values_mut().next())
        .and_then(|v| v.as_object_mut())
        .ok_or_else(|| Error::InvalidQuery("bulk action line is not an action object".into()))?;
    meta.insert("_index".to_string(), Value::String(index.to_string()));
    Ok(action.to_string())
}

fn trim_line_end(mut line: &[u8]) -> &[u8] {
    while let [rest @ .., b'\n' | b'\r'] = line {
        line = rest;
    }
    line
}

fn hit_record(hit: &Value) -> Option<Record> {
    let body = hit.get("_source").or_else(|| hit.get("fields"))?;
    body.as_object().cloned()
}

/// Records from a search response, `_source` preferred over `fields`.
pub fn unpack_hits(response: &Value) -> Vec<Record> {
    response
        .pointer("/hits/hits")
        .and_then(Value::as_array)
        .map(|hits| hits.iter().filter_map(hit_record).collect())
        .unwrap_or_default()
}

/// Records and the cursor token from a scroll response.
pub fn unpack_scroll(response: &Value) -> (Vec<Record>, Option<String>) {
    let scroll_id = response
        .get("_scroll_id")
        .and_then(Value::as_str)
        .map(str::to_string);
    (unpack_hits(response), scroll_id)
}

pub fn unpack_get(response: &Value) -> Option<Record> {
    response.get("_source").and_then(Value::as_object).cloned()
}

pub fn unpack_mget(response: &Value) -> Vec<Record> {
    response
        .get("docs")
        .and_then(Value::as_array)
        .map(|docs| docs.iter().filter_map(hit_record).collect())
        .unwrap_or_default()
}

/// Total hit count, accepting both the bare number and the `{"value": n}`
/// shape of `hits.total`.
pub fn total_hits(response: &Value) -> u64 {
    match response.pointer("/hits/total") {
        Some(Value::Number(n)) => n.as_u64().unwrap_or(0),
        Some(Value::Object(o)) => o.get("value").and_then(Value::as_u64).unwrap_or(0),
        _ => 0,
    }
}

pub fn facet_terms(response: &Value, facet: &str) -> Vec<Value> {
    response
        .get("facets")
        .and_then(|f| f.get(facet))
        .and_then(|f| f.get("terms"))
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default()
}

#[derive(Debug, Clone, Serialize)]
pub struct AliasAction {
    pub alias: String,
    pub index: String,
}

/// Package alias changes for the `_aliases` endpoint.
pub fn to_alias_actions(add: &[AliasAction], remove: &[AliasAction]) -> Value {
    let actions: Vec<Value> = add
        .iter()
        .map(|a| json!({ "add": a }))
        .chain(remove.iter().map(|r| json!({ "remove": r })))
        .collect();
    json!({ "actions": actions })
}
