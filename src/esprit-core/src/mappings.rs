//! Mapping document builders.

use serde_json::{json, Map, Value};

/// Dynamic template that indexes every string twice: analysed under its own
/// name and verbatim under the `exact` sub-field used for sorting.
pub fn exact() -> Value {
    json!({
        "default": {
            "match": "*",
            "match_mapping_type": "string",
            "mapping": {
                "type": "multi_field",
                "fields": {
                    "{name}": {"type": "{dynamic_type}", "index": "analyzed", "store": "no"},
                    "exact": {"type": "{dynamic_type}", "index": "not_analyzed", "store": "yes"}
                }
            }
        }
    })
}

pub fn properties(field_mappings: Value) -> Value {
    json!({ "properties": field_mappings })
}

pub fn type_mapping(field: &str, field_type: &str) -> Value {
    json!({ field: { "type": field_type } })
}

pub fn make_mapping(field_type: &str) -> Value {
    json!({ "type": field_type })
}

pub fn dynamic_type_template(name: &str, pattern: &str, mapping: Value) -> Value {
    json!({ name: { "match": pattern, "mapping": mapping } })
}

pub fn dynamic_templates(templates: Vec<Value>) -> Value {
    json!({ "dynamic_templates": templates })
}

/// Merge mapping fragments under a type name. Later fragments win on key
/// clashes.
pub fn for_type(type_name: &str, fragments: &[Value]) -> Value {
    let mut full = Map::new();
    for fragment in fragments {
        if let Some(obj) = fragment.as_object() {
            for (k, v) in obj {
                full.insert(k.clone(), v.clone());
            }
        }
    }
    json!({ type_name: full })
}

pub fn parent(child_type: &str, parent_type: &str) -> Value {
    json!({ child_type: { "_parent": { "type": parent_type } } })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_for_type_merges_fragments() {
        let mapping = for_type(
            "book",
            &[
                properties(type_mapping("title", "string")),
                dynamic_templates(vec![exact()]),
            ],
        );
        assert_eq!(mapping["book"]["properties"]["title"]["type"], "string");
        assert_eq!(
            mapping["book"]["dynamic_templates"][0]["default"]["mapping"]["fields"]["exact"]["index"],
            "not_analyzed"
        );
    }

    #[test]
    fn test_parent() {
        assert_eq!(
            parent("chapter", "book"),
            json!({"chapter": {"_parent": {"type": "book"}}})
        );
    }

    #[test]
    fn test_dynamic_type_template() {
        let t = dynamic_type_template("dates", "*_date", make_mapping("date"));
        assert_eq!(t["dates"]["match"], "*_date");
        assert_eq!(t["dates"]["mapping"]["type"], "date");
    }
}
