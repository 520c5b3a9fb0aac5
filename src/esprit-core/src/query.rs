//! Small helpers for assembling query DSL objects.
//!
//! Queries stay opaque `serde_json::Value`s. These helpers only create the
//! handful of shapes the client needs and merge extra filters into a
//! top-level `bool.must` list. Every function clones before it mutates, so a
//! caller's query is never changed behind its back.

use serde_json::{json, Map, Value};

use crate::error::{Error, Result};
use crate::versions::VersionProfile;

const SPECIAL_CHARS: &[&str] = &[
    "+", "-", "&&", "||", "!", "(", ")", "{", "}", "[", "]", "^", "\"", "~", "*", "?", ":", "/",
];
const ESCAPE_CHAR: &str = "\\";

pub struct QueryBuilder;

impl QueryBuilder {
    pub fn match_all() -> Value {
        json!({ "query": { "match_all": {} } })
    }

    pub fn query_string(query: &str) -> Value {
        json!({ "query": { "query_string": { "query": query } } })
    }

    pub fn term(key: &str, value: impl Into<Value>) -> Value {
        json!({ "query": { "term": { key: value.into() } } })
    }

    pub fn term_filter(key: &str, value: impl Into<Value>) -> Value {
        json!({ "query": { "filtered": { "filter": { "term": { key: value.into() } } } } })
    }

    pub fn terms_filter(key: &str, values: Vec<Value>) -> Value {
        json!({ "query": { "filtered": { "filter": { "terms": { key: values } } } } })
    }

    /// Restrict a query to the given stored fields.
    pub fn fields(query: &Value, fields: &[&str]) -> Value {
        let mut q = query.clone();
        if let Some(obj) = q.as_object_mut() {
            obj.insert("fields".to_string(), json!(fields));
        }
        q
    }

    /// Escape query-string syntax characters.
    pub fn escape(query_string: &str) -> String {
        let mut qs = query_string.replace(ESCAPE_CHAR, &format!("{0}{0}", ESCAPE_CHAR));
        for sc in SPECIAL_CHARS {
            qs = qs.replace(sc, &format!("{}{}", ESCAPE_CHAR, sc));
        }
        qs
    }

    /// Lowercased, punctuation-free, de-duplicated words.
    pub fn tokenise(text: &str) -> Vec<String> {
        let cleaned: String = text.chars().filter(|c| !c.is_ascii_punctuation()).collect();
        let mut words: Vec<String> = Vec::new();
        for word in cleaned.split(' ').filter(|w| !w.is_empty()) {
            let word = word.to_lowercase();
            if !words.contains(&word) {
                words.push(word);
            }
        }
        words
    }
}

/// A mutable query under construction.
#[derive(Debug, Clone)]
pub struct Query {
    q: Value,
}

impl Query {
    pub fn new(raw: Option<Value>) -> Self {
        let mut q = raw.unwrap_or_else(QueryBuilder::match_all);
        if let Some(obj) = q.as_object_mut() {
            obj.entry("query")
                .or_insert_with(|| json!({ "match_all": {} }));
        }
        Self { q }
    }

    fn query_mut(&mut self) -> &mut Map<String, Value> {
        if !self.q.is_object() {
            self.q = json!({});
        }
        let query = &mut self.q["query"];
        if !query.is_object() {
            *query = Value::Object(Map::new());
        }
        match query {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    pub fn query_string(&mut self, s: &str, op: Option<&str>, must: bool, should: bool) {
        self.clear_match_all();
        let mut qs = json!({ "query": s });
        if let Some(op) = op {
            qs["default_operator"] = json!(op);
        }
        let clause = json!({ "query_string": qs });
        if must {
            self.bool_list("must").push(clause);
        } else if should {
            self.bool_list("should").push(clause);
        } else {
            self.query_mut().insert("query_string".to_string(), qs);
        }
    }

    fn bool_list(&mut self, key: &str) -> &mut Vec<Value> {
        let query = self.query_mut();
        let boolean = query
            .entry("bool")
            .or_insert_with(|| json!({}));
        if !boolean.is_object() {
            *boolean = json!({});
        }
        let list = &mut boolean[key];
        if !list.is_array() {
            *list = Value::Array(Vec::new());
        }
        match list {
            Value::Array(items) => items,
            _ => unreachable!(),
        }
    }

    pub fn add_must(&mut self, clause: Value) {
        self.bool_list("must").push(clause);
    }

    pub fn add_should(&mut self, clause: Value) {
        self.bool_list("should").push(clause);
    }

    pub fn clear_match_all(&mut self) {
        self.query_mut().remove("match_all");
    }

    pub fn include_source(&mut self, values: &[&str], version: &VersionProfile) {
        let source = self
            .q
            .as_object_mut()
            .map(|o| o.entry("_source").or_insert_with(|| json!({})));
        if let Some(source) = source {
            if !source.is_object() {
                *source = json!({});
            }
            source[version.source_include_key()] = json!(values);
        }
    }

    pub fn set_source(&mut self, values: &[&str]) {
        self.q["_source"] = json!(values);
    }

    pub fn as_value(&self) -> &Value {
        &self.q
    }

    pub fn into_value(self) -> Value {
        self.q
    }
}

/// What the caller asked for: nothing, a query string, or a full DSL object.
#[derive(Debug, Clone, Default)]
pub enum QueryInput {
    #[default]
    All,
    Text(String),
    Dsl(Value),
}

/// Inputs to [`build_query`].
#[derive(Debug, Clone, Default)]
pub struct QueryParams {
    pub q: QueryInput,
    /// Exact-match filters; every value becomes a `term` clause.
    pub terms: Vec<(String, Vec<Value>)>,
    /// Multi-value filters; each key becomes one `terms` clause.
    pub should_terms: Vec<(String, Vec<Value>)>,
    pub facets: Vec<(String, Value)>,
    /// Extra top-level keys such as `size` or `sort`; `_from` maps to `from`.
    pub extra: Vec<(String, Value)>,
}

impl QueryParams {
    pub fn dsl(q: Value) -> Self {
        Self {
            q: QueryInput::Dsl(q),
            ..Default::default()
        }
    }

    pub fn text(q: impl Into<String>) -> Self {
        Self {
            q: QueryInput::Text(q.into()),
            ..Default::default()
        }
    }

    pub fn term(mut self, key: impl Into<String>, values: Vec<Value>) -> Self {
        self.terms.push((key.into(), values));
        self
    }

    pub fn extra(mut self, key: impl Into<String>, value: Value) -> Self {
        self.extra.push((key.into(), value));
        self
    }
}

/// Normalise a query so `query.bool.must` is a list, merging in filters.
pub fn build_query(params: &QueryParams) -> Result<Value> {
    let mut query = match &params.q {
        QueryInput::Dsl(q) => {
            let mut query = q.clone();
            let inner = query
                .get("query")
                .cloned()
                .ok_or_else(|| Error::InvalidQuery("query object has no 'query' key".into()))?;
            if !inner.get("bool").map_or(false, Value::is_object) {
                query["query"] = json!({ "bool": { "must": [inner] } });
            }
            let must = &mut query["query"]["bool"]["must"];
            match must {
                Value::Array(_) => {}
                Value::Null => *must = json!([]),
                other => *other = json!([other.clone()]),
            }
            query
        }
        QueryInput::Text(s) if !s.is_empty() => {
            json!({ "query": { "bool": { "must": [ { "query_string": { "query": s } } ] } } })
        }
        _ => json!({ "query": { "bool": { "must": [ { "match_all": {} } ] } } }),
    };

    if !params.facets.is_empty() {
        for (name, spec) in &params.facets {
            query["facets"][name] = json!({ "terms": spec });
        }
    }

    if !params.terms.is_empty() {
        let mut must = Vec::new();
        for (key, values) in &params.terms {
            for v in values {
                must.push(json!({ "term": { key.as_str(): v } }));
            }
        }
        must.push(query["query"].clone());
        query["query"] = json!({ "bool": { "must": must } });
    }

    for (key, value) in &params.extra {
        let key = if key == "_from" { "from" } else { key.as_str() };
        query[key] = value.clone();
    }

    for (key, values) in &params.should_terms {
        if let Some(must) = query["query"]["bool"]["must"].as_array_mut() {
            must.push(json!({ "terms": { key.as_str(): values } }));
        }
    }

    Ok(query)
}

/// A copy of `q` that only asks for the hit count.
pub fn count_query(q: &Value) -> Value {
    let mut q = q.clone();
    if let Some(obj) = q.as_object_mut() {
        obj.remove("sort");
        obj.insert("size".to_string(), json!(0));
    }
    q
}

/// `q` as a mutable object, for callers that set top-level request keys.
pub fn query_object(q: &mut Value) -> Result<&mut Map<String, Value>> {
    match q {
        Value::Object(map) => Ok(map),
        other => Err(Error::InvalidQuery(format!(
            "expected a JSON object, got {}",
            other
        ))),
    }
}

/// Ascending sort on the identity field's keyword sub-field.
pub fn identity_sort(keyword_subfield: &str) -> Value {
    json!([{ format!("id.{}", keyword_subfield): { "order": "asc" } }])
}
