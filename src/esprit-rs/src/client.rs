use std::sync::Arc;

use esprit_core::envelope::{self, to_bulk, to_bulk_delete};
use esprit_core::query::{count_query, QueryBuilder};
use esprit_core::url::mapping_url;
use esprit_core::{Connection, Record};
use serde_json::{json, Value};

use crate::dao::{Clock, SystemClock};
use crate::transport::{HttpTransport, Request, Response, Transport};
use crate::{ClientError, Result};

/// How a search query travels to the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SearchMethod {
    /// JSON request body
    #[default]
    Post,
    /// URL-encoded `source` parameter
    Get,
}

/// esprit REST API Client
///
/// Thin wrappers around the HTTP calls. Most return the raw [`Response`] so
/// callers can inspect status codes; the iteration, bulk and lifecycle
/// layers build on these.
pub struct Client {
    conn: Connection,
    transport: Arc<dyn Transport>,
    pub(crate) clock: Arc<dyn Clock>,
}

impl Client {
    /// Create a client talking HTTP to the connection's host
    pub fn new(conn: Connection) -> Result<Self> {
        let transport = HttpTransport::new(&conn)?;
        Ok(Self::with_transport(conn, Arc::new(transport)))
    }

    pub fn with_transport(conn: Connection, transport: Arc<dyn Transport>) -> Self {
        Self {
            conn,
            transport,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    pub(crate) fn transport(&self) -> Arc<dyn Transport> {
        self.transport.clone()
    }

    pub(crate) async fn send(&self, request: Request) -> Result<Response> {
        tracing::debug!(method = request.method.as_str(), url = %request.url, "sending request");
        let response = self.transport.send(request).await?;
        tracing::debug!(status = response.status, "received response");
        Ok(response)
    }

    // ---------------------------------------------------------------
    // Search

    pub async fn search<S: AsRef<str>>(
        &self,
        types: &[S],
        query: Option<&Value>,
        method: SearchMethod,
        params: &[(&str, &str)],
    ) -> Result<Response> {
        let url = self
            .conn
            .url()
            .types(types)
            .endpoint("_search")
            .params(params)
            .build();
        let query = query.cloned().unwrap_or_else(QueryBuilder::match_all);

        let request = match method {
            SearchMethod::Post => Request::post(url).with_json(&query),
            SearchMethod::Get => {
                let mut parsed =
                    reqwest::Url::parse(&url).map_err(|e| ClientError::InvalidUrl(e.to_string()))?;
                parsed
                    .query_pairs_mut()
                    .append_pair("source", &query.to_string());
                Request::get(parsed.to_string())
            }
        };
        self.send(request).await
    }

    /// Search and parse the response, treating any non-2xx as an error.
    pub async fn search_value<S: AsRef<str>>(&self, types: &[S], query: &Value) -> Result<Value> {
        let response = self
            .search(types, Some(query), SearchMethod::Post, &[])
            .await?;
        if !response.is_success() {
            return Err(response.into_server_error());
        }
        response.value()
    }

    /// Number of hits `query` would return.
    pub async fn count<S: AsRef<str>>(&self, types: &[S], query: &Value) -> Result<u64> {
        let value = self.search_value(types, &count_query(query)).await?;
        Ok(envelope::total_hits(&value))
    }

    pub async fn initialise_scroll<S: AsRef<str>>(
        &self,
        types: &[S],
        query: &Value,
        keepalive: &str,
    ) -> Result<Response> {
        self.search(types, Some(query), SearchMethod::Post, &[("scroll", keepalive)])
            .await
    }

    pub async fn scroll_next(&self, scroll_id: &str, keepalive: &str) -> Result<Response> {
        let url = self
            .conn
            .url()
            .endpoint("_search/scroll")
            .param("scroll_id", scroll_id)
            .param("scroll", keepalive)
            .omit_index()
            .build();
        self.send(Request::get(url)).await
    }

    // ---------------------------------------------------------------
    // Record retrieval

    pub async fn get(&self, doc_type: &str, id: &str) -> Result<Response> {
        let url = self.conn.url().doc_type(doc_type).endpoint(id).build();
        self.send(Request::get(url)).await
    }

    /// Get a record by ID; `None` when the server answers 404.
    pub async fn get_record(&self, doc_type: &str, id: &str) -> Result<Option<Record>> {
        let response = self.get(doc_type, id).await?;
        if response.status == 404 {
            return Ok(None);
        }
        if !response.is_success() {
            return Err(response.into_server_error());
        }
        Ok(envelope::unpack_get(&response.value()?))
    }

    pub async fn mget<S: AsRef<str>>(
        &self,
        doc_type: &str,
        ids: &[S],
        fields: Option<&[&str]>,
    ) -> Result<Vec<Record>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let body = match fields {
            None => json!({ "ids": ids.iter().map(AsRef::as_ref).collect::<Vec<&str>>() }),
            Some(fields) => {
                let docs: Vec<Value> = ids
                    .iter()
                    .map(|id| json!({ "_id": id.as_ref(), "fields": fields }))
                    .collect();
                json!({ "docs": docs })
            }
        };
        let url = self.conn.url().doc_type(doc_type).endpoint("_mget").build();
        let response = self.send(Request::post(url).with_json(&body)).await?;
        if !response.is_success() {
            return Err(response.into_server_error());
        }
        Ok(envelope::unpack_mget(&response.value()?))
    }

    // ---------------------------------------------------------------
    // Mappings

    /// With index-per-type the index checked (and created) is the one that
    /// holds `doc_type`, not the base index.
    pub async fn put_mapping(&self, doc_type: &str, mapping: &Value, make_index: bool) -> Result<Response> {
        let target = self.conn.physical_for(doc_type);
        if !self.index_exists_at(&target).await? {
            if make_index {
                self.create_index_at(&target, None).await?;
            } else {
                return Err(ClientError::Server {
                    status: 404,
                    message: format!("index '{}' does not exist", index_name(&target)),
                });
            }
        }
        let url = mapping_url(&self.conn, doc_type);
        self.send(Request::put(url).with_json(mapping)).await
    }

    pub async fn has_mapping(&self, doc_type: &str) -> Result<bool> {
        Ok(self.get_mapping(doc_type).await?.status == 200)
    }

    pub async fn get_mapping(&self, doc_type: &str) -> Result<Response> {
        self.send(Request::get(mapping_url(&self.conn, doc_type)))
            .await
    }

    // ---------------------------------------------------------------
    // Existence checks

    pub async fn type_exists(&self, doc_type: &str) -> Result<bool> {
        let url = self.conn.url().doc_type(doc_type).build();
        let request = if self.conn.version().type_exists_via_get() {
            Request::get(url)
        } else {
            Request::head(url)
        };
        Ok(self.send(request).await?.status == 200)
    }

    pub async fn index_exists(&self) -> Result<bool> {
        self.index_exists_at(&self.conn).await
    }

    async fn index_exists_at(&self, conn: &Connection) -> Result<bool> {
        let url = conn.url().endpoint("_mapping").build();
        Ok(self.send(Request::get(url)).await?.status == 200)
    }

    pub async fn alias_exists(&self, alias: &str) -> Result<bool> {
        let url = self.conn.url().endpoint("_aliases").build();
        let response = self.send(Request::get(url)).await?;
        if !self.index_exists().await? {
            return Ok(false);
        }
        let value = response.value()?;
        Ok(value
            .get(index_name(&self.conn))
            .and_then(|i| i.get("aliases"))
            .and_then(Value::as_object)
            .map(|aliases| aliases.contains_key(alias))
            .unwrap_or(false))
    }

    // ---------------------------------------------------------------
    // Index management

    pub async fn create_index(&self, mapping: Option<&Value>) -> Result<Response> {
        self.create_index_at(&self.conn, mapping).await
    }

    async fn create_index_at(&self, conn: &Connection, mapping: Option<&Value>) -> Result<Response> {
        let url = conn.url().build();
        let mut request = if conn.version().create_index_with_post() {
            Request::post(url)
        } else {
            Request::put(url)
        };
        if let Some(mapping) = mapping {
            request = request.with_json(mapping);
        }
        let response = self.send(request).await?;
        if !response.is_accepted() {
            return Err(response.into_server_error());
        }
        Ok(response)
    }

    pub async fn refresh(&self) -> Result<Response> {
        let url = self.conn.url().endpoint("_refresh").build();
        self.send(Request::post(url)).await
    }

    pub async fn post_alias(&self, alias_actions: &Value) -> Result<Response> {
        let url = self.conn.url().endpoint("_aliases").omit_index().build();
        self.send(Request::post(url).with_json(alias_actions)).await
    }

    // ---------------------------------------------------------------
    // Store records

    /// PUT with an explicit id, POST to let the server assign one.
    pub async fn store(
        &self,
        doc_type: &str,
        record: &Record,
        id: Option<&str>,
        params: &[(&str, &str)],
    ) -> Result<Response> {
        let mut url = self.conn.url().doc_type(doc_type).params(params);
        let body = Value::Object(record.clone());
        let request = match id {
            Some(id) => {
                url = url.endpoint(id);
                Request::put(url.build()).with_json(&body)
            }
            None => Request::post(url.build()).with_json(&body),
        };
        self.send(request).await
    }

    pub async fn bulk(&self, doc_type: &str, records: &[Record], idkey: &str) -> Result<Response> {
        let data = to_bulk(records, idkey, None, None)?;
        self.bulk_body(doc_type, data.into_bytes()).await
    }

    /// POST a ready-made newline-delimited payload to `_bulk`.
    pub async fn bulk_body(&self, doc_type: &str, body: Vec<u8>) -> Result<Response> {
        let url = self.conn.url().doc_type(doc_type).endpoint("_bulk").build();
        self.send(Request::post(url).with_body(body)).await
    }

    // ---------------------------------------------------------------
    // Delete records

    /// DELETE a record, a whole type, or (with neither) the whole index.
    pub async fn delete(&self, doc_type: Option<&str>, id: Option<&str>) -> Result<Response> {
        let mut url = self.conn.url();
        if let Some(doc_type) = doc_type {
            url = url.doc_type(doc_type);
        }
        if let Some(id) = id {
            url = url.endpoint(id);
        }
        self.send(Request::delete(url.build())).await
    }

    pub async fn delete_by_query(&self, doc_type: &str, query: &Value) -> Result<Response> {
        let url = self.conn.url().doc_type(doc_type).endpoint("_query").build();
        let body = match query.get("query") {
            Some(inner) if self.conn.version().delete_by_query_unwraps() => inner.clone(),
            _ => query.clone(),
        };
        self.send(Request::delete(url).with_json(&body)).await
    }

    pub async fn bulk_delete<S: AsRef<str>>(&self, doc_type: &str, ids: &[S]) -> Result<Response> {
        let data = to_bulk_delete(ids);
        self.bulk_body(doc_type, data.into_bytes()).await
    }
}

fn index_name(conn: &Connection) -> String {
    conn.index()
        .map(|i| i.join(","))
        .unwrap_or_else(|| "_all".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::*;
    use crate::transport::Method;

    #[tokio::test]
    async fn test_search_posts_match_all_by_default() {
        let transport = FakeTransport::new(|_| ok(hits(&[], 0)));
        let client = client(&transport);
        client
            .search(&["book"], None, SearchMethod::Post, &[])
            .await
            .unwrap();

        let reqs = transport.requests();
        assert_eq!(reqs[0].method, Method::Post);
        assert_eq!(reqs[0].url, "http://localhost:9200/test/book/_search");
        assert_eq!(body_json(&reqs[0]), json!({"query": {"match_all": {}}}));
    }

    #[tokio::test]
    async fn test_search_get_encodes_source() {
        let transport = FakeTransport::new(|_| ok(hits(&[], 0)));
        let client = client(&transport);
        let q = QueryBuilder::term("title", "a b");
        client
            .search(&["book"], Some(&q), SearchMethod::Get, &[])
            .await
            .unwrap();

        let req = &transport.requests()[0];
        assert_eq!(req.method, Method::Get);
        assert!(req.url.starts_with("http://localhost:9200/test/book/_search?source="));
        assert!(!req.url.contains(' '));
        assert!(req.body.is_none());
    }

    #[tokio::test]
    async fn test_count_strips_sort_and_sets_size() {
        let transport = FakeTransport::new(|_| ok(hits(&[], 17)));
        let client = client(&transport);
        let q = json!({"query": {"match_all": {}}, "sort": ["id"]});
        assert_eq!(client.count(&["book"], &q).await.unwrap(), 17);

        let body = body_json(&transport.requests()[0]);
        assert_eq!(body["size"], 0);
        assert!(body.get("sort").is_none());
    }

    #[tokio::test]
    async fn test_get_record_handles_404() {
        let transport = FakeTransport::new(|r| {
            if r.url.ends_with("/present") {
                ok(json!({"_id": "present", "_source": {"id": "present"}}))
            } else {
                Response::new(404, "{}")
            }
        });
        let client = client(&transport);
        assert!(client.get_record("book", "missing").await.unwrap().is_none());
        let rec = client.get_record("book", "present").await.unwrap().unwrap();
        assert_eq!(rec["id"], "present");
    }

    #[tokio::test]
    async fn test_store_uses_put_with_id_and_post_without() {
        let transport = FakeTransport::new(|_| Response::new(201, "{}"));
        let client = client(&transport);
        let rec = json!({"title": "t"}).as_object().unwrap().clone();
        client.store("book", &rec, Some("abc"), &[]).await.unwrap();
        client.store("book", &rec, None, &[]).await.unwrap();

        let reqs = transport.requests();
        assert_eq!(reqs[0].method, Method::Put);
        assert_eq!(reqs[0].url, "http://localhost:9200/test/book/abc");
        assert_eq!(reqs[1].method, Method::Post);
        assert_eq!(reqs[1].url, "http://localhost:9200/test/book");
    }

    #[tokio::test]
    async fn test_scroll_next_omits_index() {
        let transport = FakeTransport::new(|_| ok(hits(&[], 0)));
        let client = client(&transport);
        client.scroll_next("abc", "1m").await.unwrap();
        assert_eq!(
            transport.requests()[0].url,
            "http://localhost:9200/_search/scroll?scroll_id=abc&scroll=1m"
        );
    }

    #[tokio::test]
    async fn test_create_index_verb_follows_version() {
        let transport = FakeTransport::new(|_| ok(json!({"acknowledged": true})));
        let legacy = client_for(Connection::new("localhost", "test").with_version("1.7.5"), &transport);
        legacy.create_index(None).await.unwrap();
        let modern = client_for(Connection::new("localhost", "test").with_version("5.1.1"), &transport);
        modern.create_index(None).await.unwrap();

        let reqs = transport.requests();
        assert_eq!(reqs[0].method, Method::Post);
        assert_eq!(reqs[1].method, Method::Put);
    }

    #[tokio::test]
    async fn test_create_index_failure_is_an_error() {
        let transport = FakeTransport::new(|_| Response::new(400, "already exists"));
        let client = client(&transport);
        let err = client.create_index(None).await.unwrap_err();
        assert!(matches!(err, ClientError::Server { status: 400, .. }));
    }

    #[tokio::test]
    async fn test_type_exists_verb_follows_version() {
        let transport = FakeTransport::new(|_| Response::new(200, ""));
        let legacy = client_for(Connection::new("localhost", "test").with_version("0.90.13"), &transport);
        assert!(legacy.type_exists("book").await.unwrap());
        let modern = client_for(Connection::new("localhost", "test").with_version("1.7.5"), &transport);
        assert!(modern.type_exists("book").await.unwrap());

        let reqs = transport.requests();
        assert_eq!(reqs[0].method, Method::Get);
        assert_eq!(reqs[1].method, Method::Head);
    }

    #[tokio::test]
    async fn test_put_mapping_creates_missing_index() {
        let transport = FakeTransport::new(|r| match r.method {
            Method::Get => Response::new(404, "{}"),
            _ => ok(json!({"acknowledged": true})),
        });
        let client = client_for(Connection::new("localhost", "test").with_version("1.7.5"), &transport);
        client
            .put_mapping("book", &json!({"book": {}}), true)
            .await
            .unwrap();

        let reqs = transport.requests();
        assert_eq!(reqs.len(), 3);
        assert_eq!(reqs[1].url, "http://localhost:9200/test");
        assert_eq!(reqs[2].method, Method::Put);
        assert_eq!(reqs[2].url, "http://localhost:9200/test/_mapping/book");
    }

    #[tokio::test]
    async fn test_put_mapping_creates_the_per_type_index() {
        let transport = FakeTransport::new(|r| match r.method {
            Method::Get => Response::new(404, "{}"),
            _ => ok(json!({"acknowledged": true})),
        });
        let conn = Connection::new("localhost", "foo")
            .with_version("7.10.2")
            .with_index_per_type(true);
        let client = client_for(conn, &transport);
        client
            .put_mapping("bar", &json!({"properties": {}}), true)
            .await
            .unwrap();

        let calls: Vec<(Method, String)> = transport
            .requests()
            .into_iter()
            .map(|r| (r.method, r.url))
            .collect();
        assert_eq!(
            calls,
            vec![
                (Method::Get, "http://localhost:9200/foo-bar/_mapping".to_string()),
                (Method::Put, "http://localhost:9200/foo-bar".to_string()),
                (Method::Put, "http://localhost:9200/foo-bar/_mapping".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_put_mapping_without_index_fails_when_not_allowed_to_create() {
        let transport = FakeTransport::new(|_| Response::new(404, "{}"));
        let client = client(&transport);
        assert!(client
            .put_mapping("book", &json!({}), false)
            .await
            .is_err());
        assert_eq!(transport.requests().len(), 1);
    }

    #[tokio::test]
    async fn test_delete_by_query_unwraps_for_legacy_servers() {
        let transport = FakeTransport::new(|_| ok(json!({})));
        let q = json!({"query": {"term": {"a": 1}}});
        let legacy = client_for(Connection::new("localhost", "test").with_version("0.90.13"), &transport);
        legacy.delete_by_query("book", &q).await.unwrap();
        let modern = client_for(Connection::new("localhost", "test").with_version("1.7.5"), &transport);
        modern.delete_by_query("book", &q).await.unwrap();

        let reqs = transport.requests();
        assert_eq!(body_json(&reqs[0]), json!({"term": {"a": 1}}));
        assert_eq!(body_json(&reqs[1]), q);
        assert_eq!(reqs[0].url, "http://localhost:9200/test/book/_query");
    }

    #[tokio::test]
    async fn test_alias_exists() {
        let transport = FakeTransport::new(|r| {
            if r.url.ends_with("_aliases") {
                ok(json!({"test": {"aliases": {"live": {}}}}))
            } else {
                ok(json!({}))
            }
        });
        let client = client(&transport);
        assert!(client.alias_exists("live").await.unwrap());
        assert!(!client.alias_exists("stale").await.unwrap());
    }

    #[tokio::test]
    async fn test_mget_with_fields() {
        let transport = FakeTransport::new(|_| {
            ok(json!({"docs": [{"_id": "a", "fields": {"title": ["A"]}}, {"_id": "b", "_source": {"title": "B"}}]}))
        });
        let client = client(&transport);
        let docs = client
            .mget("book", &["a", "b"], Some(&["title"]))
            .await
            .unwrap();
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[1]["title"], "B");
        let body = body_json(&transport.requests()[0]);
        assert_eq!(body["docs"][0], json!({"_id": "a", "fields": ["title"]}));
    }

    #[tokio::test]
    async fn test_bulk_missing_identity_sends_nothing() {
        let transport = FakeTransport::new(|_| ok(json!({})));
        let client = client(&transport);
        let recs = vec![json!({"title": "no id"}).as_object().unwrap().clone()];
        let err = client.bulk("book", &recs, "id").await.unwrap_err();
        assert!(matches!(
            err,
            ClientError::Core(esprit_core::Error::MissingIdentity { .. })
        ));
        assert!(transport.requests().is_empty());
    }
}
