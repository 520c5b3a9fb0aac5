//! Server-side cursor iteration.
//!
//! A [`ScrollIterator`] opens a scroll cursor, then pulls pages through it one
//! request at a time. It is a one-shot sequence: once it has finished or
//! failed it only ever yields `None`, and a fresh iteration needs a fresh
//! iterator (and so a fresh cursor).

use std::collections::VecDeque;

use esprit_core::envelope::{self, unpack_scroll};
use esprit_core::query::{identity_sort, query_object, QueryBuilder};
use esprit_core::Record;
use futures::Stream;
use serde_json::{json, Value};

use crate::{Client, ClientError, Result};

#[derive(Debug, Clone)]
pub struct ScrollOptions {
    pub page_size: usize,
    /// Stop after this many records, even mid-page.
    pub limit: Option<u64>,
    pub keepalive: String,
    /// When false, an expired cursor ends the sequence instead of erroring.
    pub raise_on_scroll_error: bool,
    pub keyword_subfield: String,
}

impl Default for ScrollOptions {
    fn default() -> Self {
        Self {
            page_size: 1000,
            limit: None,
            keepalive: "1m".to_string(),
            raise_on_scroll_error: true,
            keyword_subfield: "exact".to_string(),
        }
    }
}

impl ScrollOptions {
    pub fn with_limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    pub fn with_keepalive(mut self, keepalive: impl Into<String>) -> Self {
        self.keepalive = keepalive.into();
        self
    }

    pub fn suppress_scroll_errors(mut self) -> Self {
        self.raise_on_scroll_error = false;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum ScrollState {
    Init,
    Open { scroll_id: String },
    Done,
    Failed,
}

pub struct ScrollIterator<'a> {
    client: &'a Client,
    types: Vec<String>,
    query: Value,
    options: ScrollOptions,
    state: ScrollState,
    buffer: VecDeque<Record>,
    total: u64,
    consumed: u64,
}

impl<'a> ScrollIterator<'a> {
    pub(crate) fn new(
        client: &'a Client,
        types: Vec<String>,
        query: Option<&Value>,
        options: ScrollOptions,
    ) -> Self {
        let mut query = query.cloned().unwrap_or_else(QueryBuilder::match_all);
        // a non-object query is rejected when the cursor is opened
        if let Some(obj) = query.as_object_mut() {
            obj.entry("size").or_insert_with(|| json!(options.page_size));
            // a stable sort gives complete coverage on a changing index
            obj.entry("sort")
                .or_insert_with(|| identity_sort(&options.keyword_subfield));
        }
        Self {
            client,
            types,
            query,
            options,
            state: ScrollState::Init,
            buffer: VecDeque::new(),
            total: 0,
            consumed: 0,
        }
    }

    /// Records yielded so far.
    pub fn consumed(&self) -> u64 {
        self.consumed
    }

    /// Hit count the server reported when the cursor was opened.
    pub fn total(&self) -> u64 {
        self.total
    }

    pub fn is_finished(&self) -> bool {
        matches!(self.state, ScrollState::Done | ScrollState::Failed)
    }

    fn limit_reached(&self) -> bool {
        matches!(self.options.limit, Some(limit) if self.consumed >= limit)
    }

    pub async fn next(&mut self) -> Result<Option<Record>> {
        loop {
            if self.is_finished() {
                return Ok(None);
            }
            if self.limit_reached() {
                self.state = ScrollState::Done;
                return Ok(None);
            }
            if let Some(record) = self.buffer.pop_front() {
                self.consumed += 1;
                return Ok(Some(record));
            }

            match self.state.clone() {
                ScrollState::Init => {
                    if let Err(e) = self.open().await {
                        self.state = ScrollState::Failed;
                        return Err(e);
                    }
                }
                ScrollState::Open { scroll_id } => {
                    if self.consumed >= self.total {
                        self.state = ScrollState::Done;
                        return Ok(None);
                    }
                    match self.fetch_page(&scroll_id).await {
                        Ok(()) => {}
                        Err(ClientError::ScrollTimeout { status, .. })
                            if !self.options.raise_on_scroll_error =>
                        {
                            tracing::warn!(status, consumed = self.consumed, "scroll expired, ending iteration");
                            self.state = ScrollState::Done;
                            return Ok(None);
                        }
                        Err(e) => {
                            self.state = ScrollState::Failed;
                            return Err(e);
                        }
                    }
                }
                ScrollState::Done | ScrollState::Failed => return Ok(None),
            }
        }
    }

    async fn open(&mut self) -> Result<()> {
        query_object(&mut self.query)?;
        // a missing index or broken mapping shows up first in the count
        let count = match self.client.count(&self.types, &self.query).await {
            Ok(count) => count,
            Err(ClientError::Server { status, message }) => {
                return Err(ClientError::ScrollInitialise {
                    status,
                    body: message,
                })
            }
            Err(e) => return Err(e),
        };
        if count < 1 {
            tracing::debug!("query matches nothing, not opening a scroll");
            self.state = ScrollState::Done;
            return Ok(());
        }

        let response = self
            .client
            .initialise_scroll(&self.types, &self.query, &self.options.keepalive)
            .await?;
        if response.status != 200 {
            return Err(ClientError::ScrollInitialise {
                status: response.status,
                body: response.body,
            });
        }

        let value = response.value()?;
        let (records, scroll_id) = unpack_scroll(&value);
        self.total = envelope::total_hits(&value);
        tracing::info!(total = self.total, first_page = records.len(), "scroll opened");

        match scroll_id {
            Some(scroll_id) => self.state = ScrollState::Open { scroll_id },
            None => {
                return Err(ClientError::ScrollInitialise {
                    status: response.status,
                    body: "response carried no _scroll_id".to_string(),
                })
            }
        }
        self.buffer.extend(records);
        Ok(())
    }

    async fn fetch_page(&mut self, scroll_id: &str) -> Result<()> {
        let response = self
            .client
            .scroll_next(scroll_id, &self.options.keepalive)
            .await?;
        if response.status >= 400 {
            return Err(ClientError::ScrollTimeout {
                status: response.status,
                body: response.body,
            });
        }

        let value = response.value()?;
        let (records, next_id) = unpack_scroll(&value);
        if records.is_empty() {
            self.state = ScrollState::Done;
            return Ok(());
        }
        if let Some(next_id) = next_id {
            self.state = ScrollState::Open { scroll_id: next_id };
        }
        self.buffer.extend(records);
        Ok(())
    }

    /// Drain the remaining records.
    pub async fn collect_all(mut self) -> Result<Vec<Record>> {
        let mut out = Vec::new();
        while let Some(record) = self.next().await? {
            out.push(record);
        }
        Ok(out)
    }

    pub fn into_stream(self) -> impl Stream<Item = Result<Record>> + 'a {
        futures::stream::try_unfold(self, |mut it| async move {
            Ok(it.next().await?.map(|record| (record, it)))
        })
    }
}

impl Client {
    /// Iterate every record matching `query` through a scroll cursor.
    pub fn scroll<S: AsRef<str>>(
        &self,
        types: &[S],
        query: Option<&Value>,
        options: ScrollOptions,
    ) -> ScrollIterator<'_> {
        let types = types.iter().map(|t| t.as_ref().to_string()).collect();
        ScrollIterator::new(self, types, query, options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::*;
    use crate::transport::Response;
    use futures::TryStreamExt;
    use std::sync::{Arc, Mutex};

    fn doc(name: &str) -> Value {
        json!({ "id": name })
    }

    fn ids(records: &[Record]) -> Vec<String> {
        records
            .iter()
            .map(|r| r["id"].as_str().unwrap().to_string())
            .collect()
    }

    /// Server whose scroll open returns no hits and whose pages come from
    /// successive next calls.
    fn paged_server(pages: Vec<Vec<&'static str>>, total: u64) -> Arc<FakeTransport> {
        let pages = Arc::new(Mutex::new(VecDeque::from(pages)));
        FakeTransport::new(move |r| {
            if is_scroll_next(r) {
                let page = pages.lock().unwrap().pop_front().unwrap_or_default();
                let records: Vec<Value> = page.into_iter().map(doc).collect();
                let mut body = hits(&records, total);
                body["_scroll_id"] = json!("next");
                ok(body)
            } else if is_scroll_open(r) {
                let mut body = hits(&[], total);
                body["_scroll_id"] = json!("first");
                ok(body)
            } else {
                ok(hits(&[], total))
            }
        })
    }

    #[tokio::test]
    async fn test_limit_stops_mid_page_without_extra_calls() {
        let transport = paged_server(vec![vec!["a", "b", "c"], vec!["d", "e"], vec![]], 5);
        let client = client(&transport);
        let records = client
            .scroll(&["book"], None, ScrollOptions::default().with_limit(4))
            .collect_all()
            .await
            .unwrap();

        assert_eq!(ids(&records), vec!["a", "b", "c", "d"]);
        assert_eq!(transport.count(is_scroll_next), 2);
    }

    #[tokio::test]
    async fn test_stops_at_reported_total_without_another_call() {
        let transport = paged_server(vec![vec!["a", "b", "c"], vec!["d", "e"], vec![]], 5);
        let client = client(&transport);
        let records = client
            .scroll(&["book"], None, ScrollOptions::default())
            .collect_all()
            .await
            .unwrap();

        assert_eq!(records.len(), 5);
        assert_eq!(transport.count(is_scroll_next), 2);
    }

    #[tokio::test]
    async fn test_empty_page_ends_iteration() {
        let transport = paged_server(vec![vec!["a"], vec![]], 10);
        let client = client(&transport);
        let records = client
            .scroll(&["book"], None, ScrollOptions::default())
            .collect_all()
            .await
            .unwrap();
        assert_eq!(ids(&records), vec!["a"]);
        assert_eq!(transport.count(is_scroll_next), 2);
    }

    #[tokio::test]
    async fn test_first_page_results_are_yielded() {
        let transport = FakeTransport::new(|r| {
            if is_scroll_open(r) {
                let mut body = hits(&[doc("a"), doc("b")], 2);
                body["_scroll_id"] = json!("s1");
                ok(body)
            } else if is_scroll_next(r) {
                panic!("no next call expected once the total is reached");
            } else {
                ok(hits(&[], 2))
            }
        });
        let client = client(&transport);
        let records = client
            .scroll(&["book"], None, ScrollOptions::default())
            .collect_all()
            .await
            .unwrap();
        assert_eq!(ids(&records), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_zero_count_never_opens_cursor() {
        let transport = FakeTransport::new(|_| ok(hits(&[], 0)));
        let client = client(&transport);
        let mut it = client.scroll(&["book"], None, ScrollOptions::default());
        assert!(it.next().await.unwrap().is_none());
        assert_eq!(transport.requests().len(), 1);
        assert_eq!(transport.count(is_scroll_open), 0);
    }

    #[tokio::test]
    async fn test_open_failure_is_scroll_initialise_error() {
        let transport = FakeTransport::new(|r| {
            if is_scroll_open(r) {
                Response::new(400, "mapping problem")
            } else {
                ok(hits(&[], 3))
            }
        });
        let client = client(&transport);
        let mut it = client.scroll(&["book"], None, ScrollOptions::default());
        let err = it.next().await.unwrap_err();
        assert!(matches!(err, ClientError::ScrollInitialise { status: 400, .. }));
        assert!(it.next().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_missing_index_is_scroll_initialise_error() {
        let transport = FakeTransport::new(|_| Response::new(404, "index_not_found_exception"));
        let client = client(&transport);
        let mut it = client.scroll(&["book"], None, ScrollOptions::default());
        let err = it.next().await.unwrap_err();
        match err {
            ClientError::ScrollInitialise { status, body } => {
                assert_eq!(status, 404);
                assert!(body.contains("index_not_found_exception"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert_eq!(transport.requests().len(), 1);
        assert!(it.is_finished());
    }

    #[tokio::test]
    async fn test_non_object_query_is_rejected_before_any_request() {
        let transport = FakeTransport::new(|_| ok(hits(&[], 0)));
        let client = client(&transport);
        let query = json!([{ "match_all": {} }]);
        let mut it = client.scroll(&["book"], Some(&query), ScrollOptions::default());
        let err = it.next().await.unwrap_err();
        assert!(matches!(
            err,
            ClientError::Core(esprit_core::Error::InvalidQuery(_))
        ));
        assert!(transport.requests().is_empty());
    }

    fn expiring_server() -> Arc<FakeTransport> {
        FakeTransport::new(|r| {
            if is_scroll_open(r) {
                let mut body = hits(&[doc("a"), doc("b")], 10);
                body["_scroll_id"] = json!("s1");
                ok(body)
            } else if is_scroll_next(r) {
                Response::new(500, "SearchContextMissingException")
            } else {
                ok(hits(&[], 10))
            }
        })
    }

    #[tokio::test]
    async fn test_expired_cursor_raises_by_default() {
        let transport = expiring_server();
        let client = client(&transport);
        let mut it = client.scroll(&["book"], None, ScrollOptions::default());
        assert!(it.next().await.unwrap().is_some());
        assert!(it.next().await.unwrap().is_some());
        let err = it.next().await.unwrap_err();
        match err {
            ClientError::ScrollTimeout { status, body } => {
                assert_eq!(status, 500);
                assert!(body.contains("SearchContextMissing"));
            }
            other => panic!("unexpected error {:?}", other),
        }
        assert!(it.is_finished());
        assert!(it.next().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_expired_cursor_can_be_suppressed() {
        let transport = expiring_server();
        let client = client(&transport);
        let records = client
            .scroll(&["book"], None, ScrollOptions::default().suppress_scroll_errors())
            .collect_all()
            .await
            .unwrap();
        assert_eq!(ids(&records), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_open_carries_keepalive_size_and_default_sort() {
        let transport = paged_server(vec![vec![]], 1);
        let client = client(&transport);
        let options = ScrollOptions::default()
            .with_keepalive("10m")
            .with_page_size(50);
        client
            .scroll(&["book"], None, options)
            .collect_all()
            .await
            .unwrap();

        let open = transport
            .requests()
            .into_iter()
            .find(|r| is_scroll_open(r))
            .unwrap();
        assert_eq!(open.url, "http://localhost:9200/test/book/_search?scroll=10m");
        let body = body_json(&open);
        assert_eq!(body["size"], 50);
        assert_eq!(body["sort"], json!([{"id.exact": {"order": "asc"}}]));
    }

    #[tokio::test]
    async fn test_caller_query_is_not_mutated() {
        let transport = paged_server(vec![vec![]], 1);
        let client = client(&transport);
        let q = json!({"query": {"match_all": {}}});
        client
            .scroll(&["book"], Some(&q), ScrollOptions::default())
            .collect_all()
            .await
            .unwrap();
        assert_eq!(q, json!({"query": {"match_all": {}}}));
    }

    #[tokio::test]
    async fn test_stream_adapter() {
        let transport = paged_server(vec![vec!["a", "b"], vec!["c"]], 3);
        let client = client(&transport);
        let records: Vec<Record> = client
            .scroll(&["book"], None, ScrollOptions::default())
            .into_stream()
            .try_collect()
            .await
            .unwrap();
        assert_eq!(ids(&records), vec!["a", "b", "c"]);
    }
}
