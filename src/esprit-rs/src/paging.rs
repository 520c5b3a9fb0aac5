//! Offset pagination with `from`/`size`.
//!
//! Stateless on the server side, so it works where scroll cursors are badly
//! supported. A deterministic sort is always imposed; without one, paging over
//! a collection that changes underneath can skip or repeat records.

use std::collections::VecDeque;

use esprit_core::envelope::unpack_hits;
use esprit_core::query::{identity_sort, query_object, QueryBuilder};
use esprit_core::Record;
use futures::Stream;
use serde_json::{json, Value};

use crate::client::SearchMethod;
use crate::{Client, Result};

#[derive(Debug, Clone)]
pub struct PageOptions {
    pub page_size: usize,
    pub limit: Option<u64>,
    pub keyword_subfield: String,
    pub method: SearchMethod,
}

impl Default for PageOptions {
    fn default() -> Self {
        Self {
            page_size: 1000,
            limit: None,
            keyword_subfield: "exact".to_string(),
            method: SearchMethod::Post,
        }
    }
}

impl PageOptions {
    pub fn with_limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }
}

pub struct PageIterator<'a> {
    client: &'a Client,
    types: Vec<String>,
    query: Value,
    options: PageOptions,
    buffer: VecDeque<Record>,
    from: usize,
    consumed: u64,
    done: bool,
}

impl<'a> PageIterator<'a> {
    pub(crate) fn new(
        client: &'a Client,
        types: Vec<String>,
        query: Option<&Value>,
        options: PageOptions,
    ) -> Self {
        let mut query = query.cloned().unwrap_or_else(QueryBuilder::match_all);
        if let Some(obj) = query.as_object_mut() {
            obj.insert("size".to_string(), json!(options.page_size));
            obj.insert("from".to_string(), json!(0));
            obj.entry("sort")
                .or_insert_with(|| identity_sort(&options.keyword_subfield));
        }
        Self {
            client,
            types,
            query,
            options,
            buffer: VecDeque::new(),
            from: 0,
            consumed: 0,
            done: false,
        }
    }

    pub fn consumed(&self) -> u64 {
        self.consumed
    }

    pub fn is_finished(&self) -> bool {
        self.done
    }

    pub async fn next(&mut self) -> Result<Option<Record>> {
        loop {
            if self.done {
                return Ok(None);
            }
            if matches!(self.options.limit, Some(limit) if self.consumed >= limit) {
                self.done = true;
                return Ok(None);
            }
            if let Some(record) = self.buffer.pop_front() {
                self.consumed += 1;
                return Ok(Some(record));
            }
            if let Err(e) = self.fetch_page().await {
                self.done = true;
                return Err(e);
            }
        }
    }

    async fn fetch_page(&mut self) -> Result<()> {
        query_object(&mut self.query)?.insert("from".to_string(), json!(self.from));
        let response = self
            .client
            .search(&self.types, Some(&self.query), self.options.method, &[])
            .await?;
        if !response.is_success() {
            return Err(response.into_server_error());
        }

        let records = unpack_hits(&response.value()?);
        tracing::debug!(from = self.from, records = records.len(), "fetched page");
        if records.is_empty() {
            self.done = true;
            return Ok(());
        }
        self.buffer.extend(records);
        self.from += self.options.page_size;
        Ok(())
    }

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
    /// Iterate every record matching `query` by offset pages.
    pub fn iterate<S: AsRef<str>>(
        &self,
        types: &[S],
        query: Option<&Value>,
        options: PageOptions,
    ) -> PageIterator<'_> {
        let types = types.iter().map(|t| t.as_ref().to_string()).collect();
        PageIterator::new(self, types, query, options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::*;
    use crate::transport::Response;

    /// Serves `n` numbered records, honouring from/size.
    fn numbered_server(n: usize) -> std::sync::Arc<FakeTransport> {
        FakeTransport::new(move |r| {
            let body = body_json(r);
            let from = body["from"].as_u64().unwrap() as usize;
            let size = body["size"].as_u64().unwrap() as usize;
            let records: Vec<Value> = (from..(from + size).min(n))
                .map(|i| json!({ "id": format!("r{:03}", i) }))
                .collect();
            ok(hits(&records, n as u64))
        })
    }

    #[tokio::test]
    async fn test_non_object_query_is_an_error() {
        let transport = numbered_server(5);
        let client = client(&transport);
        let query = json!(["not", "a", "query"]);
        let mut pages = client.iterate(&["book"], Some(&query), PageOptions::default());
        let err = pages.next().await.unwrap_err();
        assert!(matches!(
            err,
            crate::ClientError::Core(esprit_core::Error::InvalidQuery(_))
        ));
        assert!(pages.is_finished());
        assert!(transport.requests().is_empty());
    }

    #[tokio::test]
    async fn test_pages_until_empty() {
        let transport = numbered_server(25);
        let client = client(&transport);
        let records = client
            .iterate(&["book"], None, PageOptions::default().with_page_size(10))
            .collect_all()
            .await
            .unwrap();

        assert_eq!(records.len(), 25);
        assert_eq!(records[24]["id"], "r024");
        // three full-or-partial pages then the empty one
        assert_eq!(transport.requests().len(), 4);
        let froms: Vec<u64> = transport
            .requests()
            .iter()
            .map(|r| body_json(r)["from"].as_u64().unwrap())
            .collect();
        assert_eq!(froms, vec![0, 10, 20, 30]);
    }

    #[tokio::test]
    async fn test_limit_stops_early() {
        let transport = numbered_server(100);
        let client = client(&transport);
        let records = client
            .iterate(
                &["book"],
                None,
                PageOptions::default().with_page_size(10).with_limit(15),
            )
            .collect_all()
            .await
            .unwrap();
        assert_eq!(records.len(), 15);
        assert_eq!(transport.requests().len(), 2);
    }

    #[tokio::test]
    async fn test_default_sort_is_added_but_caller_sort_kept() {
        let transport = numbered_server(0);
        let client = client(&transport);
        client
            .iterate(&["book"], None, PageOptions::default())
            .collect_all()
            .await
            .unwrap();
        let sort = body_json(&transport.requests()[0])["sort"].clone();
        assert_eq!(sort, json!([{"id.exact": {"order": "asc"}}]));

        let q = json!({"query": {"match_all": {}}, "sort": [{"created_date": "desc"}]});
        client
            .iterate(&["book"], Some(&q), PageOptions::default())
            .collect_all()
            .await
            .unwrap();
        let sort = body_json(&transport.requests()[1])["sort"].clone();
        assert_eq!(sort, json!([{"created_date": "desc"}]));
        assert!(q.get("from").is_none());
    }

    #[tokio::test]
    async fn test_server_error_surfaces() {
        let transport = FakeTransport::new(|_| Response::new(503, "unavailable"));
        let client = client(&transport);
        let mut it = client.iterate(&["book"], None, PageOptions::default());
        assert!(it.next().await.is_err());
        assert!(it.next().await.unwrap().is_none());
    }
}
