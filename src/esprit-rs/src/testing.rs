//! Scripted transport for unit tests.

use std::sync::{Arc, Mutex};

use esprit_core::Connection;
use serde_json::{json, Value};

use crate::transport::{Request, Response, Transport};
use crate::{Client, Result};

type Handler = Box<dyn FnMut(&Request) -> Response + Send>;

pub(crate) struct FakeTransport {
    handler: Mutex<Handler>,
    requests: Mutex<Vec<Request>>,
}

impl FakeTransport {
    pub(crate) fn new(handler: impl FnMut(&Request) -> Response + Send + 'static) -> Arc<Self> {
        Arc::new(Self {
            handler: Mutex::new(Box::new(handler)),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub(crate) fn requests(&self) -> Vec<Request> {
        self.requests.lock().unwrap().clone()
    }

    pub(crate) fn count(&self, pred: impl Fn(&Request) -> bool) -> usize {
        self.requests.lock().unwrap().iter().filter(|r| pred(r)).count()
    }
}

#[async_trait::async_trait]
impl Transport for FakeTransport {
    async fn send(&self, request: Request) -> Result<Response> {
        self.requests.lock().unwrap().push(request.clone());
        let response = (self.handler.lock().unwrap())(&request);
        Ok(response)
    }
}

pub(crate) fn client(transport: &Arc<FakeTransport>) -> Client {
    client_for(Connection::new("localhost", "test"), transport)
}

pub(crate) fn client_for(conn: Connection, transport: &Arc<FakeTransport>) -> Client {
    Client::with_transport(conn, transport.clone())
}

/// Search response carrying `_source` hits.
pub(crate) fn hits(records: &[Value], total: u64) -> Value {
    let hits: Vec<Value> = records.iter().map(|r| json!({ "_source": r })).collect();
    json!({ "hits": { "total": total, "hits": hits } })
}

pub(crate) fn ok(body: Value) -> Response {
    Response::json_body(200, &body)
}

pub(crate) fn is_scroll_next(r: &Request) -> bool {
    r.url.contains("/_search/scroll")
}

pub(crate) fn is_scroll_open(r: &Request) -> bool {
    r.url.contains("/_search?scroll=")
}

pub(crate) fn body_json(r: &Request) -> Value {
    r.body_text()
        .map(|b| serde_json::from_str(&b).unwrap())
        .unwrap_or(Value::Null)
}
