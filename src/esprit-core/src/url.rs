//! Request URL construction.
//!
//! URLs are assembled as plain strings. Parameters are joined as `k=v&k=v`
//! without percent-encoding, so callers must pre-encode anything unsafe.

use crate::connection::{normalise_host, Connection};

/// Type segment used in place of the logical type when every type lives in
/// its own physical index.
pub const PHYSICAL_TYPE_PLACEHOLDER: &str = "_doc";

pub const MAPPING_ENDPOINT: &str = "_mapping";

#[derive(Debug, Clone)]
pub struct UrlBuilder<'a> {
    conn: &'a Connection,
    types: Vec<String>,
    endpoint: Option<String>,
    params: Vec<(String, String)>,
    omit_index: bool,
}

impl<'a> UrlBuilder<'a> {
    pub(crate) fn new(conn: &'a Connection) -> Self {
        Self {
            conn,
            types: Vec::new(),
            endpoint: None,
            params: Vec::new(),
            omit_index: false,
        }
    }

    pub fn doc_type(mut self, doc_type: impl Into<String>) -> Self {
        self.types.push(doc_type.into());
        self
    }

    pub fn types<S: AsRef<str>>(mut self, types: &[S]) -> Self {
        self.types
            .extend(types.iter().map(|t| t.as_ref().to_string()));
        self
    }

    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        let endpoint = endpoint.into();
        if !endpoint.is_empty() {
            self.endpoint = Some(endpoint);
        }
        self
    }

    pub fn param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.push((key.into(), value.into()));
        self
    }

    pub fn params<K: AsRef<str>, V: AsRef<str>>(mut self, params: &[(K, V)]) -> Self {
        self.params.extend(
            params
                .iter()
                .map(|(k, v)| (k.as_ref().to_string(), v.as_ref().to_string())),
        );
        self
    }

    /// Leave the index segment empty, for cluster-level endpoints.
    pub fn omit_index(mut self) -> Self {
        self.omit_index = true;
        self
    }

    fn index_segment(&self) -> String {
        if self.omit_index {
            return String::new();
        }
        match self.conn.index() {
            None => "_all".to_string(),
            Some(indexes) if self.physical_addressing() => indexes
                .iter()
                .flat_map(|base| self.types.iter().map(move |t| format!("{}-{}", base, t)))
                .collect::<Vec<_>>()
                .join(","),
            Some(indexes) => indexes.join(","),
        }
    }

    fn type_segment(&self) -> Option<String> {
        if self.types.is_empty() {
            return None;
        }
        if self.physical_addressing() {
            if self.endpoint.as_deref() == Some(MAPPING_ENDPOINT) {
                return None;
            }
            return Some(PHYSICAL_TYPE_PLACEHOLDER.to_string());
        }
        Some(self.types.join(","))
    }

    fn physical_addressing(&self) -> bool {
        self.conn.index_per_type() && !self.types.is_empty()
    }

    pub fn build(&self) -> String {
        let mut url = normalise_host(self.conn.host());
        if let Some(port) = self.conn.port() {
            url.push(':');
            url.push_str(&port.to_string());
        }
        url.push('/');
        url.push_str(&self.index_segment());

        if let Some(t) = self.type_segment() {
            url.push('/');
            url.push_str(&t);
        }

        if let Some(endpoint) = &self.endpoint {
            if !url.ends_with('/') {
                url.push('/');
            }
            url.push_str(endpoint);
        }

        if !self.params.is_empty() {
            let query = self
                .params
                .iter()
                .map(|(k, v)| format!("{}={}", k, v))
                .collect::<Vec<_>>()
                .join("&");
            url.push('?');
            url.push_str(&query);
        }

        url
    }
}

/// URL of the mapping for `doc_type`, in whichever shape the connection's
/// server version and addressing mode expect.
pub fn mapping_url(conn: &Connection, doc_type: &str) -> String {
    if conn.index_per_type() || conn.version().mapping_url_per_type() {
        conn.url()
            .doc_type(doc_type)
            .endpoint(MAPPING_ENDPOINT)
            .build()
    } else {
        conn.url()
            .doc_type(MAPPING_ENDPOINT)
            .endpoint(doc_type)
            .build()
    }
}
