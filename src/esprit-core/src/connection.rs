use serde::{Deserialize, Serialize};

use crate::url::UrlBuilder;
use crate::versions::VersionProfile;

pub const DEFAULT_PORT: u16 = 9200;

/// Basic-auth credentials passed through to the transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

/// Where to send requests and how to address collections on that server.
///
/// The host always carries a scheme and never a trailing slash. A port tacked
/// onto the host string (`localhost:9201`) is moved into `port`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Connection {
    host: String,
    port: Option<u16>,
    auth: Option<Credentials>,
    verify_ssl: bool,
    index: Option<Vec<String>>,
    index_per_type: bool,
    version: VersionProfile,
}

impl Connection {
    pub fn new(host: impl Into<String>, index: impl Into<String>) -> Self {
        let mut conn = Self {
            host: String::new(),
            port: Some(DEFAULT_PORT),
            auth: None,
            verify_ssl: true,
            index: Some(vec![index.into()]),
            index_per_type: false,
            version: VersionProfile::default(),
        };
        conn.set_host(host.into());
        conn
    }

    fn set_host(&mut self, host: String) {
        let mut host = normalise_host(&host);

        // some people tack the port onto the host
        if host.split(':').count() > 2 {
            if let Some(pos) = host.rfind(':') {
                if let Ok(port) = host[pos + 1..].parse::<u16>() {
                    self.port = Some(port);
                    host.truncate(pos);
                }
            }
        }
        self.host = host;
    }

    pub fn with_port(mut self, port: Option<u16>) -> Self {
        self.port = port;
        self
    }

    pub fn with_auth(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.auth = Some(Credentials {
            username: username.into(),
            password: password.into(),
        });
        self
    }

    pub fn with_verify_ssl(mut self, verify: bool) -> Self {
        self.verify_ssl = verify;
        self
    }

    /// Address several indexes at once. An empty list addresses `_all`.
    pub fn with_indexes(mut self, indexes: Vec<String>) -> Self {
        self.index = if indexes.is_empty() { None } else { Some(indexes) };
        self
    }

    /// Store each logical type in its own physical index named
    /// `{index}-{type}`.
    pub fn with_index_per_type(mut self, enabled: bool) -> Self {
        self.index_per_type = enabled;
        self
    }

    /// The connection that addresses the physical index holding `doc_type`
    /// directly. Without index-per-type this is a plain copy.
    pub fn physical_for(&self, doc_type: &str) -> Connection {
        if !self.index_per_type {
            return self.clone();
        }
        let indexes = self
            .index
            .iter()
            .flatten()
            .map(|base| format!("{}-{}", base, doc_type))
            .collect();
        self.clone()
            .with_indexes(indexes)
            .with_index_per_type(false)
    }

    pub fn with_version(mut self, version: &str) -> Self {
        self.version = VersionProfile::resolve(version);
        self
    }

    /// Point this connection at a different index namespace.
    ///
    /// This is the one mutation a connection ever sees; the snapshot client
    /// uses it to address `_snapshot`. Do not share a connection between
    /// operations that depend on `index` while it is being repointed.
    pub fn repoint_index(&mut self, index: impl Into<String>) {
        self.index = Some(vec![index.into()]);
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> Option<u16> {
        self.port
    }

    pub fn auth(&self) -> Option<&Credentials> {
        self.auth.as_ref()
    }

    pub fn verify_ssl(&self) -> bool {
        self.verify_ssl
    }

    pub fn index(&self) -> Option<&[String]> {
        self.index.as_deref()
    }

    pub fn index_per_type(&self) -> bool {
        self.index_per_type
    }

    pub fn version(&self) -> &VersionProfile {
        &self.version
    }

    /// Start building a request URL against this connection.
    pub fn url(&self) -> UrlBuilder<'_> {
        UrlBuilder::new(self)
    }
}

/// Ensure a scheme prefix and strip any trailing slash.
pub(crate) fn normalise_host(host: &str) -> String {
    let mut host = if host.starts_with("http") {
        host.to_string()
    } else {
        format!("http://{}", host)
    };
    while host.ends_with('/') {
        host.pop();
    }
    host
}
