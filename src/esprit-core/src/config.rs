use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::connection::{Connection, Credentials};
use crate::versions::DEFAULT_VERSION;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub host: String,
    #[serde(default = "default_port")]
    pub port: Option<u16>,
    /// Base index name(s). Empty addresses `_all`.
    #[serde(default)]
    pub index: Vec<String>,
    #[serde(default)]
    pub index_per_type: bool,
    #[serde(default = "default_verify_ssl")]
    pub verify_ssl: bool,
    #[serde(default)]
    pub auth: Option<Credentials>,
    #[serde(default = "default_es_version")]
    pub es_version: String,

    #[serde(default)]
    pub scroll: ScrollConfig,

    #[serde(default)]
    pub bulk: BulkConfig,

    #[serde(default)]
    pub save: SaveConfig,
}

fn default_port() -> Option<u16> {
    Some(crate::connection::DEFAULT_PORT)
}

fn default_verify_ssl() -> bool {
    true
}

fn default_es_version() -> String {
    DEFAULT_VERSION.to_string()
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ScrollConfig {
    #[serde(default = "default_page_size")]
    pub page_size: usize,

    /// Server-side cursor keep-alive, in Elasticsearch duration syntax
    #[serde(default = "default_keepalive")]
    pub keepalive: String,

    /// Sub-field holding the unanalysed identity, used for default sorting
    #[serde(default = "default_keyword_subfield")]
    pub keyword_subfield: String,
}

fn default_page_size() -> usize {
    1000
}

fn default_keepalive() -> String {
    "1m".to_string()
}

fn default_keyword_subfield() -> String {
    "exact".to_string()
}

impl Default for ScrollConfig {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
            keepalive: default_keepalive(),
            keyword_subfield: default_keyword_subfield(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BulkConfig {
    /// Upper bound on a single bulk request body
    #[serde(default = "default_max_chunk_bytes")]
    pub max_chunk_bytes: usize,

    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

fn default_max_chunk_bytes() -> usize {
    100 * 1024 * 1024
}

fn default_batch_size() -> usize {
    1000
}

impl Default for BulkConfig {
    fn default() -> Self {
        Self {
            max_chunk_bytes: default_max_chunk_bytes(),
            batch_size: default_batch_size(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct SaveConfig {
    /// Ceiling on the blocking-save visibility poll; unset waits forever
    #[serde(default)]
    pub max_wait_secs: Option<f64>,
}

impl SaveConfig {
    /// Negative or non-finite values mean no ceiling.
    pub fn max_wait(&self) -> Option<Duration> {
        self.max_wait_secs
            .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
    }
}

impl Config {
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&contents)?;
        Ok(config)
    }

    pub fn connection(&self) -> Connection {
        let mut conn = Connection::new(self.host.clone(), String::new())
            .with_indexes(self.index.clone())
            .with_index_per_type(self.index_per_type)
            .with_verify_ssl(self.verify_ssl)
            .with_version(&self.es_version);
        // a port embedded in the host wins over the configured default
        if conn.port() == default_port() {
            conn = conn.with_port(self.port);
        }
        if let Some(auth) = &self.auth {
            conn = conn.with_auth(auth.username.clone(), auth.password.clone());
        }
        conn
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "http://localhost".to_string(),
            port: default_port(),
            index: Vec::new(),
            index_per_type: false,
            verify_ssl: default_verify_ssl(),
            auth: None,
            es_version: default_es_version(),
            scroll: ScrollConfig::default(),
            bulk: BulkConfig::default(),
            save: SaveConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_config_gets_defaults() {
        let config: Config = serde_json::from_str(r#"{"host": "localhost", "index": ["books"]}"#).unwrap();
        assert_eq!(config.port, Some(9200));
        assert_eq!(config.scroll.page_size, 1000);
        assert_eq!(config.scroll.keepalive, "1m");
        assert_eq!(config.bulk.max_chunk_bytes, 100 * 1024 * 1024);
        assert!(config.save.max_wait_secs.is_none());
        assert_eq!(config.es_version, "0.90.13");
    }

    #[test]
    fn test_connection_from_config() {
        let config: Config = serde_json::from_str(
            r#"{
                "host": "https://search.example.org",
                "port": 443,
                "index": ["books"],
                "index_per_type": true,
                "es_version": "7.10.2",
                "auth": {"username": "u", "password": "p"}
            }"#,
        )
        .unwrap();
        let conn = config.connection();
        assert_eq!(conn.host(), "https://search.example.org");
        assert_eq!(conn.port(), Some(443));
        assert!(conn.index_per_type());
        assert_eq!(conn.version().major(), 7);
        assert_eq!(conn.auth().unwrap().username, "u");
        assert_eq!(
            conn.url().doc_type("book").endpoint("_search").build(),
            "https://search.example.org:443/books-book/_doc/_search"
        );
    }

    #[test]
    fn test_save_max_wait() {
        let config: Config =
            serde_json::from_str(r#"{"host": "localhost", "save": {"max_wait_secs": 2.5}}"#).unwrap();
        assert_eq!(config.save.max_wait(), Some(Duration::from_millis(2500)));

        let negative = SaveConfig { max_wait_secs: Some(-1.0) };
        assert_eq!(negative.max_wait(), None);
        assert_eq!(SaveConfig::default().max_wait(), None);
    }

    #[test]
    fn test_port_in_host_is_kept() {
        let config: Config = serde_json::from_str(r#"{"host": "localhost:9201"}"#).unwrap();
        assert_eq!(config.connection().port(), Some(9201));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"host": "localhost", "bulk": {"max_chunk_bytes": 1024}}"#).unwrap();
        let config = Config::load(path.to_str().unwrap()).unwrap();
        assert_eq!(config.bulk.max_chunk_bytes, 1024);
        assert_eq!(config.bulk.batch_size, 1000);
    }
}
