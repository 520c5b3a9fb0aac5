//! esprit Core Library
//!
//! Transport-free building blocks for talking to an Elasticsearch-style
//! document store:
//! - Connection descriptor and server version profile
//! - Request URL construction
//! - Bulk and search envelope encoding/decoding
//! - Boundary-safe chunking of bulk payloads
//! - Query and mapping builders
//! - Configuration

pub mod chunking;
pub mod config;
pub mod connection;
pub mod envelope;
pub mod error;
pub mod mappings;
pub mod models;
pub mod query;
pub mod url;
pub mod versions;

// Re-export commonly used types
pub use chunking::BulkChunker;
pub use config::Config;
pub use connection::{Connection, Credentials};
pub use error::{Error, Result};
pub use models::*;
pub use query::{build_query, Query, QueryBuilder, QueryInput, QueryParams};
pub use versions::VersionProfile;
