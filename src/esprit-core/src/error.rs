//! Error types for the transport-free core.
//!
//! Network-level failures live in the client crate; everything here can be
//! raised without ever talking to a server.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// A bulk envelope could not locate the identity value in a record.
    #[error("Record has no identity at path '{path}'")]
    MissingIdentity { path: String },

    /// A query did not have the shape needed for merging.
    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
