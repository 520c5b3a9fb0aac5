//! esprit Client Library
//!
//! Async client for Elasticsearch-style REST APIs across their historical
//! versions: raw wire operations, scroll and offset iteration, chunked bulk
//! loading and a document lifecycle manager.

mod bulk;
mod client;
mod dao;
mod paging;
mod scroll;
pub mod snapshot;
pub mod tasks;
mod transport;

#[cfg(test)]
pub(crate) mod testing;

pub use bulk::{BulkLoadOptions, BulkLoadReport};
pub use client::{Client, SearchMethod};
pub use dao::{Action, Clock, DeleteStrategy, DomainObject, SaveOptions, SystemClock};
pub use paging::{PageIterator, PageOptions};
pub use scroll::{ScrollIterator, ScrollOptions};
pub use snapshot::{Snapshot, SnapshotClient, SnapshotError};
pub use transport::{HttpTransport, Method, Request, Response, Transport};

pub use esprit_core;
pub use esprit_core::{Connection, Dao, Record};

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Core(#[from] esprit_core::Error),

    #[error("Server error: {status} - {message}")]
    Server { status: u16, message: String },

    #[error("Unable to initialise scroll (status {status}), could be your mappings are broken: {body}")]
    ScrollInitialise { status: u16, body: String },

    #[error("Scroll timed out (status {status}), you probably need to raise the keepalive value: {body}")]
    ScrollTimeout { status: u16, body: String },

    #[error("Bulk write failed: {status} - {body}")]
    BulkWrite { status: u16, body: String },

    #[error("Invalid save options: {0}")]
    InvalidSaveOptions(String),

    #[error("Consistency error: {0}")]
    Consistency(String),

    #[error("Invalid action: {0}")]
    InvalidAction(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error(transparent)]
    Snapshot(#[from] SnapshotError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ClientError>;
