//! Higher-level jobs built from the client operations: copying records
//! between connections, dumping to files and managing aliases.

use std::io::{self, Write};

use esprit_core::envelope::{to_alias_actions, AliasAction};
use esprit_core::models::ID_FIELD;
use esprit_core::{Connection, Record};
use serde_json::Value;

use crate::client::SearchMethod;
use crate::paging::PageOptions;
use crate::{Client, ClientError, Result};

#[derive(Debug, Clone)]
pub struct CopyOptions {
    pub batch_size: usize,
    pub limit: Option<u64>,
    pub method: SearchMethod,
}

impl Default for CopyOptions {
    fn default() -> Self {
        Self {
            batch_size: 1000,
            limit: None,
            method: SearchMethod::Post,
        }
    }
}

/// Copy every record matching `query` from one connection to another,
/// writing in bulk batches of `batch_size`. Returns the number copied.
#[tracing::instrument(skip(source, target, query, options))]
pub async fn copy(
    source: &Client,
    source_type: &str,
    target: &Client,
    target_type: &str,
    query: Option<&Value>,
    options: &CopyOptions,
) -> Result<usize> {
    let page = PageOptions {
        page_size: options.batch_size,
        limit: options.limit,
        method: options.method,
        ..PageOptions::default()
    };
    let mut records = source.iterate(&[source_type], query, page);

    let mut batch = Vec::with_capacity(options.batch_size);
    let mut copied = 0;
    while let Some(record) = records.next().await? {
        batch.push(record);
        if batch.len() >= options.batch_size {
            copied += write_batch(target, target_type, &mut batch).await?;
        }
    }
    if !batch.is_empty() {
        copied += write_batch(target, target_type, &mut batch).await?;
    }
    Ok(copied)
}

async fn write_batch(target: &Client, doc_type: &str, batch: &mut Vec<Record>) -> Result<usize> {
    tracing::info!(records = batch.len(), doc_type, "writing batch");
    let response = target.bulk(doc_type, batch, ID_FIELD).await?;
    if !response.is_success() {
        return Err(ClientError::BulkWrite {
            status: response.status,
            body: response.body,
        });
    }
    let written = batch.len();
    batch.clear();
    Ok(written)
}

/// Write every matching record to `out` as one JSON document per line.
///
/// `transform` is applied to each record before it is written.
pub async fn dump<W: Write>(
    client: &Client,
    doc_type: &str,
    query: Option<&Value>,
    options: PageOptions,
    out: &mut W,
    transform: Option<&(dyn Fn(Record) -> Record + Sync)>,
) -> Result<usize> {
    let mut records = client.iterate(&[doc_type], query, options);
    let mut written = 0;
    while let Some(mut record) = records.next().await? {
        if let Some(transform) = transform {
            record = transform(record);
        }
        serde_json::to_writer(&mut *out, &record)?;
        out.write_all(b"\n")?;
        written += 1;
    }
    out.flush()?;
    Ok(written)
}

/// Streams values into a single JSON array.
pub struct JsonListWriter<W: Write> {
    inner: W,
    first: bool,
}

impl<W: Write> JsonListWriter<W> {
    pub fn new(mut inner: W) -> io::Result<Self> {
        inner.write_all(b"[")?;
        Ok(Self { inner, first: true })
    }

    pub fn write(&mut self, value: &Value) -> Result<()> {
        self.separate()?;
        serde_json::to_writer(&mut self.inner, value)?;
        Ok(())
    }

    /// Append an already-serialised JSON value.
    pub fn write_raw(&mut self, json: &str) -> io::Result<()> {
        self.separate()?;
        self.inner.write_all(json.as_bytes())
    }

    fn separate(&mut self) -> io::Result<()> {
        if self.first {
            self.first = false;
            Ok(())
        } else {
            self.inner.write_all(b",")
        }
    }

    /// Close the array and hand back the writer.
    pub fn finish(mut self) -> io::Result<W> {
        self.inner.write_all(b"]")?;
        self.inner.flush()?;
        Ok(self.inner)
    }
}

fn alias_entries(conn: &Connection, alias: &str) -> Vec<AliasAction> {
    conn.index()
        .unwrap_or_default()
        .iter()
        .map(|index| AliasAction {
            alias: alias.to_string(),
            index: index.clone(),
        })
        .collect()
}

/// Point `alias` at the client's index.
pub async fn create_alias(client: &Client, alias: &str) -> Result<Value> {
    let actions = to_alias_actions(&alias_entries(client.connection(), alias), &[]);
    post_alias_checked(client, &actions).await
}

/// Move `alias` from the old client's index to the new one in one request.
pub async fn repoint_alias(old: &Client, new: &Client, alias: &str) -> Result<Value> {
    let actions = to_alias_actions(
        &alias_entries(new.connection(), alias),
        &alias_entries(old.connection(), alias),
    );
    post_alias_checked(new, &actions).await
}

async fn post_alias_checked(client: &Client, actions: &Value) -> Result<Value> {
    let response = client.post_alias(actions).await?;
    if !response.is_success() {
        return Err(response.into_server_error());
    }
    let value = response.value()?;
    tracing::info!(response = %value, "alias updated");
    Ok(value)
}
