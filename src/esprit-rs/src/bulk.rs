//! Chunked bulk loading from line-delimited payload files.

use std::fs::File;
use std::io::{Read, Seek};
use std::path::Path;

use esprit_core::chunking::{count_pairs, rewrite_chunk_index, truncate_pairs, BulkChunker};

use crate::{Client, ClientError, Result};

/// Default upper bound on a single bulk request body.
pub const DEFAULT_MAX_CHUNK_BYTES: usize = 100 * 1024 * 1024;

#[derive(Debug, Clone)]
pub struct BulkLoadOptions {
    /// Stop after this many record pairs.
    pub limit: Option<usize>,
    pub max_chunk_bytes: usize,
    /// Point every action line at this index before sending.
    pub rewrite_index: Option<String>,
}

impl Default for BulkLoadOptions {
    fn default() -> Self {
        Self {
            limit: None,
            max_chunk_bytes: DEFAULT_MAX_CHUNK_BYTES,
            rewrite_index: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BulkLoadReport {
    pub chunks: usize,
    pub records: usize,
}

impl Client {
    /// Push a bulk payload file to `doc_type`'s `_bulk` endpoint.
    #[tracing::instrument(skip(self, path, options), fields(path = %path.display()))]
    pub async fn bulk_load(
        &self,
        doc_type: &str,
        path: &Path,
        options: &BulkLoadOptions,
    ) -> Result<BulkLoadReport> {
        let file = File::open(path)?;
        self.bulk_load_from(doc_type, file, options).await
    }

    /// Push a bulk payload from any seekable reader, starting at its current
    /// position.
    ///
    /// Chunks go out one at a time and never split an action from its
    /// document. The first rejected chunk aborts the load.
    pub async fn bulk_load_from<R: Read + Seek>(
        &self,
        doc_type: &str,
        reader: R,
        options: &BulkLoadOptions,
    ) -> Result<BulkLoadReport> {
        let mut chunker = BulkChunker::new(reader, options.max_chunk_bytes)?;
        let mut report = BulkLoadReport::default();

        if options.limit.is_none() && chunker.remaining() <= options.max_chunk_bytes as u64 {
            if let Some(chunk) = chunker.next_chunk()? {
                let pairs = count_pairs(&chunk);
                self.send_chunk(doc_type, chunk, options).await?;
                report.chunks = 1;
                report.records = pairs;
            }
            tracing::info!(records = report.records, "bulk payload sent in one request");
            return Ok(report);
        }

        while let Some(mut chunk) = chunker.next_chunk()? {
            let mut pairs = count_pairs(&chunk);
            let mut last = false;
            if let Some(limit) = options.limit {
                let left = limit.saturating_sub(report.records);
                if pairs >= left {
                    let keep = truncate_pairs(&chunk, left).len();
                    chunk.truncate(keep);
                    pairs = left;
                    last = true;
                }
            }
            if pairs == 0 {
                break;
            }

            self.send_chunk(doc_type, chunk, options).await?;
            report.chunks += 1;
            report.records += pairs;
            tracing::info!(
                chunk = report.chunks,
                pairs,
                offset = chunker.position(),
                "bulk chunk accepted"
            );
            if last {
                break;
            }
        }
        Ok(report)
    }

    async fn send_chunk(&self, doc_type: &str, chunk: Vec<u8>, options: &BulkLoadOptions) -> Result<()> {
        let body = match &options.rewrite_index {
            Some(index) => rewrite_chunk_index(&chunk, index)?,
            None => chunk,
        };
        let response = self.bulk_body(doc_type, body).await?;
        if !response.is_success() {
            return Err(ClientError::BulkWrite {
                status: response.status,
                body: response.body,
            });
        }
        Ok(())
    }
}
