//! Boundary-safe splitting of line-delimited bulk payloads.
//!
//! A bulk payload alternates action lines and document lines. Chunks are cut
//! only immediately before an action line, so an action and its document
//! always travel together, and concatenating the chunks in order gives back
//! the original bytes.

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::envelope::{is_action_line, rewrite_action_index};
use crate::error::Result;

const READ_BLOCK: usize = 8 * 1024;

/// Reads successive chunks of at most `max_bytes` from a bulk payload.
///
/// A single record pair larger than `max_bytes` is never split; its chunk
/// extends past the limit up to the next action line.
pub struct BulkChunker<R> {
    reader: R,
    max_bytes: usize,
    position: u64,
    len: u64,
}

impl<R: Read + Seek> BulkChunker<R> {
    /// Chunk `reader` from its current position to its end.
    pub fn new(mut reader: R, max_bytes: usize) -> Result<Self> {
        let position = reader.stream_position()?;
        let len = reader.seek(SeekFrom::End(0))?;
        reader.seek(SeekFrom::Start(position))?;
        Ok(Self {
            reader,
            max_bytes: max_bytes.max(1),
            position,
            len,
        })
    }

    /// Offset at which the next chunk starts.
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Bytes left to chunk.
    pub fn remaining(&self) -> u64 {
        self.len.saturating_sub(self.position)
    }

    pub fn next_chunk(&mut self) -> Result<Option<Vec<u8>>> {
        if self.position >= self.len {
            return Ok(None);
        }

        self.reader.seek(SeekFrom::Start(self.position))?;
        let mut buf = Vec::with_capacity(self.max_bytes.min(self.remaining() as usize));
        (&mut self.reader)
            .take(self.max_bytes as u64)
            .read_to_end(&mut buf)?;

        if self.position + buf.len() as u64 >= self.len {
            self.position = self.len;
            return Ok(Some(buf));
        }

        match self.find_cut(&buf)? {
            Some(cut) => buf.truncate(cut),
            None => {
                tracing::warn!(
                    offset = self.position,
                    max_bytes = self.max_bytes,
                    "record pair exceeds chunk size, sending oversized chunk"
                );
                self.extend_to_boundary(&mut buf)?;
            }
        }

        self.position += buf.len() as u64;
        self.reader.seek(SeekFrom::Start(self.position))?;
        Ok(Some(buf))
    }

    /// Latest offset in `buf` directly followed by an action line.
    fn find_cut(&mut self, buf: &[u8]) -> Result<Option<usize>> {
        let mut end = buf.len();
        while end > 0 {
            if buf[end - 1] == b'\n' {
                let line = match buf[end..].iter().position(|b| *b == b'\n') {
                    Some(n) => buf[end..end + n].to_vec(),
                    None => self.read_line_at(self.position + end as u64)?,
                };
                if is_action_line(&line) {
                    return Ok(Some(end));
                }
            }
            end -= 1;
        }
        Ok(None)
    }

    /// Grow `buf` until it ends just before an action line or at end of input.
    fn extend_to_boundary(&mut self, buf: &mut Vec<u8>) -> Result<()> {
        if buf.last() != Some(&b'\n') {
            let rest = self.read_line_at(self.position + buf.len() as u64)?;
            buf.extend_from_slice(&rest);
        }
        loop {
            let offset = self.position + buf.len() as u64;
            if offset >= self.len {
                return Ok(());
            }
            let line = self.read_line_at(offset)?;
            if is_action_line(&line) {
                return Ok(());
            }
            buf.extend_from_slice(&line);
        }
    }

    /// The line starting at `offset`, including its newline if it has one.
    fn read_line_at(&mut self, offset: u64) -> io::Result<Vec<u8>> {
        self.reader.seek(SeekFrom::Start(offset))?;
        let mut line = Vec::new();
        let mut block = [0u8; READ_BLOCK];
        loop {
            let n = self.reader.read(&mut block)?;
            if n == 0 {
                return Ok(line);
            }
            if let Some(nl) = block[..n].iter().position(|b| *b == b'\n') {
                line.extend_from_slice(&block[..=nl]);
                return Ok(line);
            }
            line.extend_from_slice(&block[..n]);
        }
    }
}

impl<R: Read + Seek> Iterator for BulkChunker<R> {
    type Item = Result<Vec<u8>>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_chunk().transpose()
    }
}

fn lines(chunk: &[u8]) -> impl Iterator<Item = &[u8]> {
    chunk.split_inclusive(|b| *b == b'\n')
}

/// Number of action/document pairs in a chunk.
pub fn count_pairs(chunk: &[u8]) -> usize {
    lines(chunk).count() / 2
}

/// The leading `pairs` record pairs of a chunk.
pub fn truncate_pairs(chunk: &[u8], pairs: usize) -> &[u8] {
    let keep: usize = lines(chunk).take(pairs * 2).map(<[u8]>::len).sum();
    &chunk[..keep]
}

/// Point every action line of a chunk at `index`.
pub fn rewrite_chunk_index(chunk: &[u8], index: &str) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(chunk.len() + 32);
    for (n, line) in lines(chunk).enumerate() {
        if n % 2 == 0 {
            out.extend_from_slice(rewrite_action_index(line, index)?.as_bytes());
            if line.ends_with(b"\n") {
                out.push(b'\n');
            }
        } else {
            out.extend_from_slice(line);
        }
    }
    Ok(out)
}

/// Split a bulk file into standalone chunk files without sending anything.
///
/// Files are written to `out_dir` as `{stem}.{n:05}.{ext}` and returned in
/// order.
pub fn split_bulk_file(path: &Path, out_dir: &Path, max_bytes: usize) -> Result<Vec<PathBuf>> {
    std::fs::create_dir_all(out_dir)?;
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("bulk")
        .to_string();
    let ext = path.extension().and_then(|s| s.to_str());

    let chunker = BulkChunker::new(File::open(path)?, max_bytes)?;
    let mut written = Vec::new();
    for (n, chunk) in chunker.enumerate() {
        let chunk = chunk?;
        let name = match ext {
            Some(ext) => format!("{}.{:05}.{}", stem, n, ext),
            None => format!("{}.{:05}", stem, n),
        };
        let target = out_dir.join(name);
        File::create(&target)?.write_all(&chunk)?;
        tracing::debug!(file = %target.display(), bytes = chunk.len(), "wrote bulk chunk");
        written.push(target);
    }
    Ok(written)
}
