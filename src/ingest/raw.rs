//! Size-bounded in-memory capture of request bodies.

use std::sync::atomic::{AtomicU64, Ordering};

use axum::body::{Body, Bytes};
use futures_util::StreamExt;

use crate::ingest::IngestError;

/// Bytes currently held by in-flight captures. Reported by the memory
/// supervisor as buffer memory.
static BUFFERED_BYTES: AtomicU64 = AtomicU64::new(0);

/// Upper bound on preallocation from an untrusted `Content-Length`.
const INITIAL_CAPACITY_CAP: u64 = 1024 * 1024;

pub fn buffered_bytes() -> u64 {
    BUFFERED_BYTES.load(Ordering::Relaxed)
}

/// Accounts captured bytes against `BUFFERED_BYTES` until dropped.
struct BufferLease(u64);

impl BufferLease {
    fn grow(&mut self, n: u64) {
        self.0 += n;
        BUFFERED_BYTES.fetch_add(n, Ordering::Relaxed);
    }
}

impl Drop for BufferLease {
    fn drop(&mut self) {
        BUFFERED_BYTES.fetch_sub(self.0, Ordering::Relaxed);
    }
}

/// Read the whole body, failing once more than `limit` bytes arrive.
///
/// A declared `Content-Length` above the limit is rejected before any byte
/// is read.
pub async fn capture(body: Body, limit: usize, declared: Option<u64>) -> Result<Bytes, IngestError> {
    if declared.is_some_and(|len| len > limit as u64) {
        return Err(IngestError::PayloadTooLarge { limit });
    }

    let mut lease = BufferLease(0);
    let initial = declared.map_or(0, |len| len.min(INITIAL_CAPACITY_CAP) as usize);
    let mut buf: Vec<u8> = Vec::with_capacity(initial);
    let mut data = body.into_data_stream();
    while let Some(chunk) = data.next().await {
        let chunk = chunk.map_err(|e| IngestError::Stream(e.to_string()))?;
        if buf.len() + chunk.len() > limit {
            return Err(IngestError::PayloadTooLarge { limit });
        }
        lease.grow(chunk.len() as u64);
        buf.extend_from_slice(&chunk);
    }
    Ok(Bytes::from(buf))
}

/// Read and discard up to `limit` bytes, returning how many were seen.
pub async fn drain(body: Body, limit: usize) -> u64 {
    let mut seen: u64 = 0;
    let mut data = body.into_data_stream();
    while let Some(chunk) = data.next().await {
        match chunk {
            Ok(chunk) => {
                seen += chunk.len() as u64;
                if seen > limit as u64 {
                    break;
                }
            }
            Err(e) => {
                tracing::debug!(error = %e, "Body stream ended early while draining");
                break;
            }
        }
    }
    seen
}

/// True when the payload opens like an XML document.
pub fn looks_like_xml(bytes: &[u8]) -> bool {
    let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
    bytes
        .iter()
        .find(|b| !b.is_ascii_whitespace())
        .is_some_and(|b| *b == b'<')
}
