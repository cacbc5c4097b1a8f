//! Multipart spooling to temporary files.
//!
//! # Responsibilities
//! - Stream the raw multipart body to a uniquely named temp file
//! - Hand the file back as a byte stream for the canonical request
//! - Remove the file exactly once, when the owning request finishes
//!
//! # Design Decisions
//! - The body is not parsed here; the application owns multipart parsing
//! - `SpoolGuard` is created before the first byte is written, so every exit
//!   path (stream error, client abort, response completion) runs its `Drop`
//! - File names carry 128 bits from the OS-seeded CSPRNG

use std::io;
use std::path::{Path, PathBuf};

use axum::body::{Body, Bytes};
use futures_util::stream::{self, StreamExt};
use rand::Rng;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use crate::http::canonical::BodyStream;
use crate::observability::metrics;

const READ_CHUNK: usize = 64 * 1024;

/// Owns a temp file path and deletes the file when dropped.
#[derive(Debug)]
pub struct SpoolGuard {
    path: Option<PathBuf>,
}

impl SpoolGuard {
    fn new(path: PathBuf) -> Self {
        Self { path: Some(path) }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }
}

impl Drop for SpoolGuard {
    fn drop(&mut self) {
        let Some(path) = self.path.take() else {
            return;
        };
        match std::fs::remove_file(&path) {
            Ok(()) => {
                metrics::record_spool_cleanup();
                tracing::debug!(path = %path.display(), "Removed spooled upload");
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!(path = %path.display(), error = %e, "Failed to remove spooled upload"),
        }
    }
}

/// A multipart body fully flushed to disk.
#[derive(Debug)]
pub struct SpooledUpload {
    pub bytes: u64,
    guard: SpoolGuard,
}

impl SpooledUpload {
    pub fn path(&self) -> Option<&Path> {
        self.guard.path()
    }

    /// Open the spooled file as a byte stream. The returned guard must be
    /// kept alive until the response is finished.
    pub async fn open(self) -> io::Result<(BodyStream, SpoolGuard)> {
        let path = self.guard.path().map(Path::to_path_buf).unwrap_or_default();
        let file = File::open(&path).await?;
        Ok((file_stream(file), self.guard))
    }
}

/// Generate a collision-resistant temp file path under `dir`.
pub fn spool_path(dir: &Path) -> PathBuf {
    let suffix: u128 = rand::thread_rng().gen();
    dir.join(format!("upload-{:032x}.tmp", suffix))
}

/// Stream `body` into a new temp file under `dir`.
///
/// On any error the partial file is removed before returning.
pub async fn spool_body(body: Body, dir: &Path) -> io::Result<SpooledUpload> {
    let path = spool_path(dir);
    let mut file = File::create(&path).await?;
    let guard = SpoolGuard::new(path);
    tracing::debug!(path = ?guard.path(), "Spooling multipart upload");

    let mut written: u64 = 0;
    let mut data = body.into_data_stream();
    while let Some(chunk) = data.next().await {
        let chunk = chunk.map_err(|e| io::Error::new(io::ErrorKind::ConnectionAborted, e))?;
        file.write_all(&chunk).await?;
        written += chunk.len() as u64;
    }
    file.flush().await?;
    file.sync_data().await?;

    metrics::record_spooled(written);
    tracing::debug!(path = ?guard.path(), bytes = written, "Upload spooled");
    Ok(SpooledUpload {
        bytes: written,
        guard,
    })
}

fn file_stream(file: File) -> BodyStream {
    stream::unfold(Some(file), |state| async move {
        let mut file = state?;
        let mut buf = vec![0u8; READ_CHUNK];
        match file.read(&mut buf).await {
            Ok(0) => None,
            Ok(n) => {
                buf.truncate(n);
                Some((Ok(Bytes::from(buf)), Some(file)))
            }
            Err(e) => Some((Err(e), None)),
        }
    })
    .boxed()
}
