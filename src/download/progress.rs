//! Write-side decorator that hashes, counts and reports bytes on their way to disk.

use std::fmt;
use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use sha1::{Digest, Sha1};
use tokio::io::AsyncWrite;

use super::descriptor::ChecksumAlgorithm;

/// Progress snapshot for one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileProgress {
    /// Product identifier the file belongs to (empty for bare URLs).
    pub id: String,
    /// Resolved filename.
    pub name: String,
    /// Source URL.
    pub url: String,
    /// Bytes written so far.
    pub downloaded: u64,
    /// Expected total, when known.
    pub total: Option<u64>,
}

/// Progress callback.
///
/// Invoked synchronously on the task copying the file, so it must return
/// quickly; a slow callback stalls that file's transfer.
pub type ProgressFn = Arc<dyn Fn(&FileProgress) + Send + Sync>;

/// Running digest over the bytes written so far.
pub enum ChecksumHasher {
    /// MD5 state.
    Md5(md5::Context),
    /// SHA-1 state.
    Sha1(Sha1),
}

impl fmt::Debug for ChecksumHasher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Md5(_) => f.write_str("ChecksumHasher::Md5"),
            Self::Sha1(_) => f.write_str("ChecksumHasher::Sha1"),
        }
    }
}

impl ChecksumHasher {
    /// Creates a hasher for `algorithm`, or `None` when nothing is verified.
    #[must_use]
    pub fn new(algorithm: ChecksumAlgorithm) -> Option<Self> {
        match algorithm {
            ChecksumAlgorithm::None => None,
            ChecksumAlgorithm::Md5 => Some(Self::Md5(md5::Context::new())),
            ChecksumAlgorithm::Sha1 => Some(Self::Sha1(Sha1::new())),
        }
    }

    /// Feeds bytes into the digest.
    pub fn update(&mut self, data: &[u8]) {
        match self {
            Self::Md5(context) => context.consume(data),
            Self::Sha1(hasher) => hasher.update(data),
        }
    }

    /// Finishes the digest and returns it as lowercase hex.
    #[must_use]
    pub fn finalize_hex(self) -> String {
        match self {
            Self::Md5(context) => format!("{:x}", context.compute()),
            Self::Sha1(hasher) => hex::encode(hasher.finalize()),
        }
    }
}

/// [`AsyncWrite`] decorator around the destination file.
///
/// Only bytes the inner writer accepted are hashed and counted, so a short
/// write never makes the digest run ahead of the file contents.
pub struct ProgressWriter<W> {
    inner: W,
    hasher: Option<ChecksumHasher>,
    progress: Option<ProgressFn>,
    snapshot: FileProgress,
}

impl<W> fmt::Debug for ProgressWriter<W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProgressWriter")
            .field("hasher", &self.hasher)
            .field("snapshot", &self.snapshot)
            .finish_non_exhaustive()
    }
}

impl<W: AsyncWrite + Unpin> ProgressWriter<W> {
    /// Wraps `inner`; `snapshot` supplies the identity fields and total.
    pub fn new(inner: W, mut snapshot: FileProgress) -> Self {
        snapshot.downloaded = 0;
        Self {
            inner,
            hasher: None,
            progress: None,
            snapshot,
        }
    }

    /// Hashes written bytes with `hasher`.
    #[must_use]
    pub fn with_hasher(mut self, hasher: Option<ChecksumHasher>) -> Self {
        self.hasher = hasher;
        self
    }

    /// Reports every accepted write to `progress`.
    #[must_use]
    pub fn with_progress(mut self, progress: Option<ProgressFn>) -> Self {
        self.progress = progress;
        self
    }

    /// Bytes written so far.
    #[must_use]
    pub fn downloaded(&self) -> u64 {
        self.snapshot.downloaded
    }

    /// Mutable access to the wrapped writer.
    pub fn get_mut(&mut self) -> &mut W {
        &mut self.inner
    }

    /// Returns the inner writer and the hex digest, if hashing was enabled.
    pub fn into_parts(self) -> (W, Option<String>) {
        (self.inner, self.hasher.map(ChecksumHasher::finalize_hex))
    }

    fn record(&mut self, written: &[u8]) {
        if written.is_empty() {
            return;
        }
        if let Some(hasher) = self.hasher.as_mut() {
            hasher.update(written);
        }
        self.snapshot.downloaded += written.len() as u64;
        if let Some(progress) = &self.progress {
            progress(&self.snapshot);
        }
    }
}

impl<W: AsyncWrite + Unpin> AsyncWrite for ProgressWriter<W> {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        let poll = Pin::new(&mut this.inner).poll_write(cx, buf);
        if let Poll::Ready(Ok(written)) = &poll {
            this.record(&buf[..*written]);
        }
        poll
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_shutdown(cx)
    }
}
