//! Transport trait, progress callbacks and structured error types.
//!
//! The ArchiveTransport trait abstracts over where archive bytes come from
//! (the public HTTP archive in production, in-memory fixtures in tests). The
//! loader sits above this trait; transports know nothing about the cache.

use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Fetch-layer failures. Both variants soft-fail in the loader.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("file not found: {url}")]
    NotFound { url: String },

    #[error("transport failure for {url}: {reason}")]
    Transport { url: String, reason: String },

    #[error("failed to write {}: {reason}", path.display())]
    Io { path: PathBuf, reason: String },
}

impl FetchError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// Load-layer failures. These abort the current batch.
#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("archive missing from cache: {}", path.display())]
    MissingArchive { path: PathBuf },

    #[error("corrupt archive {}: {reason}", path.display())]
    Zip { path: PathBuf, reason: String },

    #[error("archive {} contains no entries", path.display())]
    EmptyArchive { path: PathBuf },

    #[error("archive {} has {found} columns, expected {expected}", path.display())]
    ColumnCount {
        path: PathBuf,
        expected: usize,
        found: usize,
    },

    #[error("failed to parse {}: {reason}", path.display())]
    Parse { path: PathBuf, reason: String },

    #[error("no column layout for {segment}/{kind}")]
    UnknownSchema { segment: String, kind: String },

    #[error("failed to concatenate daily frames: {0}")]
    Concat(String),
}

/// An open remote body ready to be streamed.
pub struct RemoteBody {
    pub content_length: Option<u64>,
    pub reader: Box<dyn Read + Send>,
}

/// Source of archive bytes.
pub trait ArchiveTransport {
    /// Human-readable name of this transport.
    fn name(&self) -> &str;

    /// Open `url` for reading. A missing remote resource must map to
    /// [`FetchError::NotFound`].
    fn open(&self, url: &str) -> Result<RemoteBody, FetchError>;
}

impl<T: ArchiveTransport + ?Sized> ArchiveTransport for &T {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn open(&self, url: &str) -> Result<RemoteBody, FetchError> {
        (**self).open(url)
    }
}

/// What `ensure_local` did for one daily file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    CacheHit(PathBuf),
    Downloaded { path: PathBuf, bytes: u64 },
}

impl FetchOutcome {
    pub fn path(&self) -> &Path {
        match self {
            Self::CacheHit(path) => path,
            Self::Downloaded { path, .. } => path,
        }
    }
}

/// Progress callbacks for a single file transfer.
pub trait DownloadProgress {
    /// Called before the first byte is read.
    fn on_start(&self, path: &Path, content_length: Option<u64>);

    /// Called after every chunk is written.
    fn on_progress(&self, bytes_done: u64, content_length: Option<u64>);

    /// Called when the transfer ends, successfully or not.
    fn on_complete(&self, path: &Path, result: &Result<FetchOutcome, FetchError>);
}

/// Renders a 50-cell bar on stderr.
pub struct StderrProgress;

const BAR_WIDTH: u64 = 50;

impl DownloadProgress for StderrProgress {
    fn on_start(&self, path: &Path, _content_length: Option<u64>) {
        eprintln!("\nFile Download: {}", path.display());
    }

    fn on_progress(&self, bytes_done: u64, content_length: Option<u64>) {
        let Some(total) = content_length.filter(|t| *t > 0) else {
            return;
        };
        let done = (BAR_WIDTH * bytes_done.min(total) / total) as usize;
        let mut err = io::stderr();
        let _ = write!(
            err,
            "\r[{}{}] {:>3}%",
            "#".repeat(done),
            ".".repeat(BAR_WIDTH as usize - done),
            100 * bytes_done.min(total) / total
        );
        let _ = err.flush();
    }

    fn on_complete(&self, _path: &Path, result: &Result<FetchOutcome, FetchError>) {
        if let Ok(FetchOutcome::Downloaded { .. }) = result {
            eprintln!();
        }
    }
}

/// Progress sink that renders nothing.
pub struct SilentProgress;

impl DownloadProgress for SilentProgress {
    fn on_start(&self, _path: &Path, _content_length: Option<u64>) {}
    fn on_progress(&self, _bytes_done: u64, _content_length: Option<u64>) {}
    fn on_complete(&self, _path: &Path, _result: &Result<FetchOutcome, FetchError>) {}
}
