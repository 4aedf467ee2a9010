//! Archive cache and loader.
//!
//! Layout: `{destination_dir}/{base_path}/{file_name}`, mirroring the remote
//! archive. Presence of the file is the only cache-hit signal.
//!
//! - Downloads stream through a bounded buffer into `{file}.part`, then rename
//!   into place, so an interrupted transfer never looks like a cache hit
//! - Fetch failures are logged and left to the caller; parsing a day whose
//!   archive is absent fails the whole load
//! - Daily frames are concatenated in request order, never re-sorted

use super::provider::{
    ArchiveError, ArchiveTransport, DownloadProgress, FetchError, FetchOutcome, RemoteBody,
};
use super::request::{ArchiveRequest, DailyFile};
use super::schema::{ArchiveSchema, ColumnCatalog};
use polars::prelude::*;
use std::fs;
use std::io::{self, Cursor, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Smallest read buffer used while streaming.
pub const MIN_BUFFER_SIZE: usize = 4096;

/// Read buffer for a transfer: one percent of the body, never below the floor.
pub fn buffer_size(content_length: Option<u64>) -> usize {
    match content_length {
        Some(len) => MIN_BUFFER_SIZE.max((len / 100) as usize),
        None => MIN_BUFFER_SIZE,
    }
}

/// Cached loader for daily archives.
pub struct ArchiveLoader<'a, T: ArchiveTransport> {
    catalog: &'a ColumnCatalog,
    transport: T,
    progress: &'a dyn DownloadProgress,
}

impl<'a, T: ArchiveTransport> ArchiveLoader<'a, T> {
    pub fn new(catalog: &'a ColumnCatalog, transport: T, progress: &'a dyn DownloadProgress) -> Self {
        Self {
            catalog,
            transport,
            progress,
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Make sure `file` is present locally, downloading it if absent.
    pub fn ensure_local(&self, file: &DailyFile) -> Result<FetchOutcome, FetchError> {
        if file.local_path.exists() {
            info!(path = %file.local_path.display(), "already exists, skipping download");
            return Ok(FetchOutcome::CacheHit(file.local_path.clone()));
        }

        let result = self.download(file);
        self.progress.on_complete(&file.local_path, &result);

        match &result {
            Ok(FetchOutcome::Downloaded { bytes, .. }) => {
                debug!(path = %file.local_path.display(), bytes, "download complete")
            }
            Ok(FetchOutcome::CacheHit(_)) => {}
            Err(e) if e.is_not_found() => {
                warn!(transport = self.transport.name(), url = %file.remote_url, "file not found")
            }
            Err(e) => warn!(
                transport = self.transport.name(),
                url = %file.remote_url,
                error = %e,
                "download failed"
            ),
        }

        result
    }

    /// Load every day of `request` into one frame.
    ///
    /// Each day is fetched if missing; a failed fetch does not stop the loop,
    /// but the subsequent read of the absent archive does.
    pub fn load_all(&self, request: &ArchiveRequest) -> Result<DataFrame, ArchiveError> {
        let schema = self
            .catalog
            .get(request.segment(), request.kind())
            .ok_or_else(|| ArchiveError::UnknownSchema {
                segment: request.segment().to_string(),
                kind: request.kind().to_string(),
            })?;

        let mut combined: Option<DataFrame> = None;
        for file in request.files() {
            if let Err(e) = self.ensure_local(file) {
                debug!(date = %file.date, error = %e, "continuing to parse after fetch failure");
            }

            let day = read_archive(&file.local_path, schema)?;
            match combined.as_mut() {
                Some(acc) => {
                    acc.vstack_mut(&day)
                        .map_err(|e| ArchiveError::Concat(e.to_string()))?;
                }
                None => combined = Some(day),
            }
        }

        let df = combined.unwrap_or_else(|| schema.empty_frame());
        info!(
            symbol = request.symbol(),
            days = request.files().len(),
            rows = df.height(),
            "loaded archive series"
        );
        Ok(df)
    }

    fn download(&self, file: &DailyFile) -> Result<FetchOutcome, FetchError> {
        let body = self.transport.open(&file.remote_url)?;

        if let Some(parent) = file.local_path.parent() {
            fs::create_dir_all(parent).map_err(|e| io_error(parent, e))?;
        }

        self.progress.on_start(&file.local_path, body.content_length);

        let tmp_path = part_path(&file.local_path);
        let bytes = match self.stream_to(&file.remote_url, body, &tmp_path) {
            Ok(bytes) => bytes,
            Err(e) => {
                let _ = fs::remove_file(&tmp_path);
                return Err(e);
            }
        };

        fs::rename(&tmp_path, &file.local_path).map_err(|e| {
            let _ = fs::remove_file(&tmp_path);
            io_error(&file.local_path, e)
        })?;

        Ok(FetchOutcome::Downloaded {
            path: file.local_path.clone(),
            bytes,
        })
    }

    fn stream_to(&self, url: &str, mut body: RemoteBody, path: &Path) -> Result<u64, FetchError> {
        let mut out = fs::File::create(path).map_err(|e| io_error(path, e))?;
        let mut buf = vec![0u8; buffer_size(body.content_length)];
        let mut done = 0u64;

        loop {
            let n = match body.reader.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    return Err(FetchError::Transport {
                        url: url.to_string(),
                        reason: e.to_string(),
                    })
                }
            };
            out.write_all(&buf[..n]).map_err(|e| io_error(path, e))?;
            done += n as u64;
            self.progress.on_progress(done, body.content_length);
        }

        out.flush().map_err(|e| io_error(path, e))?;
        Ok(done)
    }
}

/// Parse one cached archive with the given column layout.
///
/// The first record's field count must match the layout. A leading header
/// line, if present, is skipped.
pub fn read_archive(path: &Path, schema: &ArchiveSchema) -> Result<DataFrame, ArchiveError> {
    let file = fs::File::open(path).map_err(|e| match e.kind() {
        io::ErrorKind::NotFound => ArchiveError::MissingArchive {
            path: path.to_path_buf(),
        },
        _ => ArchiveError::Parse {
            path: path.to_path_buf(),
            reason: e.to_string(),
        },
    })?;

    let zip_error = |e: ::zip::result::ZipError| ArchiveError::Zip {
        path: path.to_path_buf(),
        reason: e.to_string(),
    };
    let mut archive = ::zip::ZipArchive::new(file).map_err(zip_error)?;
    if archive.len() == 0 {
        return Err(ArchiveError::EmptyArchive {
            path: path.to_path_buf(),
        });
    }

    let mut entry = archive.by_index(0).map_err(zip_error)?;
    let mut buf = Vec::with_capacity(entry.size() as usize);
    entry
        .read_to_end(&mut buf)
        .map_err(|e| ArchiveError::Zip {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

    let Some((start, end)) = first_record(&buf) else {
        return Ok(schema.empty_frame());
    };
    let first = trim_eol(&buf[start..end]);
    let found = first.iter().filter(|b| **b == b',').count() + 1;
    if found != schema.len() {
        return Err(ArchiveError::ColumnCount {
            path: path.to_path_buf(),
            expected: schema.len(),
            found,
        });
    }

    // Parsing starts at the first data record: leading blank lines and a
    // header line are dropped from the buffer.
    let data_start = if is_header(first) { end } else { start };
    buf.drain(..data_start);
    if buf.iter().all(|b| b.is_ascii_whitespace()) {
        return Ok(schema.empty_frame());
    }

    CsvReadOptions::default()
        .with_has_header(false)
        .with_schema(Some(Arc::new(schema.to_polars_schema())))
        .into_reader_with_file_handle(Cursor::new(buf))
        .finish()
        .map_err(|e| ArchiveError::Parse {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
}

/// Byte range of the first non-empty line, newline included.
fn first_record(buf: &[u8]) -> Option<(usize, usize)> {
    let mut start = 0;
    while start < buf.len() {
        let end = buf[start..]
            .iter()
            .position(|b| *b == b'\n')
            .map_or(buf.len(), |i| start + i + 1);
        if !trim_eol(&buf[start..end]).is_empty() {
            return Some((start, end));
        }
        start = end;
    }
    None
}

fn trim_eol(line: &[u8]) -> &[u8] {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    line.strip_suffix(b"\r").unwrap_or(line)
}

/// Archive rows start with a numeric id or timestamp.
fn is_header(line: &[u8]) -> bool {
    line.first().is_some_and(|b| b.is_ascii_alphabetic())
}

fn part_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".part");
    PathBuf::from(name)
}

fn io_error(path: &Path, e: io::Error) -> FetchError {
    FetchError::Io {
        path: path.to_path_buf(),
        reason: e.to_string(),
    }
}
