//! HTTP responses for job artifacts: one file with byte ranges, or a zip
//! bundle streamed while it is being built.

use std::io::{self, SeekFrom, Write};
use std::path::{Path, PathBuf};

use axum::body::Body;
use axum::http::{HeaderMap, HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio::sync::mpsc;
use tokio_util::io::ReaderStream;
use tracing::{debug, warn};
use zip::ZipWriter;
use zip::write::SimpleFileOptions;

use super::classify::mime_type;
use super::resolver::{Selection, list_deliverables, select};
use crate::{Error, Result};

/// Zip output is handed to the HTTP body in chunks of about this size.
const ZIP_CHUNK_BYTES: usize = 256 * 1024;
const ZIP_CHANNEL_CAPACITY: usize = 8;

/// An inclusive byte range within a file of known size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub start: u64,
    pub end: u64,
}

/// The requested range lies outside the file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RangeNotSatisfiable;

impl ByteRange {
    /// Parse a `Range` header against a file of `size` bytes.
    ///
    /// Supports `bytes=start-end`, `bytes=start-` and `bytes=-suffix`; the end
    /// is clamped to the last byte. Headers we cannot interpret (other units,
    /// several ranges, garbage) yield `Ok(None)` and the full file is served.
    pub fn parse(
        header: &str,
        size: u64,
    ) -> std::result::Result<Option<Self>, RangeNotSatisfiable> {
        let Some(spec) = header.trim().strip_prefix("bytes=") else {
            return Ok(None);
        };
        if spec.contains(',') {
            return Ok(None);
        }
        let Some((start, end)) = spec.split_once('-') else {
            return Ok(None);
        };
        let (start, end) = (start.trim(), end.trim());

        if start.is_empty() {
            let Ok(suffix) = end.parse::<u64>() else {
                return Ok(None);
            };
            if suffix == 0 || size == 0 {
                return Err(RangeNotSatisfiable);
            }
            return Ok(Some(Self {
                start: size.saturating_sub(suffix),
                end: size - 1,
            }));
        }

        let Ok(start) = start.parse::<u64>() else {
            return Ok(None);
        };
        let end = if end.is_empty() {
            None
        } else {
            match end.parse::<u64>() {
                Ok(end) if end >= start => Some(end),
                _ => return Ok(None),
            }
        };
        if start >= size {
            return Err(RangeNotSatisfiable);
        }
        let last = size - 1;
        Ok(Some(Self {
            start,
            end: end.map_or(last, |end| end.min(last)),
        }))
    }

    pub fn length(&self) -> u64 {
        self.end - self.start + 1
    }

    pub fn content_range(&self, size: u64) -> String {
        format!("bytes {}-{}/{}", self.start, self.end, size)
    }
}

/// Resolve and serve the artifact of the job whose Output Directory is `dir`.
///
/// A missing directory, or one without deliverable files, is
/// [`Error::NotFound`].
pub async fn serve_artifact(dir: &Path, job_id: &str, range: Option<&str>) -> Result<Response> {
    let selection = resolve(dir, job_id).await?;
    if selection.is_single() {
        file_response(&dir.join(&selection.files[0]), &selection.files[0], range).await
    } else {
        zip_response(dir.to_path_buf(), &selection)
    }
}

/// Selection for a job, or not-found.
pub async fn resolve(dir: &Path, job_id: &str) -> Result<Selection> {
    let files = list_deliverables(dir)
        .await?
        .ok_or_else(|| Error::not_found("Download", job_id))?;
    select(&files).ok_or_else(|| Error::not_found("Completed file for download", job_id))
}

/// Serve one file, honouring a byte range when one is requested.
pub async fn file_response(path: &Path, name: &str, range: Option<&str>) -> Result<Response> {
    let mut file = tokio::fs::File::open(path)
        .await
        .map_err(|e| Error::io_path("opening file", path, e))?;
    let size = file
        .metadata()
        .await
        .map_err(|e| Error::io_path("reading file metadata", path, e))?
        .len();

    let mut headers = HeaderMap::new();
    headers.insert(header::ACCEPT_RANGES, HeaderValue::from_static("bytes"));

    let range = match range.map(|value| ByteRange::parse(value, size)) {
        Some(Err(RangeNotSatisfiable)) => {
            headers.insert(
                header::CONTENT_RANGE,
                header_value(format!("bytes */{size}"))?,
            );
            return Ok((StatusCode::RANGE_NOT_SATISFIABLE, headers).into_response());
        }
        Some(Ok(range)) => range,
        None => None,
    };

    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(mime_type(name)));
    headers.insert(header::CONTENT_DISPOSITION, attachment(name)?);
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));

    match range {
        Some(range) => {
            file.seek(SeekFrom::Start(range.start))
                .await
                .map_err(|e| Error::io_path("seeking file", path, e))?;
            headers.insert(header::CONTENT_LENGTH, HeaderValue::from(range.length()));
            headers.insert(header::CONTENT_RANGE, header_value(range.content_range(size))?);
            let body = Body::from_stream(ReaderStream::new(file.take(range.length())));
            Ok((StatusCode::PARTIAL_CONTENT, headers, body).into_response())
        }
        None => {
            headers.insert(header::CONTENT_LENGTH, HeaderValue::from(size));
            let body = Body::from_stream(ReaderStream::new(file));
            Ok((StatusCode::OK, headers, body).into_response())
        }
    }
}

/// Stream a zip of the selected files, built on a blocking thread.
///
/// The archive is never buffered whole or written to disk. If building it
/// fails part way, the body ends with an error and the client sees a
/// truncated transfer rather than a valid-looking archive.
pub fn zip_response(dir: PathBuf, selection: &Selection) -> Result<Response> {
    let (tx, rx) = mpsc::channel::<io::Result<Bytes>>(ZIP_CHANNEL_CAPACITY);
    let files = selection.files.clone();

    tokio::task::spawn_blocking(move || {
        let writer = ChannelWriter::new(tx.clone());
        if let Err(e) = write_zip(&dir, &files, writer) {
            warn!(dir = %dir.display(), error = %e, "Zip bundle aborted");
            let _ = tx.blocking_send(Err(io::Error::other(e.to_string())));
        }
    });

    let mut headers = HeaderMap::new();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/zip"));
    headers.insert(header::CONTENT_DISPOSITION, attachment(&selection.zip_name())?);
    headers.insert(
        header::CACHE_CONTROL,
        HeaderValue::from_static("no-cache, no-store, must-revalidate"),
    );

    let body = Body::from_stream(futures::stream::unfold(rx, |mut rx| async move {
        rx.recv().await.map(|item| (item, rx))
    }));
    Ok((StatusCode::OK, headers, body).into_response())
}

fn write_zip(dir: &Path, files: &[String], writer: ChannelWriter) -> Result<()> {
    let mut zip = ZipWriter::new_stream(writer);

    for name in files {
        let path = dir.join(name);
        let mut file =
            std::fs::File::open(&path).map_err(|e| Error::io_path("opening file", &path, e))?;
        let size = file
            .metadata()
            .map_err(|e| Error::io_path("reading file metadata", &path, e))?
            .len();

        let options = SimpleFileOptions::default()
            .compression_method(zip::CompressionMethod::Deflated)
            .large_file(size >= u64::from(u32::MAX));
        zip.start_file(name.as_str(), options)
            .map_err(|e| Error::Archive(format!("Failed to add {name}: {e}")))?;
        io::copy(&mut file, &mut zip)
            .map_err(|e| Error::Archive(format!("Failed to write {name}: {e}")))?;
        debug!(file = %name, bytes = size, "Added file to zip bundle");
    }

    let mut inner = zip
        .finish()
        .map_err(|e| Error::Archive(format!("Failed to finish zip: {e}")))?;
    inner.flush()?;
    Ok(())
}

/// `Write` adapter feeding an async HTTP body from a blocking thread.
struct ChannelWriter {
    tx: mpsc::Sender<io::Result<Bytes>>,
    buf: Vec<u8>,
}

impl ChannelWriter {
    fn new(tx: mpsc::Sender<io::Result<Bytes>>) -> Self {
        Self {
            tx,
            buf: Vec::with_capacity(ZIP_CHUNK_BYTES),
        }
    }

    fn send_buffered(&mut self) -> io::Result<()> {
        if self.buf.is_empty() {
            return Ok(());
        }
        let chunk = Bytes::from(std::mem::replace(
            &mut self.buf,
            Vec::with_capacity(ZIP_CHUNK_BYTES),
        ));
        self.tx
            .blocking_send(Ok(chunk))
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "response body dropped"))
    }
}

impl Write for ChannelWriter {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.buf.extend_from_slice(data);
        if self.buf.len() >= ZIP_CHUNK_BYTES {
            self.send_buffered()?;
        }
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.send_buffered()
    }
}

fn attachment(name: &str) -> Result<HeaderValue> {
    header_value(format!(
        "attachment; filename=\"{}\"",
        urlencoding::encode(name)
    ))
}

fn header_value(value: String) -> Result<HeaderValue> {
    HeaderValue::try_from(value).map_err(|e| Error::Other(format!("Invalid header value: {e}")))
}
