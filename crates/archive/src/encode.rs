//! Archive Encoding
//!
//! [`write_archive`] is the only place the wire format is produced. The other
//! entry points either buffer its output or run it on a background thread.

use crate::error::{ErrorKind, Result};
use crate::keys;
use crate::model::{ArchivePart, PartKind};
use base64::engine::general_purpose::STANDARD;
use base64::write::EncoderWriter;
use exn::ResultExt;
use md5::{Digest, Md5};
use std::io::{PipeReader, Write};
use tracing::instrument;

const CRLF: &[u8] = b"\r\n";
const BASE64_LINE_WIDTH: usize = 76;
const PIPE_THREAD_NAME: &str = "archive-pipe";

/// Compute the boundary token for a list of parts.
///
/// Lowercase hex MD5 over every part URL in list order, so the same list of
/// parts always produces the same boundary.
#[must_use]
pub fn boundary(parts: &[ArchivePart]) -> String {
    let mut hasher = Md5::new();
    for part in parts {
        hasher.update(part.url.as_bytes());
    }
    format!("{:x}", hasher.finalize())
}

/// Stream a complete archive into `sink`, returning the number of bytes
/// written.
///
/// The first [`Document`](PartKind::Document) part is written first, then
/// every resource in input order. Any further document parts are skipped.
#[instrument(skip(parts, sink), fields(parts = parts.len(), bytes))]
pub fn write_archive<W: Write>(url: &str, parts: &[ArchivePart], sink: W) -> Result<u64> {
    let boundary = boundary(parts);
    let mut out = CountingWriter::new(sink);

    write!(
        out,
        "From: <Saved by Superwall>\r\n\
         MIME-Version: 1.0\r\n\
         {subject}: Superwall Web Archive\r\n\
         {location}: {url}\r\n\
         {content_type}: multipart/related; type=\"text/html\"; boundary=\"{boundary}\"\r\n",
        subject = keys::SUBJECT,
        location = keys::SNAPSHOT_CONTENT_LOCATION,
        content_type = keys::CONTENT_TYPE,
    )
    .or_raise(|| ErrorKind::Io)?;

    let document = parts.iter().find(|part| part.kind == PartKind::Document);
    let resources = parts.iter().filter(|part| part.kind == PartKind::Resource);
    for part in document.into_iter().chain(resources) {
        write_part(&mut out, &boundary, part)?;
    }

    write!(out, "\r\n--{boundary}--\r\n").or_raise(|| ErrorKind::Io)?;
    out.flush().or_raise(|| ErrorKind::Io)?;

    tracing::Span::current().record("bytes", out.count);
    Ok(out.count)
}

fn write_part<W: Write>(out: &mut W, boundary: &str, part: &ArchivePart) -> Result<()> {
    write!(
        out,
        "\r\n--{boundary}\r\n\
         {}: {}\r\n\
         {}: {}\r\n\
         {}: {}\r\n\
         {}: {}\r\n\r\n",
        keys::CONTENT_TYPE,
        part.mime_type,
        keys::CONTENT_TRANSFER_ENCODING,
        part.transfer_encoding(),
        keys::CONTENT_LOCATION,
        part.url,
        keys::CONTENT_ID,
        part.content_id(),
    )
    .or_raise(|| ErrorKind::Io)?;

    {
        let mut encoder = EncoderWriter::new(LineWrap::new(&mut *out), &STANDARD);
        encoder.write_all(&part.content).or_raise(|| ErrorKind::Io)?;
        encoder
            .finish()
            .and_then(LineWrap::finish)
            .or_raise(|| ErrorKind::Io)?;
    }
    out.write_all(CRLF).or_raise(|| ErrorKind::Io)
}

/// Encode an archive into memory.
pub fn encode(url: &str, parts: &[ArchivePart]) -> Result<Vec<u8>> {
    let mut output = Vec::new();
    write_archive(url, parts, &mut output)?;
    Ok(output)
}

/// Encode an archive into a `String`.
///
/// The format is pure ASCII apart from URLs and mime types, which are
/// written as given.
pub fn encode_to_string(url: &str, parts: &[ArchivePart]) -> Result<String> {
    String::from_utf8(encode(url, parts)?).or_raise(|| ErrorKind::InvalidData)
}

/// Encode an archive lazily on a background thread.
///
/// Returns the read end of an OS pipe; the archive is produced as the reader
/// consumes it. Dropping the reader early stops the encoder at its next write.
#[instrument(skip(url, parts), fields(parts = parts.len()))]
pub fn archive_reader(url: impl Into<String>, parts: Vec<ArchivePart>) -> Result<PipeReader> {
    let url = url.into();
    let (reader, writer) = std::io::pipe().or_raise(|| ErrorKind::Pipe)?;
    std::thread::Builder::new()
        .name(PIPE_THREAD_NAME.to_string())
        .spawn(move || {
            if let Err(err) = write_archive(&url, &parts, writer) {
                tracing::debug!(url = %url, error = ?err, "archive pipe closed before encoding finished");
            }
        })
        .or_raise(|| ErrorKind::Pipe)?;
    Ok(reader)
}

struct CountingWriter<W> {
    inner: W,
    count: u64,
}

impl<W: Write> CountingWriter<W> {
    fn new(inner: W) -> Self {
        Self { inner, count: 0 }
    }
}

impl<W: Write> Write for CountingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let written = self.inner.write(buf)?;
        self.count += written as u64;
        Ok(written)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.inner.flush()
    }
}

/// Folds base64 output into CRLF-terminated lines of [`BASE64_LINE_WIDTH`].
struct LineWrap<W> {
    inner: W,
    column: usize,
}

impl<W: Write> LineWrap<W> {
    fn new(inner: W) -> Self {
        Self { inner, column: 0 }
    }

    /// Terminate the last partial line.
    fn finish(mut self) -> std::io::Result<W> {
        if self.column > 0 {
            self.inner.write_all(CRLF)?;
        }
        Ok(self.inner)
    }
}

impl<W: Write> Write for LineWrap<W> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let mut rest = buf;
        while !rest.is_empty() {
            let take = (BASE64_LINE_WIDTH - self.column).min(rest.len());
            self.inner.write_all(&rest[..take])?;
            self.column += take;
            rest = &rest[take..];
            if self.column == BASE64_LINE_WIDTH {
                self.inner.write_all(CRLF)?;
                self.column = 0;
            }
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.inner.flush()
    }
}
