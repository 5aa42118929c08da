//! Decoded archive model.

use crate::keys;
use md5::{Digest, Md5};
use std::collections::BTreeMap;
use std::fmt::{Display, Formatter, Result as FmtResult};

/// Reserved `Content-Id` marking the main document on the wire.
pub const MAIN_DOCUMENT_ID: &str = "<mainDocument>";

/// Role of a part within an archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PartKind {
    /// The page itself. Exactly one per archive.
    Document,
    /// Anything the page references: scripts, styles, images, fonts.
    Resource,
}

/// Label written in the `Content-Transfer-Encoding` header of a part.
///
/// The payload is always base64 regardless of the label; readers of the
/// format rely on the label being derived from the mime type alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferEncoding {
    QuotedPrintable,
    Base64,
}

impl TransferEncoding {
    #[must_use]
    pub fn for_mime_type(mime_type: &str) -> Self {
        match mime_type.contains("text") {
            true => Self::QuotedPrintable,
            false => Self::Base64,
        }
    }

    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::QuotedPrintable => "quoted-printable",
            Self::Base64 => "base64",
        }
    }
}

impl Display for TransferEncoding {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{}", self.as_str())
    }
}

/// One entity of an archive: its origin URL, media type and raw bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchivePart {
    pub kind: PartKind,
    pub url: String,
    pub mime_type: String,
    pub content: Vec<u8>,
}

impl ArchivePart {
    pub fn document(url: impl Into<String>, mime_type: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
        Self {
            kind: PartKind::Document,
            url: url.into(),
            mime_type: mime_type.into(),
            content: content.into(),
        }
    }

    pub fn resource(url: impl Into<String>, mime_type: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
        Self {
            kind: PartKind::Resource,
            url: url.into(),
            mime_type: mime_type.into(),
            content: content.into(),
        }
    }

    #[inline]
    #[must_use]
    pub fn is_document(&self) -> bool {
        self.kind == PartKind::Document
    }

    /// Wire identifier of this part.
    ///
    /// The document always gets [`MAIN_DOCUMENT_ID`]; resources get an id
    /// derived from their URL, so the same URL always yields the same id.
    #[must_use]
    pub fn content_id(&self) -> String {
        match self.kind {
            PartKind::Document => MAIN_DOCUMENT_ID.to_string(),
            PartKind::Resource => format!("<{:x}@resource>", Md5::digest(self.url.as_bytes())),
        }
    }

    #[inline]
    #[must_use]
    pub fn transfer_encoding(&self) -> TransferEncoding {
        TransferEncoding::for_mime_type(&self.mime_type)
    }
}

/// A decoded archive: top-level headers plus the parts in stored order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WebArchive {
    headers: BTreeMap<String, String>,
    parts: Vec<ArchivePart>,
}

impl WebArchive {
    pub fn new(headers: BTreeMap<String, String>, parts: Vec<ArchivePart>) -> Self {
        Self { headers, parts }
    }

    pub fn headers(&self) -> &BTreeMap<String, String> {
        &self.headers
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn parts(&self) -> &[ArchivePart] {
        &self.parts
    }

    pub fn into_parts(self) -> Vec<ArchivePart> {
        self.parts
    }

    pub fn document(&self) -> Option<&ArchivePart> {
        self.parts.iter().find(|part| part.is_document())
    }

    pub fn resources(&self) -> impl Iterator<Item = &ArchivePart> {
        self.parts.iter().filter(|part| !part.is_document())
    }

    pub fn boundary(&self) -> Option<&str> {
        self.headers.get(keys::BOUNDARY).map(String::as_str)
    }

    /// URL the archive was captured from.
    pub fn snapshot_location(&self) -> Option<&str> {
        self.header(keys::SNAPSHOT_CONTENT_LOCATION)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }
}
