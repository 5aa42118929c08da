//! Single-file web archives.
//!
//! A web page and every resource it references are stored as one
//! `multipart/related` document (the same framing browsers use for MHTML),
//! so a previously fetched page can be rendered again without network
//! access. This crate provides:
//!
//! - The decoded **model**: [`WebArchive`] holding [`ArchivePart`]s, each
//!   either the main document or a resource ([`PartKind`]).
//! - **Encoding** with a single streaming core ([`write_archive`]) plus
//!   buffered conveniences ([`encode`], [`encode_to_string`]) and a pipe
//!   backed [`archive_reader`] for consumers that want a [`Read`](std::io::Read).
//! - **Decoding** from text ([`decode_str`]), bytes ([`decode_bytes`]) or a
//!   reader ([`decode_reader`]). Decoding never fails on malformed input:
//!   it degrades to whatever headers and parts could be recovered.
//! - **Path resolution** ([`WebArchive::resolve`]) for rendering surfaces
//!   that request resources by path.
//!
//! Every part is framed by a boundary derived from the MD5 of all part URLs
//! ([`boundary`]), so encoding the same list twice yields identical bytes.

mod decode;
mod encode;
pub mod error;
mod model;
mod resolve;

pub use crate::decode::{decode_bytes, decode_reader, decode_str};
pub use crate::encode::{archive_reader, boundary, encode, encode_to_string, write_archive};
pub use crate::model::{ArchivePart, MAIN_DOCUMENT_ID, PartKind, TransferEncoding, WebArchive};
pub use crate::resolve::Resolved;

/// Header names used on the wire.
pub mod keys {
    pub const CONTENT_TYPE: &str = "Content-Type";
    pub const CONTENT_TRANSFER_ENCODING: &str = "Content-Transfer-Encoding";
    pub const CONTENT_LOCATION: &str = "Content-Location";
    pub const CONTENT_ID: &str = "Content-Id";
    pub const SNAPSHOT_CONTENT_LOCATION: &str = "Snapshot-Content-Location";
    pub const SUBJECT: &str = "Subject";
    /// Not a real header: the unquoted `boundary` parameter of the top-level
    /// `Content-Type`, recorded alongside the headers when decoding.
    pub const BOUNDARY: &str = "boundary";
}
