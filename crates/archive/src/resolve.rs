//! Request routing for rendering surfaces that load an archive by path.

use crate::model::WebArchive;
use std::borrow::Cow;
use url::Url;

const INDEX: &str = "index.html";
const NOT_FOUND_MIME_TYPE: &str = "text/html";

/// Outcome of resolving a request path against an archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolved<'a> {
    Found { mime_type: &'a str, body: &'a [u8] },
    NotFound,
}

impl Resolved<'_> {
    #[must_use]
    pub fn status(&self) -> u16 {
        match self {
            Self::Found { .. } => 200,
            Self::NotFound => 404,
        }
    }

    #[must_use]
    pub fn mime_type(&self) -> &str {
        match self {
            Self::Found { mime_type, .. } => mime_type,
            Self::NotFound => NOT_FOUND_MIME_TYPE,
        }
    }

    #[must_use]
    pub fn body(&self) -> &[u8] {
        match self {
            Self::Found { body, .. } => body,
            Self::NotFound => &[],
        }
    }
}

impl WebArchive {
    /// Find the part serving `path`.
    ///
    /// `/`, the empty path and anything naming `index.html` serve the main
    /// document. Other paths match the first part whose URL contains them,
    /// since stored URLs may be host-relative or absolute. Query strings and
    /// fragments are ignored; a full URL is reduced to its path first.
    pub fn resolve(&self, path: &str) -> Resolved<'_> {
        let path = request_path(path);
        let part = match path.is_empty() || path == "/" || path.contains(INDEX) {
            true => self.document(),
            false => self.parts().iter().find(|part| part.url.contains(path.as_ref())),
        };
        match part {
            Some(part) => Resolved::Found {
                mime_type: &part.mime_type,
                body: &part.content,
            },
            None => {
                tracing::debug!(path = %path, "no archive part for request");
                Resolved::NotFound
            },
        }
    }
}

fn request_path(path: &str) -> Cow<'_, str> {
    match Url::parse(path) {
        Ok(url) if url.has_host() => Cow::Owned(url.path().to_string()),
        _ => Cow::Borrowed(path.split(['?', '#']).next().unwrap_or_default()),
    }
}
