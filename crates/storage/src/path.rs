//! Storage key validation.
//!
//! Every key handed to a backend is relative to that backend's root. Keys are
//! normalised here once so backends never see `..`, `.` or repeated
//! separators, and so archive identifiers supplied by callers cannot reach
//! outside the root.

use crate::error::{ErrorKind, Result};
use std::ffi::OsStr;
use std::path::{Component, Path, PathBuf};

/// Validate and normalise a storage key.
///
/// Leading separators are dropped (keys are always root-relative), `.` is
/// removed and `..` pops the previous component. A key that would leave the
/// root, contains a null byte, carries a platform prefix (`C:`), or
/// normalises to nothing is [`InvalidPath`](crate::error::ErrorKind::InvalidPath).
///
/// # Examples
///
/// ```
/// use std::path::Path;
/// use webstash_storage::validate_path;
///
/// assert_eq!(validate_path("archives/abc.mht").unwrap(), Path::new("archives/abc.mht"));
/// assert_eq!(validate_path("/archives//./abc.mht").unwrap(), Path::new("archives/abc.mht"));
/// assert!(validate_path("archives/../../abc.mht").is_err());
/// assert!(validate_path("").is_err());
/// ```
pub fn validate(path: impl AsRef<Path>) -> Result<PathBuf> {
    let key = path.as_ref();
    let segments = key.components().try_fold(Vec::<&OsStr>::new(), |mut segments, component| {
        match component {
            Component::CurDir | Component::RootDir => {},
            Component::Normal(segment) => {
                // Survives `components()` on Unix but truncates in syscalls.
                if segment.as_encoded_bytes().contains(&0) {
                    return None;
                }
                segments.push(segment);
            },
            Component::ParentDir => {
                segments.pop()?;
            },
            Component::Prefix(_) => return None,
        }
        Some(segments)
    });
    match segments {
        Some(segments) if !segments.is_empty() => Ok(segments.into_iter().collect()),
        _ => exn::bail!(ErrorKind::InvalidPath(key.to_path_buf())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn archive_keys_pass_through() {
        assert_eq!(validate("archives/paywall-1.mht").unwrap(), Path::new("archives/paywall-1.mht"));
        assert_eq!(validate("tmp/paywall-1.mht.part").unwrap(), Path::new("tmp/paywall-1.mht.part"));
    }

    #[test]
    fn separators_and_dots_are_normalised() {
        assert_eq!(validate("archives//./a.mht").unwrap(), Path::new("archives/a.mht"));
        assert_eq!(validate("/archives/a.mht").unwrap(), Path::new("archives/a.mht"));
        assert_eq!(validate("archives/x/../a.mht/").unwrap(), Path::new("archives/a.mht"));
    }

    #[test]
    fn traversal_is_rejected() {
        assert!(validate("../a.mht").is_err());
        assert!(validate("archives/../../a.mht").is_err());
        assert!(validate("..").is_err());
    }

    #[test]
    fn null_bytes_are_rejected() {
        assert!(validate("archives/a\0.mht").is_err());
    }

    #[test]
    fn rejected_keys_report_the_original() {
        let err = validate("archives/../../a.mht").unwrap_err();
        assert!(matches!(&*err, ErrorKind::InvalidPath(key) if key == Path::new("archives/../../a.mht")));
    }

    #[test]
    fn empty_keys_are_rejected() {
        for key in ["", ".", "./", "//", "a/.."] {
            let err = validate(key).unwrap_err();
            assert!(matches!(&*err, ErrorKind::InvalidPath(_)), "{key:?} should be invalid");
        }
    }
}
