use super::{find_blank_line, is_blank, parse_headers, parse_part, with_boundary};
use crate::error::{ErrorKind, Result};
use crate::model::{ArchivePart, WebArchive};
use exn::ResultExt;
use std::io::{BufRead, BufReader, Read};
use std::ops::ControlFlow;
use tracing::instrument;

/// Knuth-Morris-Pratt matcher over a fixed, non-empty needle.
pub(crate) struct Kmp {
    needle: Vec<u8>,
    failure: Vec<usize>,
}

impl Kmp {
    pub(crate) fn new(needle: impl Into<Vec<u8>>) -> Self {
        let needle = needle.into();
        let mut failure = vec![0; needle.len()];
        let mut k = 0;
        for i in 1..needle.len() {
            while k > 0 && needle[i] != needle[k] {
                k = failure[k - 1];
            }
            if needle[i] == needle[k] {
                k += 1;
            }
            failure[i] = k;
        }
        Self { needle, failure }
    }

    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.needle.len()
    }

    /// Advance from `state` (bytes of the needle matched so far) by one byte.
    #[inline]
    fn step(&self, mut state: usize, byte: u8) -> usize {
        while state > 0 && self.needle[state] != byte {
            state = self.failure[state - 1];
        }
        if self.needle[state] == byte {
            state += 1;
        }
        state
    }

    /// Offset of the first occurrence of the needle at or after `start`.
    pub(crate) fn find(&self, haystack: &[u8], start: usize) -> Option<usize> {
        if self.needle.is_empty() {
            return None;
        }
        let mut state = 0;
        for (index, byte) in haystack.iter().enumerate().skip(start) {
            state = self.step(state, *byte);
            if state == self.needle.len() {
                return Some(index + 1 - state);
            }
        }
        None
    }

    pub(crate) fn matcher(&self) -> Matcher<'_> {
        Matcher { kmp: self, state: 0 }
    }
}

/// Incremental form of [`Kmp::find`], fed one byte at a time.
pub(crate) struct Matcher<'k> {
    kmp: &'k Kmp,
    state: usize,
}

impl Matcher<'_> {
    /// Returns `true` when `byte` completes a match. Matches never overlap.
    pub(crate) fn push(&mut self, byte: u8) -> bool {
        self.state = self.kmp.step(self.state, byte);
        if self.state == self.kmp.len() {
            self.state = 0;
            return true;
        }
        false
    }
}

fn accept(segment: &[u8], parts: &mut Vec<ArchivePart>) -> ControlFlow<()> {
    if is_blank(segment) {
        return ControlFlow::Continue(());
    }
    if segment.starts_with(b"--") {
        return ControlFlow::Break(());
    }
    parts.extend(parse_part(segment));
    ControlFlow::Continue(())
}

/// Decode an archive from bytes already in memory.
#[instrument(skip(input), fields(input_size = input.len(), parts))]
pub fn decode_bytes(input: &[u8]) -> WebArchive {
    let Some((header_end, body_start)) = find_blank_line(input) else {
        tracing::debug!("archive has no header separator");
        return WebArchive::default();
    };
    let (headers, boundary) = with_boundary(parse_headers(&input[..header_end]));
    let Some(boundary) = boundary else {
        tracing::warn!("archive has no boundary, no parts decoded");
        return WebArchive::new(headers, Vec::new());
    };

    let kmp = Kmp::new(format!("--{boundary}"));
    let mut parts = Vec::new();
    let mut cursor = body_start;
    loop {
        let (segment, next) = match kmp.find(input, cursor) {
            Some(position) => (&input[cursor..position], Some(position + kmp.len())),
            None => (&input[cursor..], None),
        };
        if accept(segment, &mut parts).is_break() {
            break;
        }
        match next {
            Some(next) => cursor = next,
            None => break,
        }
    }

    tracing::Span::current().record("parts", parts.len());
    WebArchive::new(headers, parts)
}

/// Decode an archive from a reader without loading it whole.
///
/// At most one part's encoded bytes are buffered at a time. The only error
/// is an I/O failure of the underlying reader.
#[instrument(skip(reader), fields(parts))]
pub fn decode_reader<R: Read>(reader: R) -> Result<WebArchive> {
    let mut reader = BufReader::new(reader);

    let mut header_block = Vec::new();
    loop {
        let start = header_block.len();
        let read = reader.read_until(b'\n', &mut header_block).or_raise(|| ErrorKind::Io)?;
        if read == 0 {
            tracing::debug!("archive has no header separator");
            return Ok(WebArchive::default());
        }
        if header_block[start..].iter().all(|b| *b == b'\r' || *b == b'\n') {
            header_block.truncate(start);
            break;
        }
    }
    let (headers, boundary) = with_boundary(parse_headers(&header_block));
    let Some(boundary) = boundary else {
        tracing::warn!("archive has no boundary, no parts decoded");
        return Ok(WebArchive::new(headers, Vec::new()));
    };

    let kmp = Kmp::new(format!("--{boundary}"));
    let mut matcher = kmp.matcher();
    let mut parts = Vec::new();
    let mut segment = Vec::new();
    'scan: loop {
        let chunk = reader.fill_buf().or_raise(|| ErrorKind::Io)?;
        if chunk.is_empty() {
            let _ = accept(&segment, &mut parts);
            break;
        }
        let consumed = chunk.len();
        for byte in chunk {
            segment.push(*byte);
            if matcher.push(*byte) {
                segment.truncate(segment.len() - kmp.len());
                if accept(&segment, &mut parts).is_break() {
                    break 'scan;
                }
                segment.clear();
            }
        }
        reader.consume(consumed);
    }

    tracing::Span::current().record("parts", parts.len());
    Ok(WebArchive::new(headers, parts))
}
