use super::{find_blank_line, is_blank, parse_headers, parse_part, with_boundary};
use crate::model::WebArchive;
use tracing::instrument;

/// Decode an archive held entirely in memory as text.
///
/// Never fails: input without a header/body separator decodes to an empty
/// archive, and input without a boundary decodes to its headers alone.
#[instrument(skip(input), fields(input_size = input.len(), parts))]
pub fn decode_str(input: &str) -> WebArchive {
    let Some((header_end, body_start)) = find_blank_line(input.as_bytes()) else {
        tracing::debug!("archive has no header separator");
        return WebArchive::default();
    };
    let (headers, boundary) = with_boundary(parse_headers(&input.as_bytes()[..header_end]));
    let Some(boundary) = boundary else {
        tracing::warn!("archive has no boundary, no parts decoded");
        return WebArchive::new(headers, Vec::new());
    };

    let marker = format!("--{boundary}");
    let parts: Vec<_> = input[body_start..]
        .split(marker.as_str())
        .filter(|segment| !is_blank(segment.as_bytes()))
        .take_while(|segment| !segment.starts_with("--"))
        .filter_map(|segment| parse_part(segment.as_bytes()))
        .collect();

    tracing::Span::current().record("parts", parts.len());
    WebArchive::new(headers, parts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encode::encode_to_string;
    use crate::keys;
    use crate::model::{ArchivePart, PartKind};

    #[test]
    fn round_trip() {
        let parts = vec![
            ArchivePart::resource("/runtime/app.js", "text/javascript", "let a = 1;"),
            ArchivePart::resource("https://cdn.example.com/font.woff2", "font/woff2", vec![0u8, 1, 2, 255]),
            ArchivePart::document("https://example.com/paywall", "text/html", "<html></html>"),
        ];
        let text = encode_to_string("https://example.com/paywall", &parts).unwrap();
        let archive = decode_str(&text);

        // The document is stored first.
        assert_eq!(archive.parts().len(), 3);
        assert_eq!(archive.parts()[0], parts[2]);
        assert_eq!(archive.parts()[1], parts[0]);
        assert_eq!(archive.parts()[2], parts[1]);
        assert_eq!(archive.snapshot_location(), Some("https://example.com/paywall"));
        assert_eq!(archive.boundary(), Some(crate::encode::boundary(&parts).as_str()));
    }

    #[test]
    fn missing_boundary_keeps_headers() {
        let archive = decode_str("Subject: nothing\r\nContent-Type: text/html\r\n\r\n--x\r\n");
        assert!(archive.is_empty());
        assert_eq!(archive.header(keys::SUBJECT), Some("nothing"));
        assert_eq!(archive.boundary(), None);
    }

    #[test]
    fn no_separator_is_empty() {
        let archive = decode_str("this is not an archive");
        assert!(archive.is_empty());
        assert!(archive.headers().is_empty());
    }

    #[test]
    fn handwritten_archive_with_plain_text_body() {
        let input = "Content-Type: multipart/related; boundary=\"b\"\n\
                     \n\
                     --b\n\
                     Content-Type: text/html\n\
                     Content-Location: https://example.com/\n\
                     Content-Id: <mainDocument>\n\
                     \n\
                     <p>plain html</p>\n\
                     --b\n\
                     Content-Type: text/css\n\
                     \n\
                     body {}\n\
                     --b--\n";
        let archive = decode_str(input);
        assert_eq!(archive.parts().len(), 1);
        let document = archive.document().unwrap();
        assert_eq!(document.kind, PartKind::Document);
        assert_eq!(document.content, b"<p>plain html</p>");
    }
}
