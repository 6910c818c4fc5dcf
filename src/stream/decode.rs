use crate::errors::{AppError, AppResult};
use encoding_rs::{CoderResult, Decoder, Encoding};

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";
const DECLARATION_START: &[u8] = b"<?xml";

/// Looks up a character encoding by any of its WHATWG labels
/// (`utf-8`, `latin1`, `ISO-8859-1`, `windows-1252`, `utf-16le`, ...).
pub fn encoding_for_label(label: &str) -> AppResult<&'static Encoding> {
    Encoding::for_label(label.as_bytes())
        .ok_or_else(|| AppError::InvalidInput(format!("Unknown encoding: {label}")))
}

/// Reads the `encoding` pseudo-attribute of an XML declaration at the start
/// of `head`.
///
/// Only ASCII-compatible encodings count: a document whose declaration can be
/// read byte by byte cannot be UTF-16, whatever it claims.
pub fn declared_encoding(head: &[u8]) -> Option<&'static Encoding> {
    let head = head.strip_prefix(UTF8_BOM).unwrap_or(head);
    let decl = head.strip_prefix(DECLARATION_START)?;
    let decl = &decl[..find(decl, b"?>").unwrap_or(decl.len())];

    let at = find(decl, b"encoding")?;
    let rest = trim_start(&decl[at + b"encoding".len()..]);
    let rest = trim_start(rest.strip_prefix(b"=")?);
    let (&quote, rest) = rest.split_first()?;
    if quote != b'"' && quote != b'\'' {
        return None;
    }
    let len = rest.iter().position(|&b| b == quote)?;
    Encoding::for_label(&rest[..len]).filter(|e| e.is_ascii_compatible())
}

/// True while `head` may still grow into a complete XML declaration.
pub(crate) fn declaration_pending(head: &[u8]) -> bool {
    let head = head.strip_prefix(UTF8_BOM).unwrap_or(head);
    if head.len() < DECLARATION_START.len() {
        return DECLARATION_START.starts_with(head);
    }
    head.starts_with(DECLARATION_START) && find(head, b"?>").is_none()
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

fn trim_start(bytes: &[u8]) -> &[u8] {
    let skip = bytes.iter().take_while(|b| b.is_ascii_whitespace()).count();
    &bytes[skip..]
}

/// Incremental decoder for byte streams that may split a character across
/// two reads.
///
/// A byte order mark at the start selects UTF-8 or UTF-16 regardless of the
/// requested encoding and is not passed on. Malformed sequences become
/// U+FFFD.
pub struct TextDecoder {
    decoder: Decoder,
    text: String,
}

impl TextDecoder {
    pub fn new(encoding: &'static Encoding) -> Self {
        Self {
            decoder: encoding.new_decoder(),
            text: String::new(),
        }
    }

    /// Decodes `input`, calling `each` for every complete character.
    /// A trailing incomplete sequence is kept until the next call.
    pub fn decode(&mut self, input: &[u8], each: impl FnMut(char)) {
        self.run(input, false, each);
    }

    /// Flushes a pending incomplete sequence at end of stream.
    /// The decoder must not be used afterwards.
    pub fn finish(&mut self, each: impl FnMut(char)) {
        self.run(&[], true, each);
    }

    fn run(&mut self, mut input: &[u8], last: bool, mut each: impl FnMut(char)) {
        loop {
            let needed = self
                .decoder
                .max_utf8_buffer_length(input.len())
                .unwrap_or(input.len().saturating_mul(3).saturating_add(16));
            self.text.reserve(needed);
            let (result, read, _) = self.decoder.decode_to_string(input, &mut self.text, last);
            input = &input[read..];
            self.text.chars().for_each(&mut each);
            self.text.clear();
            if result == CoderResult::InputEmpty {
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_all(encoding: &'static Encoding, parts: &[&[u8]]) -> String {
        let mut decoder = TextDecoder::new(encoding);
        let mut out = String::new();
        for part in parts {
            decoder.decode(part, |c| out.push(c));
        }
        decoder.finish(|c| out.push(c));
        out
    }

    fn utf8(parts: &[&[u8]]) -> String {
        decode_all(encoding_rs::UTF_8, parts)
    }

    #[test]
    fn ascii_passes_through() {
        assert_eq!(utf8(&[b"hello"]), "hello");
    }

    #[test]
    fn character_split_across_reads() {
        let bytes = "aé€b".as_bytes();
        // split inside the two-byte é and inside the three-byte €
        assert_eq!(utf8(&[&bytes[..2], &bytes[2..4], &bytes[4..]]), "aé€b");
    }

    #[test]
    fn invalid_bytes_are_replaced() {
        assert_eq!(utf8(&[b"a\xffb"]), "a\u{FFFD}b");
    }

    #[test]
    fn truncated_sequence_at_eof_is_replaced() {
        assert_eq!(utf8(&[b"ab\xe2\x82"]), "ab\u{FFFD}");
    }

    #[test]
    fn single_byte_encodings() {
        let latin1 = encoding_for_label("ISO-8859-1").unwrap();
        assert_eq!(decode_all(latin1, &[b"gr\xfc\xdf"]), "grüß");
        let cp1252 = encoding_for_label("windows-1252").unwrap();
        assert_eq!(decode_all(cp1252, &[b"\x80 5"]), "€ 5");
    }

    #[test]
    fn byte_order_mark_overrides_requested_encoding() {
        let latin1 = encoding_for_label("latin1").unwrap();
        assert_eq!(decode_all(latin1, &[b"\xff\xfea\x00\xe4\x00"]), "aä");
        assert_eq!(decode_all(latin1, &[b"\xef\xbb\xbf\xc3", b"\xa4"]), "ä");
    }

    #[test]
    fn large_input_is_decoded_completely() {
        let text = "äbc".repeat(50_000);
        assert_eq!(utf8(&[text.as_bytes()]), text);
    }

    #[test]
    fn unknown_label_is_rejected() {
        assert!(matches!(
            encoding_for_label("klingon-8"),
            Err(AppError::InvalidInput(_))
        ));
    }

    #[test]
    fn declared_encoding_is_read_from_declaration() {
        let found = declared_encoding(br#"<?xml version="1.0" encoding="ISO-8859-1"?><r/>"#);
        assert_eq!(found, Some(encoding_rs::WINDOWS_1252));
        let single = declared_encoding(b"\xef\xbb\xbf<?xml version='1.0' encoding = 'utf-8' ?>");
        assert_eq!(single, Some(encoding_rs::UTF_8));
    }

    #[test]
    fn declared_encoding_absent_or_unusable() {
        assert_eq!(declared_encoding(b"<?xml version=\"1.0\"?><r encoding=\"latin1\"/>"), None);
        assert_eq!(declared_encoding(b"<r/>"), None);
        assert_eq!(declared_encoding(b"<?xml version=\"1.0\" encoding=\"UTF-16\"?>"), None);
        assert_eq!(declared_encoding(b"<?xml encoding=\"no-such\"?>"), None);
    }

    #[test]
    fn declaration_pending_until_closed() {
        assert!(declaration_pending(b""));
        assert!(declaration_pending(b"<?x"));
        assert!(declaration_pending(b"<?xml version=\"1.0\" enc"));
        assert!(!declaration_pending(b"<?xml version=\"1.0\"?>"));
        assert!(!declaration_pending(b"<root>"));
    }
}
