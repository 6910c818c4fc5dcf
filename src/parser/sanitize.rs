use crate::constants::{DECLARATION_SCAN_LIMIT, INVALID_CHAR_REPLACEMENT, READ_BUFFER_SIZE};
use crate::stream::{declaration_pending, declared_encoding, TextDecoder};
use encoding_rs::Encoding;
use std::io::{self, Read};
use tracing::trace;

/// Maps characters XML 1.0 does not allow to `?`.
///
/// Allowed: tab, line feed, carriage return, U+0020..=U+D7FF,
/// U+E000..=U+FFFD and U+10000..=U+10FFFF.
pub fn replace_invalid(c: char) -> char {
    match c {
        '\u{9}' | '\u{A}' | '\u{D}' => c,
        '\u{20}'..='\u{D7FF}' | '\u{E000}'..='\u{FFFD}' | '\u{10000}'..='\u{10FFFF}' => c,
        _ => INVALID_CHAR_REPLACEMENT,
    }
}

/// Reader adapter that decodes the wrapped stream, passes every character
/// through [`replace_invalid`] and re-encodes the result as UTF-8.
///
/// The source encoding is the one given, otherwise the one named by the XML
/// declaration, otherwise UTF-8. A byte order mark wins over all three.
///
/// Only borrows the wrapped stream, so dropping the adapter leaves the caller's
/// reader open and usable.
pub struct SanitizingReader<'a, R: Read + ?Sized> {
    inner: &'a mut R,
    encoding: Option<&'static Encoding>,
    decoder: Option<TextDecoder>,
    raw: Vec<u8>,
    out: Vec<u8>,
    pos: usize,
    eof: bool,
}

fn push_sanitized(out: &mut Vec<u8>, c: char) {
    let mut utf8 = [0u8; 4];
    out.extend_from_slice(replace_invalid(c).encode_utf8(&mut utf8).as_bytes());
}

impl<'a, R: Read + ?Sized> SanitizingReader<'a, R> {
    pub fn new(inner: &'a mut R, encoding: Option<&'static Encoding>) -> Self {
        Self {
            inner,
            encoding,
            decoder: None,
            raw: vec![0u8; READ_BUFFER_SIZE],
            out: Vec::with_capacity(READ_BUFFER_SIZE),
            pos: 0,
            eof: false,
        }
    }

    fn read_raw(&mut self) -> io::Result<usize> {
        loop {
            match self.inner.read(&mut self.raw) {
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                result => return result,
            }
        }
    }

    /// Reads far enough to see an XML declaration, then sets up the decoder.
    fn start(&mut self) -> io::Result<TextDecoder> {
        let mut head = Vec::new();
        if self.encoding.is_none() {
            while declaration_pending(&head) && head.len() < DECLARATION_SCAN_LIMIT {
                let n = self.read_raw()?;
                if n == 0 {
                    self.eof = true;
                    break;
                }
                head.extend_from_slice(&self.raw[..n]);
            }
        }

        let encoding = self
            .encoding
            .or_else(|| declared_encoding(&head))
            .unwrap_or(encoding_rs::UTF_8);
        trace!(encoding = encoding.name(), "Decoding document");

        let mut decoder = TextDecoder::new(encoding);
        let out = &mut self.out;
        decoder.decode(&head, |c| push_sanitized(out, c));
        if self.eof {
            decoder.finish(|c| push_sanitized(out, c));
        }
        Ok(decoder)
    }

    fn refill(&mut self) -> io::Result<()> {
        self.out.clear();
        self.pos = 0;
        let mut decoder = match self.decoder.take() {
            Some(decoder) => decoder,
            None => self.start()?,
        };
        while self.out.is_empty() && !self.eof {
            let n = match self.read_raw() {
                Ok(n) => n,
                Err(e) => {
                    self.decoder = Some(decoder);
                    return Err(e);
                }
            };
            let out = &mut self.out;
            if n == 0 {
                self.eof = true;
                decoder.finish(|c| push_sanitized(out, c));
            } else {
                decoder.decode(&self.raw[..n], |c| push_sanitized(out, c));
            }
        }
        self.decoder = Some(decoder);
        Ok(())
    }
}

impl<R: Read + ?Sized> Read for SanitizingReader<'_, R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        if self.pos == self.out.len() {
            self.refill()?;
        }
        let n = (self.out.len() - self.pos).min(buf.len());
        buf[..n].copy_from_slice(&self.out[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }
}
