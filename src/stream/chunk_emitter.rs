use super::decode::TextDecoder;
use crate::constants::READ_BUFFER_SIZE;
use crate::errors::{AppError, AppResult};
use encoding_rs::Encoding;
use std::io::{ErrorKind, Read};

/// Splits one continuous stream into consecutively numbered chunks of at most
/// `chunk_size` elements.
///
/// Chunks are handed to a callback as soon as they fill; the callback receives
/// the chunk index (starting at 0) and the valid part of the reused buffer.
/// An empty stream produces no chunk, and a non-empty remainder is delivered
/// once at the end with its actual length.
#[derive(Debug, Clone, Copy)]
pub struct ChunkEmitter {
    chunk_size: usize,
}

impl ChunkEmitter {
    pub fn new(chunk_size: usize) -> AppResult<Self> {
        if chunk_size == 0 {
            return Err(AppError::InvalidInput(
                "Chunk size must be greater than 0".into(),
            ));
        }
        Ok(Self { chunk_size })
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Splits `reader` into chunks of `chunk_size` bytes.
    ///
    /// Returns the number of chunks delivered.
    pub fn emit_bytes<R, F>(&self, reader: &mut R, mut sink: F) -> AppResult<u32>
    where
        R: Read + ?Sized,
        F: FnMut(u32, &[u8]) -> AppResult<()>,
    {
        let mut buf = vec![0u8; self.chunk_size];
        let mut filled = 0;
        let mut index = 0u32;

        loop {
            let n = match reader.read(&mut buf[filled..]) {
                Ok(n) => n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            };
            if n == 0 {
                break;
            }
            filled += n;
            if filled == self.chunk_size {
                sink(index, &buf)?;
                index += 1;
                filled = 0;
            }
        }

        if filled > 0 {
            sink(index, &buf[..filled])?;
            index += 1;
        }
        Ok(index)
    }

    /// Decodes `reader` as `encoding` and splits the text into chunks of
    /// `chunk_size` characters.
    ///
    /// Malformed sequences are replaced with U+FFFD. Returns the number of
    /// chunks delivered.
    pub fn emit_chars<R, F>(
        &self,
        reader: &mut R,
        encoding: &'static Encoding,
        sink: F,
    ) -> AppResult<u32>
    where
        R: Read + ?Sized,
        F: FnMut(u32, &str) -> AppResult<()>,
    {
        let mut raw = vec![0u8; READ_BUFFER_SIZE];
        let mut decoder = TextDecoder::new(encoding);
        let mut chunker = CharChunker {
            chunk_size: self.chunk_size,
            buf: String::new(),
            count: 0,
            index: 0,
            sink,
            failure: None,
        };

        loop {
            let n = match reader.read(&mut raw) {
                Ok(n) => n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            };
            if n == 0 {
                break;
            }
            decoder.decode(&raw[..n], |c| chunker.push(c));
            if let Some(e) = chunker.failure.take() {
                return Err(e);
            }
        }
        decoder.finish(|c| chunker.push(c));
        if let Some(e) = chunker.failure.take() {
            return Err(e);
        }

        chunker.flush()?;
        Ok(chunker.index)
    }
}

struct CharChunker<F> {
    chunk_size: usize,
    buf: String,
    count: usize,
    index: u32,
    sink: F,
    failure: Option<AppError>,
}

impl<F> CharChunker<F>
where
    F: FnMut(u32, &str) -> AppResult<()>,
{
    fn push(&mut self, c: char) {
        if self.failure.is_some() {
            return;
        }
        self.buf.push(c);
        self.count += 1;
        if self.count == self.chunk_size {
            if let Err(e) = self.flush() {
                self.failure = Some(e);
            }
        }
    }

    fn flush(&mut self) -> AppResult<()> {
        if self.count == 0 {
            return Ok(());
        }
        (self.sink)(self.index, &self.buf)?;
        self.index += 1;
        self.buf.clear();
        self.count = 0;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    /// Hands out at most one byte per read call.
    struct Trickle<'a>(&'a [u8]);

    impl Read for Trickle<'_> {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            if self.0.is_empty() || buf.is_empty() {
                return Ok(0);
            }
            buf[0] = self.0[0];
            self.0 = &self.0[1..];
            Ok(1)
        }
    }

    fn collect_bytes<R: Read>(mut reader: R, chunk_size: usize) -> Vec<(u32, Vec<u8>)> {
        let mut chunks = Vec::new();
        ChunkEmitter::new(chunk_size)
            .unwrap()
            .emit_bytes(&mut reader, |index, data| {
                chunks.push((index, data.to_vec()));
                Ok(())
            })
            .unwrap();
        chunks
    }

    fn lengths(chunks: &[(u32, Vec<u8>)]) -> Vec<usize> {
        chunks.iter().map(|(_, c)| c.len()).collect()
    }

    #[test]
    fn empty_input_delivers_nothing() {
        assert!(collect_bytes(Cursor::new(b""), 5).is_empty());
    }

    #[test]
    fn short_input_is_one_partial_chunk() {
        let chunks = collect_bytes(Cursor::new(b"123"), 5);
        assert_eq!(chunks, vec![(0, b"123".to_vec())]);
    }

    #[test]
    fn long_input_fills_chunks_then_remainder() {
        let chunks = collect_bytes(Cursor::new(b"123456789012345678901234"), 5);
        assert_eq!(lengths(&chunks), vec![5, 5, 5, 5, 4]);
        let indexes: Vec<u32> = chunks.iter().map(|(i, _)| *i).collect();
        assert_eq!(indexes, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn exact_multiple_has_no_trailing_chunk() {
        let chunks = collect_bytes(Cursor::new(b"1234567890"), 5);
        assert_eq!(lengths(&chunks), vec![5, 5]);
    }

    #[test]
    fn short_reads_still_fill_whole_chunks() {
        let input = b"abcdefghijklm";
        let chunks = collect_bytes(Trickle(input), 4);
        assert_eq!(lengths(&chunks), vec![4, 4, 4, 1]);
        let joined: Vec<u8> = chunks.into_iter().flat_map(|(_, c)| c).collect();
        assert_eq!(joined, input);
    }

    #[test]
    fn concatenated_chunks_reproduce_input() {
        let input: Vec<u8> = (0..=255u8).cycle().take(1000).collect();
        for chunk_size in [1, 2, 7, 64, 999, 1000, 1001] {
            let chunks = collect_bytes(Cursor::new(&input), chunk_size);
            assert!(chunks.iter().all(|(_, c)| c.len() <= chunk_size));
            let joined: Vec<u8> = chunks.into_iter().flat_map(|(_, c)| c).collect();
            assert_eq!(joined, input, "chunk size {chunk_size}");
        }
    }

    #[test]
    fn zero_chunk_size_is_rejected() {
        assert!(ChunkEmitter::new(0).is_err());
    }

    #[test]
    fn sink_error_stops_emission() {
        let mut calls = 0;
        let result = ChunkEmitter::new(2).unwrap().emit_bytes(
            &mut Cursor::new(b"abcdef"),
            |_, _| {
                calls += 1;
                Err(AppError::OutputError("sink full".into()))
            },
        );
        assert!(result.is_err());
        assert_eq!(calls, 1);
    }

    #[test]
    fn char_chunks_count_characters_not_bytes() {
        let text = "äöüßxy";
        let mut chunks = Vec::new();
        let delivered = ChunkEmitter::new(4)
            .unwrap()
            .emit_chars(&mut Cursor::new(text.as_bytes()), encoding_rs::UTF_8, |index, data| {
                chunks.push((index, data.to_string()));
                Ok(())
            })
            .unwrap();
        assert_eq!(delivered, 2);
        assert_eq!(
            chunks,
            vec![(0, "äöüß".to_string()), (1, "xy".to_string())]
        );
    }

    #[test]
    fn char_chunks_of_empty_input() {
        let delivered = ChunkEmitter::new(3)
            .unwrap()
            .emit_chars(&mut Cursor::new(b""), encoding_rs::UTF_8, |_, _| Ok(()))
            .unwrap();
        assert_eq!(delivered, 0);
    }

    #[test]
    fn char_chunks_of_latin1_input() {
        let mut chunks = Vec::new();
        ChunkEmitter::new(2)
            .unwrap()
            .emit_chars(&mut Trickle(b"\xe4\xf6\xfc"), encoding_rs::WINDOWS_1252, |_, data| {
                chunks.push(data.to_string());
                Ok(())
            })
            .unwrap();
        assert_eq!(chunks, vec!["äö", "ü"]);
    }
}
