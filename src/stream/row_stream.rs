use std::io::{self, BufRead, Read};

/// Presents an ordered sequence of transport chunks as one continuous stream.
///
/// Each item of the source is either absent (`None`) or a block of bytes or
/// text. Absent and empty chunks are skipped; end of stream is reported only
/// once the source is exhausted. The reader performs no decoding, so any
/// decompression has to wrap it.
///
/// Construction pulls the first present chunk, so at most one chunk is held in
/// memory at a time.
///
/// A failing source stays failed: every later read returns the same error and
/// never a clean end of stream. Bytes already copied by a read are returned
/// first and the error surfaces on the next call.
pub struct RowStreamReader<I, C> {
    chunks: I,
    current: Option<C>,
    pos: usize,
    state: SourceState,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum SourceState {
    Open,
    Exhausted,
    Failed(io::ErrorKind, String),
}

impl<I, C> RowStreamReader<I, C>
where
    I: Iterator<Item = io::Result<Option<C>>>,
    C: AsRef<[u8]>,
{
    pub fn new<S>(chunks: S) -> io::Result<Self>
    where
        S: IntoIterator<IntoIter = I>,
    {
        let mut reader = Self {
            chunks: chunks.into_iter(),
            current: None,
            pos: 0,
            state: SourceState::Open,
        };
        reader.advance()?;
        Ok(reader)
    }

    /// Reads a single byte, or `None` at end of stream.
    pub fn read_byte(&mut self) -> io::Result<Option<u8>> {
        let byte = self.fill_buf()?.first().copied();
        if byte.is_some() {
            self.consume(1);
        }
        Ok(byte)
    }

    fn remaining(&self) -> usize {
        self.current
            .as_ref()
            .map_or(0, |c| c.as_ref().len() - self.pos)
    }

    // Moves to the next present, non-empty chunk. The current chunk is only
    // replaced once its successor is known.
    fn advance(&mut self) -> io::Result<()> {
        loop {
            match &self.state {
                SourceState::Open => {}
                SourceState::Exhausted => return Ok(()),
                SourceState::Failed(kind, message) => {
                    return Err(io::Error::new(*kind, message.clone()));
                }
            }
            match self.chunks.next() {
                None => {
                    self.state = SourceState::Exhausted;
                    self.current = None;
                    self.pos = 0;
                    return Ok(());
                }
                Some(Err(e)) => {
                    // Readers retry on Interrupted, which would turn a failed
                    // source into an endless loop or a silent gap
                    let kind = match e.kind() {
                        io::ErrorKind::Interrupted => io::ErrorKind::Other,
                        kind => kind,
                    };
                    self.state = SourceState::Failed(kind, format!("chunk source failed: {e}"));
                }
                Some(Ok(Some(chunk))) if !chunk.as_ref().is_empty() => {
                    self.current = Some(chunk);
                    self.pos = 0;
                    return Ok(());
                }
                Some(Ok(_)) => {}
            }
        }
    }
}

impl<I, C> BufRead for RowStreamReader<I, C>
where
    I: Iterator<Item = io::Result<Option<C>>>,
    C: AsRef<[u8]>,
{
    fn fill_buf(&mut self) -> io::Result<&[u8]> {
        while self.remaining() == 0 {
            if self.state == SourceState::Exhausted {
                return Ok(&[]);
            }
            self.advance()?;
        }
        Ok(self
            .current
            .as_ref()
            .map_or(&[][..], |c| &c.as_ref()[self.pos..]))
    }

    fn consume(&mut self, amt: usize) {
        self.pos += amt.min(self.remaining());
    }
}

impl<I, C> Read for RowStreamReader<I, C>
where
    I: Iterator<Item = io::Result<Option<C>>>,
    C: AsRef<[u8]>,
{
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut written = 0;
        while written < buf.len() {
            let available = match self.fill_buf() {
                Ok(available) => available,
                // The failure is kept and reported by the next call
                Err(_) if written > 0 => break,
                Err(e) => return Err(e),
            };
            if available.is_empty() {
                break;
            }
            let n = available.len().min(buf.len() - written);
            buf[written..written + n].copy_from_slice(&available[..n]);
            self.consume(n);
            written += n;
        }
        Ok(written)
    }
}
