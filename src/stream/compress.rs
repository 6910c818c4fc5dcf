use super::chunk_emitter::ChunkEmitter;
use crate::errors::AppResult;
use flate2::read::GzEncoder;
use flate2::{Compression, GzBuilder};
use std::io::Read;
use tracing::debug;

/// Gzip-compresses `input` and hands the compressed stream to `sink` in
/// numbered chunks of at most `chunk_size` bytes.
///
/// The encoder is pulled by the chunk emitter on the calling thread, so no
/// writer task or pipe is involved: when this returns, the compressed stream
/// is complete and every chunk has been delivered. `name` is stored in the
/// gzip header.
pub fn gzip_chunks<R, F>(name: &str, input: R, chunk_size: usize, sink: F) -> AppResult<u32>
where
    R: Read,
    F: FnMut(u32, &[u8]) -> AppResult<()>,
{
    let emitter = ChunkEmitter::new(chunk_size)?;
    let mut encoder: GzEncoder<R> = GzBuilder::new()
        .filename(name)
        .read(input, Compression::default());

    let chunks = emitter.emit_bytes(&mut encoder, sink)?;
    debug!(name = name, chunks = chunks, "Compressed stream");
    Ok(chunks)
}
