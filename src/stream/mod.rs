mod chunk_emitter;
mod compress;
mod decode;
mod row_stream;

// Re-export public API
pub use chunk_emitter::ChunkEmitter;
pub use compress::gzip_chunks;
pub use decode::{declared_encoding, encoding_for_label, TextDecoder};
pub use row_stream::RowStreamReader;

pub(crate) use decode::declaration_pending;
