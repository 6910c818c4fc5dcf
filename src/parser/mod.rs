mod file_finder;
mod parquet_writer;
mod sanitize;
mod scope;
mod xml_parser;

// Re-export public API
pub use file_finder::{find_documents, find_partitions};
pub use parquet_writer::{chunks_to_dataframe, rows_to_dataframe, write_parquet, FrameAccumulator};
pub use sanitize::{replace_invalid, SanitizingReader};
pub use scope::{FilterItem, FilterLists, Frame, ScopeFilter, StructureError};
pub use xml_parser::{FlattenSummary, XmlFlattener};
