// Full path handling
pub const PATH_SEPARATOR: char = '/';

// Replacement for characters XML 1.0 does not allow
pub const INVALID_CHAR_REPLACEMENT: char = '?';

// Chunking defaults
pub const DEFAULT_CHUNK_SIZE: usize = 16 * 1024 * 1024;
pub const DEFAULT_BATCH_SIZE: usize = 64;

// Read buffer used between the sanitizer and the XML reader
pub const READ_BUFFER_SIZE: usize = 8 * 1024;

// How far into a document an XML declaration is looked for
pub const DECLARATION_SCAN_LIMIT: usize = 1024;

// Output row kinds
pub const KIND_TAG: &str = "T";
pub const KIND_ATTRIBUTE: &str = "A";

// File extensions picked up when scanning an input directory
pub const XML_EXTENSIONS: &[&str] = &["xml", "atom"];
pub const ZIP_EXTENSIONS: &[&str] = &["zip"];
pub const GZIP_EXTENSIONS: &[&str] = &["gz", "gzip"];
