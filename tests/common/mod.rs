//! Common test utilities for integration tests

use flate2::write::GzEncoder;
use flate2::Compression;
use polars::prelude::*;
use std::fs;
use std::io::Write;
use std::path::Path;

/// Helper function to create a test file, creating parent directories
#[allow(dead_code)]
pub fn create_test_file(path: &Path, content: &[u8]) {
    let parent = path.parent().unwrap();
    fs::create_dir_all(parent).unwrap();
    fs::File::create(path).unwrap().write_all(content).unwrap();
}

/// Helper function to create a test ZIP file with specified files.
/// Names ending in `/` become directory entries.
#[allow(dead_code)]
pub fn create_test_zip(
    zip_path: &Path,
    files: &[(&str, &str)],
) -> Result<(), Box<dyn std::error::Error>> {
    use zip::write::FileOptions;
    use zip::ZipWriter;

    fs::create_dir_all(zip_path.parent().unwrap())?;
    let file = fs::File::create(zip_path)?;
    let mut zip = ZipWriter::new(file);
    let options = FileOptions::default().compression_method(zip::CompressionMethod::Deflated);

    for (name, content) in files {
        if name.ends_with('/') {
            zip.add_directory(*name, options)?;
        } else {
            zip.start_file(*name, options)?;
            zip.write_all(content.as_bytes())?;
        }
    }

    zip.finish()?;
    Ok(())
}

#[allow(dead_code)]
pub fn gzip(data: &[u8]) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

#[allow(dead_code)]
pub fn read_parquet(path: &Path) -> DataFrame {
    let file = fs::File::open(path).unwrap();
    ParquetReader::new(file).finish().unwrap()
}

/// String column as owned values, nulls as empty strings
#[allow(dead_code)]
pub fn strings(df: &DataFrame, column: &str) -> Vec<String> {
    df.column(column)
        .unwrap()
        .str()
        .unwrap()
        .into_iter()
        .map(|v| v.unwrap_or("").to_string())
        .collect()
}

#[allow(dead_code)]
pub fn binaries(df: &DataFrame, column: &str) -> Vec<Vec<u8>> {
    df.column(column)
        .unwrap()
        .binary()
        .unwrap()
        .into_iter()
        .map(|v| v.unwrap_or(&[]).to_vec())
        .collect()
}

/// Two-level sample tree: `A{A1,A2}` and `B{B1{B1a,B1b}}`, with one attribute on `A`.
/// Flattened without filters it yields 9 rows.
#[allow(dead_code)]
pub const SAMPLE_XML: &str = r#"<?xml version="1.0"?><root><A a1="x"><A1>a1</A1><A2>a2</A2></A><B><B1><B1a>1</B1a><B1b>2</B1b></B1></B></root>"#;

#[allow(dead_code)]
pub const SAMPLE_ROWS: usize = 9;

/// Sample Atom feed with two entries
#[allow(dead_code)]
pub const SAMPLE_FEED: &str = r#"<?xml version="1.0"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <entry>
    <id>test-id-1</id>
    <title>Test Title 1</title>
    <link href="http://example.com/1"/>
  </entry>
  <entry>
    <id>test-id-2</id>
    <title>Test Title 2</title>
  </entry>
</feed>"#;

/// Unclosed element
#[allow(dead_code)]
pub const MALFORMED_XML: &str = "<root><A>text</root>";
