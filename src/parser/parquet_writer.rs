use crate::errors::{AppError, AppResult};
use crate::models::{ArchiveEntry, ChunkContent, ContentChunk, OutputRow};
use polars::prelude::*;
use std::fs::{self as std_fs, File};
use std::path::Path;
use std::sync::Arc;

/// ZIP entry metadata columns, null where a row did not come from an archive.
#[derive(Default)]
struct EntryColumns {
    file: Vec<Option<String>>,
    time: Vec<Option<String>>,
    size: Vec<Option<u64>>,
    compressed_size: Vec<Option<u64>>,
    is_directory: Vec<Option<bool>>,
    method: Vec<Option<u32>>,
    crc: Vec<Option<u32>>,
    comment: Vec<Option<String>>,
}

impl EntryColumns {
    fn with_capacity(len: usize) -> Self {
        Self {
            file: Vec::with_capacity(len),
            time: Vec::with_capacity(len),
            size: Vec::with_capacity(len),
            compressed_size: Vec::with_capacity(len),
            is_directory: Vec::with_capacity(len),
            method: Vec::with_capacity(len),
            crc: Vec::with_capacity(len),
            comment: Vec::with_capacity(len),
        }
    }

    fn push(&mut self, entry: Option<&Arc<ArchiveEntry>>) {
        let entry = entry.map(Arc::as_ref);
        self.file.push(entry.map(|e| e.name.clone()));
        self.time.push(entry.and_then(|e| e.modified.clone()));
        self.size.push(entry.map(|e| e.size));
        self.compressed_size.push(entry.map(|e| e.compressed_size));
        self.is_directory.push(entry.map(|e| e.is_dir));
        self.method.push(entry.map(|e| u32::from(e.method)));
        self.crc.push(entry.map(|e| e.crc32));
        self.comment.push(entry.and_then(|e| e.comment.clone()));
    }

    fn into_series(self) -> Vec<Series> {
        vec![
            Series::new("file", self.file),
            Series::new("time", self.time),
            Series::new("size", self.size),
            Series::new("compressed_size", self.compressed_size),
            Series::new("is_directory", self.is_directory),
            Series::new("method", self.method),
            Series::new("crc", self.crc),
            Series::new("comment", self.comment),
        ]
    }
}

/// Converts flattened rows into a DataFrame.
///
/// An empty input yields a frame with the full schema and no rows.
pub fn rows_to_dataframe(rows: Vec<OutputRow>) -> AppResult<DataFrame> {
    let len = rows.len();
    let mut documents = Vec::with_capacity(len);
    let mut include_parents = Vec::with_capacity(len);
    let mut include_counts = Vec::with_capacity(len);
    let mut full_paths = Vec::with_capacity(len);
    let mut uris = Vec::with_capacity(len);
    let mut local_names = Vec::with_capacity(len);
    let mut qualified_names = Vec::with_capacity(len);
    let mut kinds = Vec::with_capacity(len);
    let mut values = Vec::with_capacity(len);
    let mut ids = Vec::with_capacity(len);
    let mut first_sub_ids = Vec::with_capacity(len);
    let mut entries = EntryColumns::with_capacity(len);

    for out in rows {
        entries.push(out.entry.as_ref());
        let row = out.row;
        documents.push(out.document);
        include_parents.push(row.include_parent);
        include_counts.push(row.include_count);
        full_paths.push(row.full_path);
        uris.push(row.uri);
        local_names.push(row.local_name);
        qualified_names.push(row.qualified_name);
        kinds.push(row.kind.code());
        values.push(row.value);
        ids.push(row.id);
        first_sub_ids.push(row.first_sub_id);
    }

    let mut columns = vec![
        Series::new("document", documents),
        Series::new("includeparent", include_parents),
        Series::new("includecount", include_counts),
        Series::new("fullpath", full_paths),
        Series::new("uri", uris),
        Series::new("localname", local_names),
        Series::new("qname", qualified_names),
        Series::new("type", kinds),
        Series::new("value", values),
        Series::new("id", ids),
        Series::new("first_sub_id", first_sub_ids),
    ];
    columns.extend(entries.into_series());

    DataFrame::new(columns)
        .map_err(|e| AppError::OutputError(format!("Failed to create DataFrame: {e}")))
}

/// Converts content chunks into a DataFrame.
///
/// The `content` column is a UTF-8 string column when `text` is set and a
/// binary column otherwise. The ZIP entry columns are only written when
/// `with_entries` is set.
pub fn chunks_to_dataframe(
    chunks: Vec<ContentChunk>,
    text: bool,
    with_entries: bool,
) -> AppResult<DataFrame> {
    let len = chunks.len();
    let mut documents = Vec::with_capacity(len);
    let mut indexes = Vec::with_capacity(len);
    let mut texts: Vec<String> = Vec::new();
    let mut bytes: Vec<Vec<u8>> = Vec::new();
    let mut entries = EntryColumns::with_capacity(len);

    for chunk in chunks {
        entries.push(chunk.entry.as_ref());
        documents.push(chunk.document);
        indexes.push(chunk.chunk);
        match (chunk.content, text) {
            (ChunkContent::Text(t), true) => texts.push(t),
            (ChunkContent::Bytes(b), true) => texts.push(String::from_utf8_lossy(&b).into_owned()),
            (ChunkContent::Text(t), false) => bytes.push(t.into_bytes()),
            (ChunkContent::Bytes(b), false) => bytes.push(b),
        }
    }

    let content = if text {
        Series::new("content", texts)
    } else {
        let slices: Vec<&[u8]> = bytes.iter().map(Vec::as_slice).collect();
        Series::new("content", slices)
    };

    let mut columns = vec![Series::new("document", documents)];
    if with_entries {
        columns.extend(entries.into_series());
    }
    columns.push(Series::new("chunk", indexes));
    columns.push(content);

    DataFrame::new(columns)
        .map_err(|e| AppError::OutputError(format!("Failed to create DataFrame: {e}")))
}

/// Collects DataFrame batches and writes them as one Parquet file.
#[derive(Default)]
pub struct FrameAccumulator {
    df: Option<DataFrame>,
}

impl FrameAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, batch: DataFrame) -> AppResult<()> {
        if batch.height() == 0 {
            return Ok(());
        }
        self.df = Some(match self.df.take() {
            Some(existing) => existing.vstack(&batch).map_err(|e| {
                AppError::OutputError(format!("Failed to concatenate DataFrames: {e}"))
            })?,
            None => batch,
        });
        Ok(())
    }

    pub fn height(&self) -> usize {
        self.df.as_ref().map_or(0, DataFrame::height)
    }

    /// Writes everything collected so far, or `empty` if nothing was pushed.
    ///
    /// Returns the size of the written file in bytes.
    pub fn finish(self, path: &Path, empty: DataFrame) -> AppResult<u64> {
        let mut df = self.df.unwrap_or(empty);
        write_parquet(path, &mut df)
    }
}

/// Writes `df` to `path`, creating parent directories as needed.
///
/// Returns the size of the written file in bytes.
pub fn write_parquet(path: &Path, df: &mut DataFrame) -> AppResult<u64> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std_fs::create_dir_all(parent)
            .map_err(|e| AppError::IoError(format!("Failed to create output directory: {e}")))?;
    }

    let mut file = File::create(path).map_err(|e| {
        AppError::IoError(format!("Failed to create Parquet file {path:?}: {e}"))
    })?;

    ParquetWriter::new(&mut file)
        .finish(df)
        .map_err(|e| AppError::OutputError(format!("Failed to write Parquet file: {e}")))?;

    let metadata = std_fs::metadata(path).map_err(|e| {
        AppError::IoError(format!("Failed to read Parquet file metadata {path:?}: {e}"))
    })?;
    Ok(metadata.len())
}
