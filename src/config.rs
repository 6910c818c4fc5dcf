use crate::constants::{DEFAULT_BATCH_SIZE, DEFAULT_CHUNK_SIZE};
use crate::errors::{AppError, AppResult};
use crate::models::InputFormat;
use crate::parser::FilterLists;
use crate::stream::encoding_for_label;
use encoding_rs::Encoding;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

/// What a run does with its input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Command {
    /// Flatten XML documents into rows
    #[default]
    Flatten,
    /// Split archive entries into numbered content chunks
    Unzip,
    /// Gzip inputs and split the result into numbered chunks
    Compress,
}

/// Pipeline settings with all values filled in.
///
/// Every field has a default, so a `[pipeline]` table only needs the keys it
/// changes.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    /// How input files are wrapped; `auto` decides per file from its extension
    pub format: InputFormat,
    /// Treat each subdirectory of the input as one document split into chunk files
    pub partitioned: bool,
    /// Maximum chunk length for `unzip` (bytes or characters) and `compress` (bytes)
    pub chunk_size: usize,
    /// Number of input files handled per parallel batch.
    /// This also bounds how many documents are in flight at once.
    pub batch_size: usize,
    /// Abort the run at the first failing document instead of skipping it
    pub stop_on_error: bool,
    /// Log progress every N documents (0 logs only the final summary)
    pub log_every: u64,
    /// Number of threads for the parsing rayon pool.
    /// When set to 0 (default), rayon picks the number of CPUs.
    pub parser_threads: usize,
    /// Decode `unzip` content as text instead of raw bytes
    pub decode_text: bool,
    /// Encoding label of the input text, e.g. `utf-8` or `ISO-8859-1`.
    /// Unset: XML documents follow their declaration and decoded `unzip`
    /// content is read as UTF-8.
    pub encoding: Option<String>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            format: InputFormat::Auto,
            partitioned: false,
            chunk_size: DEFAULT_CHUNK_SIZE,
            batch_size: DEFAULT_BATCH_SIZE,
            stop_on_error: false,
            log_every: 0,
            parser_threads: 0,
            decode_text: false,
            encoding: None,
        }
    }
}

impl PipelineConfig {
    /// Checks the values serde cannot reject on its own.
    pub fn validate(&self) -> AppResult<()> {
        if self.chunk_size == 0 {
            return Err(AppError::InvalidInput(
                "Chunk size must be greater than 0".into(),
            ));
        }
        if self.batch_size == 0 {
            return Err(AppError::InvalidInput(
                "Batch size must be greater than 0".into(),
            ));
        }
        self.source_encoding()?;
        Ok(())
    }

    /// The configured input encoding, if any.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` for a label no known encoding goes by.
    pub fn source_encoding(&self) -> AppResult<Option<&'static Encoding>> {
        self.encoding
            .as_deref()
            .map(encoding_for_label)
            .transpose()
    }
}

/// Configuration that can be loaded from a TOML file.
///
/// ```toml
/// command = "flatten"
/// input = "data/feeds"
/// output = "out/rows.parquet"
///
/// [filter]
/// include = ["entry"]
/// exclude = ["/feed/entry/summary/"]
///
/// [pipeline]
/// stop_on_error = true
/// ```
///
/// Unknown keys are rejected in every table to catch typos.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    #[serde(default)]
    pub command: Command,
    /// Input file or directory
    pub input: PathBuf,
    /// Parquet file to write
    pub output: PathBuf,
    #[serde(default)]
    pub filter: FilterLists,
    #[serde(default)]
    pub pipeline: PipelineConfig,
}

impl ConfigFile {
    /// Loads and validates configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` if the TOML is malformed, required fields are
    /// missing, unknown keys are present, or a size is not positive.
    pub fn from_toml_file(path: &Path) -> AppResult<Self> {
        let contents = fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    pub fn from_toml_str(contents: &str) -> AppResult<Self> {
        let config: ConfigFile = toml::from_str(contents)
            .map_err(|e| AppError::InvalidInput(format!("Failed to parse config: {e}")))?;
        config.pipeline.validate()?;
        Ok(config)
    }
}
