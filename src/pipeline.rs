//! Runs the commands over a set of input sources.
//!
//! A source is an input file or a partition directory. Sources are handled in
//! batches; the sources of a batch run in parallel on the rayon pool while
//! each single document is processed on one thread from start to end. Results
//! are collected in source order, so output rows keep the input order.

use crate::config::PipelineConfig;
use crate::errors::{AppError, AppResult};
use crate::extractor::for_each_entry;
use crate::models::{ArchiveEntry, ChunkContent, ContentChunk, InputFormat, OutputRow};
use crate::parser::{
    chunks_to_dataframe, find_documents, find_partitions, rows_to_dataframe, FilterLists,
    FrameAccumulator, XmlFlattener,
};
use crate::stream::{gzip_chunks, ChunkEmitter, RowStreamReader};
use crate::utils::{format_duration, mb_from_bytes, per_second, round_two_decimals};
use encoding_rs::Encoding;
use flate2::read::MultiGzDecoder;
use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use std::fs::{self, File};
use std::io::{self, BufReader, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceKind {
    File(PathBuf),
    /// Chunk files of one document, in read order
    Partition(Vec<PathBuf>),
}

/// One unit of input handed to a worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Source {
    /// Value of the `document` output column
    pub name: String,
    pub kind: SourceKind,
    /// Resolved wrapping, never `Auto`
    pub format: InputFormat,
}

/// Counters of a finished run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub documents: u64,
    pub completed: u64,
    /// Documents that failed and were left out
    pub skipped: u64,
    pub stopped_early: u64,
    /// Rows (or chunks) written
    pub rows: u64,
    pub output_bytes: u64,
    pub elapsed: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct DocumentStats {
    rows: u64,
    stopped_early: bool,
}

#[derive(Debug)]
struct DocumentOutcome {
    document: String,
    entry: Option<String>,
    result: AppResult<DocumentStats>,
}

/// Output and per-document results of one source.
struct SourceReport<T> {
    items: Vec<T>,
    outcomes: Vec<DocumentOutcome>,
    stop_on_error: bool,
}

impl<T> SourceReport<T> {
    fn new(stop_on_error: bool) -> Self {
        Self {
            items: Vec::new(),
            outcomes: Vec::new(),
            stop_on_error,
        }
    }

    /// Records how a document ended. A failure is handed back to the caller
    /// when the run stops on errors, otherwise it is kept as a skipped document.
    fn record(
        &mut self,
        document: &str,
        entry: Option<&str>,
        result: AppResult<DocumentStats>,
    ) -> AppResult<()> {
        match result {
            Err(e) if self.stop_on_error => Err(e),
            result => {
                self.outcomes.push(DocumentOutcome {
                    document: document.to_string(),
                    entry: entry.map(str::to_string),
                    result,
                });
                Ok(())
            }
        }
    }
}

struct Progress {
    summary: RunSummary,
    log_every: u64,
    started: Instant,
}

impl Progress {
    fn new(log_every: u64) -> Self {
        Self {
            summary: RunSummary::default(),
            log_every,
            started: Instant::now(),
        }
    }

    fn record(&mut self, outcome: &DocumentOutcome) {
        let summary = &mut self.summary;
        summary.documents += 1;
        match &outcome.result {
            Ok(stats) => {
                debug!(
                    document = %outcome.document,
                    entry = outcome.entry.as_deref().unwrap_or(""),
                    rows = stats.rows,
                    stopped_early = stats.stopped_early,
                    "Document completed"
                );
                summary.completed += 1;
                if stats.stopped_early {
                    summary.stopped_early += 1;
                }
            }
            Err(e) => {
                summary.skipped += 1;
                error!(
                    document = %outcome.document,
                    entry = outcome.entry.as_deref().unwrap_or(""),
                    error = %e,
                    "Document failed, skipped"
                );
            }
        }

        if self.log_every > 0 && summary.documents % self.log_every == 0 {
            let elapsed = self.started.elapsed();
            info!(
                documents = summary.documents,
                completed = summary.completed,
                skipped = summary.skipped,
                stopped_early = summary.stopped_early,
                rows = summary.rows,
                elapsed = format_duration(elapsed),
                documents_per_s = per_second(summary.documents, elapsed),
                "Progress"
            );
        }
    }

    fn add_rows(&mut self, rows: usize) {
        self.summary.rows += rows as u64;
    }

    fn finish(mut self) -> RunSummary {
        self.summary.elapsed = self.started.elapsed();
        self.summary
    }
}

/// Lists the sources below `input`.
///
/// Without `partitioned`, every document file is a source. With it, every
/// partition directory is; its format is resolved from the first chunk file.
pub fn discover_sources(input: &Path, settings: &PipelineConfig) -> AppResult<Vec<Source>> {
    if settings.partitioned {
        let sources = find_partitions(input)?
            .into_iter()
            .map(|(name, chunks)| {
                let format = settings.format.resolve(chunks.first().map_or(input, |c| c.as_path()));
                Source {
                    name,
                    kind: SourceKind::Partition(chunks),
                    format,
                }
            })
            .collect();
        return Ok(sources);
    }

    let sources = find_documents(input)?
        .into_iter()
        .map(|path| Source {
            name: document_name(input, &path),
            format: settings.format.resolve(&path),
            kind: SourceKind::File(path),
        })
        .collect();
    Ok(sources)
}

/// Flattens every XML document found below `input` into a Parquet file.
pub fn flatten(
    input: &Path,
    output: &Path,
    filter: &FilterLists,
    settings: &PipelineConfig,
) -> AppResult<RunSummary> {
    settings.validate()?;
    let template = XmlFlattener::new(filter)?;
    let encoding = settings.source_encoding()?;
    let sources = discover_sources(input, settings)?;

    let mut acc = FrameAccumulator::new();
    let mut summary = run_batches(
        &sources,
        settings,
        |source, report| flatten_source(source, &template, encoding, report),
        |rows| acc.push(rows_to_dataframe(rows)?),
    )?;
    summary.output_bytes = acc.finish(output, rows_to_dataframe(Vec::new())?)?;

    log_completed("Flatten", output, &summary);
    Ok(summary)
}

/// Splits the entries of every archive below `input` into content chunks.
///
/// Plain and gzip inputs are chunked as a single document.
pub fn unzip(input: &Path, output: &Path, settings: &PipelineConfig) -> AppResult<RunSummary> {
    settings.validate()?;
    let emitter = ChunkEmitter::new(settings.chunk_size)?;
    let encoding = settings.source_encoding()?.unwrap_or(encoding_rs::UTF_8);
    let text = settings.decode_text.then_some(encoding);
    let sources = discover_sources(input, settings)?;

    let mut acc = FrameAccumulator::new();
    let mut summary = run_batches(
        &sources,
        settings,
        |source, report| {
            for_each_document(source, |entry, content| {
                let result = chunk_document(
                    &emitter,
                    &source.name,
                    entry.as_ref(),
                    content,
                    text,
                    &mut report.items,
                );
                report.record(&source.name, entry.as_deref().map(|e| e.name.as_str()), result)
            })
        },
        |chunks| acc.push(chunks_to_dataframe(chunks, text.is_some(), true)?),
    )?;
    summary.output_bytes = acc.finish(output, chunks_to_dataframe(Vec::new(), text.is_some(), true)?)?;

    log_completed("Unzip", output, &summary);
    Ok(summary)
}

/// Gzips every input below `input` and splits the compressed streams into
/// chunks.
pub fn compress(input: &Path, output: &Path, settings: &PipelineConfig) -> AppResult<RunSummary> {
    settings.validate()?;
    let sources = discover_sources(input, settings)?;

    let mut acc = FrameAccumulator::new();
    let mut summary = run_batches(
        &sources,
        settings,
        |source, report| compress_source(source, settings.chunk_size, report),
        |chunks| acc.push(chunks_to_dataframe(chunks, false, false)?),
    )?;
    summary.output_bytes = acc.finish(output, chunks_to_dataframe(Vec::new(), false, false)?)?;

    log_completed("Compress", output, &summary);
    Ok(summary)
}

fn run_batches<T, W, S>(
    sources: &[Source],
    settings: &PipelineConfig,
    work: W,
    mut sink: S,
) -> AppResult<RunSummary>
where
    T: Send,
    W: Fn(&Source, &mut SourceReport<T>) -> AppResult<()> + Sync,
    S: FnMut(Vec<T>) -> AppResult<()>,
{
    if sources.is_empty() {
        info!("No input documents found");
    } else {
        info!(
            sources = sources.len(),
            batch_size = settings.batch_size,
            "Starting processing"
        );
    }

    let pool = thread_pool(settings.parser_threads)?;
    let mut progress = Progress::new(settings.log_every);

    for batch in sources.chunks(settings.batch_size.max(1)) {
        let process = || {
            batch
                .par_iter()
                .map(|source| {
                    let mut report = SourceReport::new(settings.stop_on_error);
                    let result = work(source, &mut report);
                    (report, result)
                })
                .collect::<Vec<_>>()
        };
        let reports = match &pool {
            Some(pool) => pool.install(process),
            None => process(),
        };

        let mut items = Vec::new();
        for (source, (report, result)) in batch.iter().zip(reports) {
            for outcome in &report.outcomes {
                progress.record(outcome);
            }
            let mut source_items = report.items;
            items.append(&mut source_items);

            if let Err(e) = result {
                if settings.stop_on_error {
                    error!(document = %source.name, error = %e, "Document failed, stopping");
                    return Err(e);
                }
                progress.record(&DocumentOutcome {
                    document: source.name.clone(),
                    entry: None,
                    result: Err(e),
                });
            }
        }
        progress.add_rows(items.len());
        sink(items)?;
    }

    Ok(progress.finish())
}

fn thread_pool(threads: usize) -> AppResult<Option<ThreadPool>> {
    if threads == 0 {
        return Ok(None);
    }
    ThreadPoolBuilder::new()
        .num_threads(threads)
        .build()
        .map(Some)
        .map_err(|e| AppError::InvalidInput(format!("Failed to build parser thread pool: {e}")))
}

fn log_completed(action: &str, output: &Path, summary: &RunSummary) {
    info!(
        documents = summary.documents,
        completed = summary.completed,
        skipped = summary.skipped,
        stopped_early = summary.stopped_early,
        rows = summary.rows,
        elapsed = format_duration(summary.elapsed),
        documents_per_s = per_second(summary.documents, summary.elapsed),
        output = %output.display(),
        output_size_mb = round_two_decimals(mb_from_bytes(summary.output_bytes)),
        "{action} completed"
    );
}

fn flatten_source(
    source: &Source,
    template: &XmlFlattener,
    encoding: Option<&'static Encoding>,
    report: &mut SourceReport<OutputRow>,
) -> AppResult<()> {
    let mut flattener = template.clone();
    for_each_document(source, |entry, content| {
        let result = flatten_document(
            &mut flattener,
            &source.name,
            entry.as_ref(),
            content,
            encoding,
            &mut report.items,
        );
        report.record(&source.name, entry.as_deref().map(|e| e.name.as_str()), result)
    })
}

fn flatten_document<R: Read + ?Sized>(
    flattener: &mut XmlFlattener,
    document: &str,
    entry: Option<&Arc<ArchiveEntry>>,
    content: &mut R,
    encoding: Option<&'static Encoding>,
    rows: &mut Vec<OutputRow>,
) -> AppResult<DocumentStats> {
    let summary = flattener.flatten(content, encoding, |row| {
        rows.push(OutputRow {
            document: document.to_string(),
            entry: entry.cloned(),
            row,
        });
        Ok(())
    })?;
    Ok(DocumentStats {
        rows: summary.rows_emitted,
        stopped_early: summary.stopped_early,
    })
}

fn chunk_document<R: Read + ?Sized>(
    emitter: &ChunkEmitter,
    document: &str,
    entry: Option<&Arc<ArchiveEntry>>,
    content: &mut R,
    text: Option<&'static Encoding>,
    out: &mut Vec<ContentChunk>,
) -> AppResult<DocumentStats> {
    let mut push = |chunk: u32, content: ChunkContent| -> AppResult<()> {
        out.push(ContentChunk {
            document: document.to_string(),
            entry: entry.cloned(),
            chunk,
            content,
        });
        Ok(())
    };
    let chunks = match text {
        Some(encoding) => emitter.emit_chars(content, encoding, |i, data| {
            push(i, ChunkContent::Text(data.to_string()))
        })?,
        None => emitter.emit_bytes(content, |i, data| push(i, ChunkContent::Bytes(data.to_vec())))?,
    };
    Ok(DocumentStats {
        rows: u64::from(chunks),
        stopped_early: false,
    })
}

fn compress_source(
    source: &Source,
    chunk_size: usize,
    report: &mut SourceReport<ContentChunk>,
) -> AppResult<()> {
    let input = open_source(source)?;
    let name = Path::new(&source.name)
        .file_name()
        .map_or_else(|| source.name.clone(), |n| n.to_string_lossy().into_owned());

    let items = &mut report.items;
    let result = gzip_chunks(&name, input, chunk_size, |chunk, data| {
        items.push(ContentChunk {
            document: source.name.clone(),
            entry: None,
            chunk,
            content: ChunkContent::Bytes(data.to_vec()),
        });
        Ok(())
    })
    .map(|chunks| DocumentStats {
        rows: u64::from(chunks),
        stopped_early: false,
    });
    report.record(&source.name, None, result)
}

/// Opens `source` and calls `each` for every document it holds: one per
/// archive entry for ZIP input, a single one otherwise.
///
/// Decompression is layered on top of the raw source stream, so a
/// partitioned archive is reassembled first and unpacked second.
fn for_each_document<F>(source: &Source, mut each: F) -> AppResult<()>
where
    F: FnMut(Option<Arc<ArchiveEntry>>, &mut dyn Read) -> AppResult<()>,
{
    let mut input = open_source(source)?;
    match source.format {
        InputFormat::Zip => {
            let entries = for_each_entry(&mut input, |entry, content| {
                if entry.is_dir {
                    return Ok(());
                }
                each(Some(entry), content)
            })?;
            debug!(document = %source.name, entries = entries, "Archive read");
        }
        // gzip members written back to back form one document
        InputFormat::Gzip => each(None, &mut MultiGzDecoder::new(input))?,
        InputFormat::Plain | InputFormat::Auto => each(None, &mut input)?,
    }
    Ok(())
}

fn open_source(source: &Source) -> AppResult<Box<dyn Read + '_>> {
    match &source.kind {
        SourceKind::File(path) => {
            let file = File::open(path).map_err(|e| {
                AppError::IoError(format!("Failed to open {}: {e}", path.display()))
            })?;
            Ok(Box::new(BufReader::new(file)))
        }
        SourceKind::Partition(chunks) => {
            let reader = RowStreamReader::new(chunks.iter().map(|path| read_chunk(path)))?;
            Ok(Box::new(reader))
        }
    }
}

// Zero-length chunk files stand for absent chunks
fn read_chunk(path: &Path) -> io::Result<Option<Vec<u8>>> {
    let data = fs::read(path)?;
    Ok((!data.is_empty()).then_some(data))
}

fn document_name(input: &Path, path: &Path) -> String {
    let relative = path
        .strip_prefix(input)
        .ok()
        .filter(|p| !p.as_os_str().is_empty());
    relative
        .or_else(|| path.file_name().map(Path::new))
        .unwrap_or(path)
        .to_string_lossy()
        .into_owned()
}
