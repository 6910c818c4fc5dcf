use crate::config::{Command, ConfigFile, PipelineConfig};
use crate::errors::{AppError, AppResult};
use crate::models::InputFormat;
use crate::parser::FilterLists;
use crate::pipeline::{self, RunSummary};
use clap::{Arg, ArgAction, ArgMatches};
use std::path::PathBuf;
use tracing::info;

// CLI metadata constants
const APP_VERSION: &str = env!("CARGO_PKG_VERSION");
const APP_AUTHOR: &str = env!("CARGO_PKG_AUTHORS");
const APP_ABOUT: &str = env!("CARGO_PKG_DESCRIPTION");

macro_rules! zip_note {
    () => {
        "ZIP input is read front to back. Entries whose sizes follow the data in a \
         trailing data descriptor (written by streaming zippers such as Java's \
         ZipOutputStream) cannot be read and fail their archive."
    };
}

/// Parses command-line arguments and runs the selected command.
///
/// Subcommands:
/// - `flatten`: flatten XML documents into rows
/// - `unzip`: split the entries of ZIP archives into content chunks
/// - `compress`: gzip inputs and split the compressed streams into chunks
/// - `toml`: run whatever a TOML configuration file describes
///
/// Without a subcommand the help text is printed.
pub fn cli() -> AppResult<()> {
    let cmd = build_command();
    let mut cmd_for_help = cmd.clone();
    let matches = cmd.get_matches();

    match matches.subcommand() {
        Some(("toml", sub)) => {
            let config_path = sub
                .get_one::<PathBuf>("config")
                .ok_or_else(|| AppError::InvalidInput("Missing config path".into()))?;
            let config = ConfigFile::from_toml_file(config_path)?;
            run_workflow(&config)?;
        }
        Some((name, sub)) => {
            let config = config_from_matches(name, sub)?;
            run_workflow(&config)?;
        }
        None => {
            cmd_for_help
                .print_help()
                .map_err(|e| AppError::IoError(format!("Failed to print help: {e}")))?;
        }
    }

    Ok(())
}

fn build_command() -> clap::Command<'static> {
    clap::Command::new("xmlflat")
        .version(APP_VERSION)
        .author(APP_AUTHOR)
        .about(APP_ABOUT)
        .subcommand(
            io_args(clap::Command::new("flatten"))
                .about("Flatten XML documents into rows of tags and attributes")
                .after_help(concat!(
                    "Example:\n  xmlflat flatten feeds/ -o rows.parquet --include entry --exclude /feed/entry/summary/\n\n",
                    zip_note!()
                ))
                .arg(list_arg("include", "Names or path patterns whose subtrees are selected"))
                .arg(list_arg("exclude", "Names or path patterns whose subtrees are left out"))
                .arg(list_arg("skip_after", "Stop reading a document once this node is closed"))
                .arg(list_arg("localnames", "Only emit rows with these local names")),
        )
        .subcommand(
            io_args(clap::Command::new("unzip"))
                .about("Split archive entries into numbered content chunks")
                .after_help(zip_note!())
                .arg(chunk_size_arg())
                .arg(
                    Arg::new("decode_text")
                        .long("decode-text")
                        .help("Chunk by decoded characters (see --encoding) and write text instead of bytes")
                        .action(ArgAction::SetTrue),
                ),
        )
        .subcommand(
            io_args(clap::Command::new("compress"))
                .about("Gzip inputs and split the compressed streams into chunks")
                .arg(chunk_size_arg()),
        )
        .subcommand(
            clap::Command::new("toml")
                .about("Run using a TOML configuration file")
                .arg(
                    Arg::new("config")
                        .help("Path to the TOML config file")
                        .required(true)
                        .value_parser(clap::value_parser!(PathBuf)),
                ),
        )
}

/// Arguments shared by every processing subcommand.
fn io_args(cmd: clap::Command<'static>) -> clap::Command<'static> {
    cmd.arg(
        Arg::new("input")
            .help("Input file or directory")
            .required(true)
            .value_parser(clap::value_parser!(PathBuf)),
    )
    .arg(
        Arg::new("output")
            .short('o')
            .long("output")
            .help("Parquet file to write")
            .required(true)
            .value_parser(clap::value_parser!(PathBuf))
            .action(ArgAction::Set),
    )
    .arg(
        Arg::new("format")
            .short('f')
            .long("format")
            .help("How inputs are wrapped: auto, plain, zip or gzip")
            .value_parser(["auto", "plain", "zip", "gzip"])
            .default_value("auto")
            .action(ArgAction::Set),
    )
    .arg(
        Arg::new("partitioned")
            .short('p')
            .long("partitioned")
            .help("Read each subdirectory as one document split into chunk files")
            .action(ArgAction::SetTrue),
    )
    .arg(
        Arg::new("stop_on_error")
            .long("stop-on-error")
            .help("Abort at the first failing document instead of skipping it")
            .action(ArgAction::SetTrue),
    )
    .arg(
        Arg::new("log_every")
            .long("log-every")
            .help("Log progress every N documents")
            .value_parser(clap::value_parser!(u64))
            .action(ArgAction::Set),
    )
    .arg(
        Arg::new("batch_size")
            .short('b')
            .long("batch-size")
            .help("Inputs processed per parallel batch")
            .value_parser(clap::value_parser!(usize))
            .action(ArgAction::Set),
    )
    .arg(
        Arg::new("encoding")
            .short('e')
            .long("encoding")
            .help("Input encoding label such as utf-8 or ISO-8859-1 (default: XML declaration, else UTF-8)")
            .value_name("LABEL")
            .action(ArgAction::Set),
    )
    .arg(
        Arg::new("threads")
            .short('t')
            .long("threads")
            .help("Worker threads (0 uses one per CPU)")
            .value_parser(clap::value_parser!(usize))
            .action(ArgAction::Set),
    )
}

fn list_arg(id: &'static str, help: &'static str) -> Arg<'static> {
    let long = match id {
        "skip_after" => "skip-after",
        other => other,
    };
    Arg::new(id)
        .long(long)
        .help(help)
        .value_name("NAME")
        .action(ArgAction::Append)
}

fn chunk_size_arg() -> Arg<'static> {
    Arg::new("chunk_size")
        .short('c')
        .long("chunk-size")
        .help("Maximum chunk length in bytes (characters with --decode-text)")
        .value_parser(clap::value_parser!(usize))
        .action(ArgAction::Set)
}

fn config_from_matches(name: &str, sub: &ArgMatches) -> AppResult<ConfigFile> {
    let command = match name {
        "flatten" => Command::Flatten,
        "unzip" => Command::Unzip,
        "compress" => Command::Compress,
        other => {
            return Err(AppError::InvalidInput(format!("Unknown command: {other}")));
        }
    };

    let input = sub
        .get_one::<PathBuf>("input")
        .cloned()
        .ok_or_else(|| AppError::InvalidInput("Missing input path".into()))?;
    let output = sub
        .get_one::<PathBuf>("output")
        .cloned()
        .ok_or_else(|| AppError::InvalidInput("Missing output path".into()))?;

    let mut pipeline = PipelineConfig::default();
    if let Some(format) = sub.get_one::<String>("format") {
        pipeline.format = InputFormat::from(format.as_str());
    }
    pipeline.partitioned = flag(sub, "partitioned");
    pipeline.stop_on_error = flag(sub, "stop_on_error");
    if let Some(&log_every) = sub.get_one::<u64>("log_every") {
        pipeline.log_every = log_every;
    }
    if let Some(&batch_size) = sub.get_one::<usize>("batch_size") {
        pipeline.batch_size = batch_size;
    }
    if let Some(&threads) = sub.get_one::<usize>("threads") {
        pipeline.parser_threads = threads;
    }
    pipeline.encoding = sub.get_one::<String>("encoding").cloned();

    let mut filter = FilterLists::default();
    match command {
        Command::Flatten => {
            filter.include = values(sub, "include");
            filter.exclude = values(sub, "exclude");
            filter.skip_after = values(sub, "skip_after");
            filter.localnames = values(sub, "localnames");
        }
        Command::Unzip | Command::Compress => {
            if let Some(&chunk_size) = sub.get_one::<usize>("chunk_size") {
                pipeline.chunk_size = chunk_size;
            }
            if command == Command::Unzip {
                pipeline.decode_text = flag(sub, "decode_text");
            }
        }
    }
    pipeline.validate()?;

    Ok(ConfigFile {
        command,
        input,
        output,
        filter,
        pipeline,
    })
}

fn flag(sub: &ArgMatches, id: &str) -> bool {
    sub.get_one::<bool>(id).copied().unwrap_or(false)
}

fn values(sub: &ArgMatches, id: &str) -> Vec<String> {
    sub.get_many::<String>(id)
        .map(|v| v.cloned().collect())
        .unwrap_or_default()
}

/// Runs one configured command end to end.
pub fn run_workflow(config: &ConfigFile) -> AppResult<RunSummary> {
    info!(
        command = ?config.command,
        input = %config.input.display(),
        output = %config.output.display(),
        "Starting run"
    );

    match config.command {
        Command::Flatten => pipeline::flatten(
            &config.input,
            &config.output,
            &config.filter,
            &config.pipeline,
        ),
        Command::Unzip => pipeline::unzip(&config.input, &config.output, &config.pipeline),
        Command::Compress => pipeline::compress(&config.input, &config.output, &config.pipeline),
    }
}
