//! xmlflat library
//!
//! This crate provides the core functionality for the `xmlflat` binary.
//! Keep the crate root minimal; implementation and tests live in their modules.
//!
//! ## Overview
//!
//! XML documents are streamed into relational rows, one row per tag and per
//! attribute. Include, exclude and skip lists decide which subtrees are
//! emitted, and every row carries an id range that encodes its subtree.
//!
//! - [`parser`] - Scope filtering, the streaming flattener and Parquet output
//! - [`stream`] - Chunked transport: reassembling, re-chunking and compressing streams
//! - [`extractor`] - Streaming ZIP entry access
//! - [`pipeline`] - Batched, parallel runs over files, archives and partitions
//! - [`cli`] - Command-line interface
//! - [`config`] - TOML configuration
//! - [`models`] - Row, entry and chunk types
//! - [`errors`] - Error types used throughout the application
//!
//! ## Example Usage
//!
//! ```no_run
//! use xmlflat::{config::PipelineConfig, errors::AppResult, parser::FilterLists, pipeline};
//! use std::path::Path;
//!
//! # fn example() -> AppResult<()> {
//! let filter = FilterLists {
//!     include: vec!["entry".to_string()],
//!     ..FilterLists::default()
//! };
//! let summary = pipeline::flatten(
//!     Path::new("feeds"),
//!     Path::new("rows.parquet"),
//!     &filter,
//!     &PipelineConfig::default(),
//! )?;
//! println!("{} rows", summary.rows);
//! # Ok(())
//! # }
//! ```

pub mod cli;
pub mod config;
pub mod constants;
pub mod errors;
pub mod extractor;
pub mod models;
pub mod parser;
pub mod pipeline;
pub mod stream;
pub mod utils;
