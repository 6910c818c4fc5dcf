//! Tests for running from a TOML configuration file

#[path = "common/mod.rs"]
mod common;

use common::*;
use std::fs;
use tempfile::TempDir;
use xmlflat::cli::run_workflow;
use xmlflat::config::{Command, ConfigFile};
use xmlflat::errors::AppError;

fn write_config(temp_dir: &TempDir, body: &str) -> std::path::PathBuf {
    let config_path = temp_dir.path().join("xmlflat.toml");
    fs::write(&config_path, body).unwrap();
    config_path
}

#[test]
fn test_flatten_from_config_file() {
    let temp_dir = TempDir::new().unwrap();
    let input = temp_dir.path().join("feeds");
    create_test_file(&input.join("feed.xml"), SAMPLE_FEED.as_bytes());
    let output = temp_dir.path().join("out/rows.parquet");

    let config_path = write_config(
        &temp_dir,
        &format!(
            r#"
command = "flatten"
input = {input:?}
output = {output:?}

[filter]
include = ["entry"]
localnames = ["title"]

[pipeline]
batch_size = 2
log_every = 1
"#
        ),
    );

    let config = ConfigFile::from_toml_file(&config_path).unwrap();
    assert_eq!(config.command, Command::Flatten);
    let summary = run_workflow(&config).unwrap();
    assert_eq!(summary.rows, 2);

    let df = read_parquet(&output);
    assert_eq!(strings(&df, "value"), vec!["Test Title 1", "Test Title 2"]);
}

#[test]
fn test_unzip_from_config_file() {
    let temp_dir = TempDir::new().unwrap();
    let archive = temp_dir.path().join("data.zip");
    create_test_zip(&archive, &[("a.xml", "<a>text</a>")]).unwrap();
    let output = temp_dir.path().join("chunks.parquet");

    let config_path = write_config(
        &temp_dir,
        &format!(
            r#"
command = "unzip"
input = {archive:?}
output = {output:?}

[pipeline]
chunk_size = 4
decode_text = true
"#
        ),
    );

    let config = ConfigFile::from_toml_file(&config_path).unwrap();
    run_workflow(&config).unwrap();
    assert_eq!(
        strings(&read_parquet(&output), "content"),
        vec!["<a>t", "ext<", "/a>"]
    );
}

#[test]
fn test_config_with_unknown_key_is_rejected() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = write_config(
        &temp_dir,
        r#"
input = "in"
output = "out.parquet"

[pipeline]
threads = 4
"#,
    );
    let result = ConfigFile::from_toml_file(&config_path);
    assert!(matches!(result, Err(AppError::InvalidInput(_))));
}

#[test]
fn test_missing_config_file() {
    let temp_dir = TempDir::new().unwrap();
    let result = ConfigFile::from_toml_file(&temp_dir.path().join("absent.toml"));
    assert!(matches!(result, Err(AppError::IoError(_))));
}

#[test]
fn test_flatten_with_configured_encoding() {
    let temp_dir = TempDir::new().unwrap();
    let input = temp_dir.path().join("latin1.xml");
    create_test_file(&input, b"<r><name>M\xfcller</name></r>");
    let output = temp_dir.path().join("rows.parquet");

    let config_path = write_config(
        &temp_dir,
        &format!(
            r#"
input = {input:?}
output = {output:?}

[filter]
localnames = ["name"]

[pipeline]
encoding = "ISO-8859-1"
"#
        ),
    );

    let config = ConfigFile::from_toml_file(&config_path).unwrap();
    run_workflow(&config).unwrap();
    assert_eq!(strings(&read_parquet(&output), "value"), vec!["Müller"]);
}
