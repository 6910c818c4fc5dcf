use crate::constants::{GZIP_EXTENSIONS, XML_EXTENSIONS, ZIP_EXTENSIONS};
use crate::errors::{AppError, AppResult};
use std::path::{Path, PathBuf};

/// Finds the documents to flatten below `path`.
///
/// A file is returned as-is whatever its extension. A directory is walked
/// recursively and every XML, ZIP or gzip file found is returned, sorted by
/// path so runs are reproducible.
pub fn find_documents(path: &Path) -> AppResult<Vec<PathBuf>> {
    if path.is_file() {
        return Ok(vec![path.to_path_buf()]);
    }
    if !path.is_dir() {
        return Err(AppError::InvalidInput(format!(
            "Input path does not exist: {}",
            path.display()
        )));
    }
    let mut files = collect_documents(path);
    files.sort();
    Ok(files)
}

/// Finds partitioned documents below `path`.
///
/// Each immediate subdirectory is one document whose chunk files are read in
/// file name order. If `path` has no subdirectories, its own files form a
/// single partition.
///
/// # Returns
///
/// Pairs of partition name (the directory name) and sorted chunk files.
/// Directories without any file are left out.
pub fn find_partitions(path: &Path) -> AppResult<Vec<(String, Vec<PathBuf>)>> {
    if !path.is_dir() {
        return Err(AppError::InvalidInput(format!(
            "Partitioned input must be a directory: {}",
            path.display()
        )));
    }

    let mut subdirs = Vec::new();
    for entry in std::fs::read_dir(path)? {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            subdirs.push(entry.path());
        }
    }
    subdirs.sort();

    if subdirs.is_empty() {
        let chunks = chunk_files(path)?;
        if chunks.is_empty() {
            return Ok(Vec::new());
        }
        return Ok(vec![(dir_name(path), chunks)]);
    }

    let mut out = Vec::with_capacity(subdirs.len());
    for subdir in subdirs {
        let chunks = chunk_files(&subdir)?;
        if !chunks.is_empty() {
            out.push((dir_name(&subdir), chunks));
        }
    }
    Ok(out)
}

/// Recursively collects XML, ZIP and gzip files in a directory (including subdirs).
pub(crate) fn collect_documents(dir: &Path) -> Vec<PathBuf> {
    let mut v = Vec::with_capacity(20);
    let walker = walkdir::WalkDir::new(dir).into_iter();
    for entry in walker.flatten() {
        if entry.file_type().is_file() && is_document(entry.path()) {
            v.push(entry.path().to_path_buf());
        }
    }
    v
}

fn is_document(path: &Path) -> bool {
    let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
        return false;
    };
    XML_EXTENSIONS
        .iter()
        .chain(ZIP_EXTENSIONS)
        .chain(GZIP_EXTENSIONS)
        .any(|known| ext.eq_ignore_ascii_case(known))
}

// Plain files directly inside `dir`, sorted by file name
fn chunk_files(dir: &Path) -> AppResult<Vec<PathBuf>> {
    let mut files = Vec::new();
    let walker = walkdir::WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name();
    for entry in walker {
        let entry = entry
            .map_err(|e| AppError::IoError(format!("Failed to list {}: {e}", dir.display())))?;
        if entry.file_type().is_file() {
            files.push(entry.into_path());
        }
    }
    Ok(files)
}

fn dir_name(path: &Path) -> String {
    path.file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("")
        .to_string()
}
