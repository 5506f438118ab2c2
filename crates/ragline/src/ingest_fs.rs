//! Directory scanning for CLI ingestion.

use anyhow::{Context, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

fn build_globset(include_globs: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in include_globs {
        builder.add(Glob::new(pattern).with_context(|| format!("invalid glob: {}", pattern))?);
    }
    builder.build().context("failed to build glob set")
}

/// All files under `root` matching the include globs, sorted for
/// deterministic ingestion order. A single file path is returned as-is.
pub fn scan_files(root: &Path, include_globs: &[String]) -> Result<Vec<PathBuf>> {
    if root.is_file() {
        return Ok(vec![root.to_path_buf()]);
    }

    let globset = build_globset(include_globs)?;
    let mut files = Vec::new();

    for entry in WalkDir::new(root).into_iter().filter_map(|e| e.ok()) {
        if !entry.file_type().is_file() {
            continue;
        }
        let rel = entry.path().strip_prefix(root).unwrap_or(entry.path());
        if globset.is_match(rel) {
            files.push(entry.path().to_path_buf());
        }
    }

    files.sort();
    Ok(files)
}
