//! Filesystem reader: directory tree → [`Files`] store.
//!
//! ## Algorithm
//!
//! 1. Walk the source directory recursively with [`walkdir`], following
//!    symbolic links. A broken link is an error unless its path is ignored.
//! 2. Prune with ignore globs while walking (no `stat` needed), then stat the
//!    survivors only if predicate rules exist.
//! 3. Load the surviving files in batches of at most `concurrency` paths.
//!    Each batch is read in parallel on the [`rayon`] pool and fully finishes
//!    before the next one starts, which bounds open file descriptors.
//! 4. UTF-8 content goes through the frontmatter parser when enabled; binary
//!    content is kept as-is.
//!
//! Any failure aborts the whole read.

use crate::error::{Error, Result};
use crate::file::{File, Files, Stats, normalize};
use crate::ignore::Ignore;
use crate::matter::Matter;
use rayon::prelude::*;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::WalkDir;

/// Keys owned by the file record itself; frontmatter cannot shadow them.
const RESERVED_KEYS: &[&str] = &["contents", "mode", "stats"];

/// Settings for one read.
#[derive(Debug, Clone, Copy)]
pub struct ReadOptions<'a> {
    pub ignore: &'a Ignore,
    /// Maximum files read at once. `None` means unbounded.
    pub concurrency: Option<usize>,
    /// Frontmatter parser, or `None` to keep contents raw.
    pub matter: Option<&'a Matter>,
}

/// Read every non-ignored file under `dir` into a store keyed by relative
/// path.
pub fn read_dir(dir: &Path, options: &ReadOptions<'_>) -> Result<Files> {
    read_subtree(dir, dir, options)
}

/// Read every non-ignored file under `start`, a directory inside `root`.
/// Keys and ignore rules are relative to `root`.
pub fn read_subtree(root: &Path, start: &Path, options: &ReadOptions<'_>) -> Result<Files> {
    fs::metadata(start).map_err(|e| Error::read(start, e))?;
    let paths = collect_paths(root, start, options.ignore)?;
    let limit = batch_size(options.concurrency, paths.len());

    let mut files = Files::new();
    for batch in paths.chunks(limit) {
        let loaded: Vec<File> = batch
            .par_iter()
            .map(|(_, abs)| read_file(abs, options.matter))
            .collect::<Result<_>>()?;
        for ((rel, _), file) in batch.iter().zip(loaded) {
            files.insert(rel.clone(), file);
        }
    }

    debug!(dir = %start.display(), count = files.len(), "read directory");
    Ok(files)
}

/// Read a single file: stats, bytes, and (for UTF-8 content) frontmatter.
pub fn read_file(path: &Path, matter: Option<&Matter>) -> Result<File> {
    let meta = fs::metadata(path).map_err(|e| Error::read(path, e))?;
    let is_symlink = fs::symlink_metadata(path)
        .map(|m| m.file_type().is_symlink())
        .unwrap_or(false);
    let buffer = fs::read(path).map_err(|e| Error::read(path, e))?;
    let stats = Stats::from_metadata(&meta, is_symlink);

    let mut file = match matter {
        Some(matter) if std::str::from_utf8(&buffer).is_ok() => {
            matter
                .parse(&buffer)
                .map_err(|source| Error::Frontmatter {
                    path: path.to_path_buf(),
                    source,
                })?
        }
        _ => File::new(buffer),
    };
    for key in RESERVED_KEYS {
        file.metadata.remove(*key);
    }
    file.mode = stats.octal_mode();
    file.stats = Some(stats);

    debug!(path = %path.display(), size = file.contents.len(), "read file");
    Ok(file)
}

/// Number of paths per batch for a concurrency limit.
pub(crate) fn batch_size(concurrency: Option<usize>, total: usize) -> usize {
    concurrency.unwrap_or(total).max(1)
}

/// Store key for `path` under `root`.
pub(crate) fn relative_key(root: &Path, path: &Path) -> Option<String> {
    normalize(path.strip_prefix(root).ok()?)
}

/// Enumerate `(key relative to root, absolute path)` for every file to load
/// under `start`, sorted by key.
fn collect_paths(root: &Path, start: &Path, ignore: &Ignore) -> Result<Vec<(String, PathBuf)>> {
    let mut walker = WalkDir::new(start)
        .min_depth(1)
        .follow_links(true)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| match relative_key(root, entry.path()) {
            Some(rel) => !ignore.matches_pattern(&rel),
            None => true,
        });

    let mut paths = Vec::new();
    while let Some(next) = walker.next() {
        let entry = match next {
            Ok(entry) => entry,
            Err(err) => {
                let path = err
                    .path()
                    .map(Path::to_path_buf)
                    .unwrap_or_else(|| start.to_path_buf());
                if relative_key(root, &path).is_some_and(|rel| ignore.covers(&rel)) {
                    continue;
                }
                let source = err
                    .into_io_error()
                    .unwrap_or_else(|| io::Error::other("filesystem loop detected"));
                return Err(Error::read(path, source));
            }
        };

        let Some(rel) = relative_key(root, entry.path()) else {
            continue;
        };

        if ignore.needs_stats() {
            let meta = entry
                .metadata()
                .map_err(|e| Error::read(entry.path(), e.into()))?;
            let stats = Stats::from_metadata(&meta, entry.path_is_symlink());
            if ignore.matches_predicate(&rel, &stats) {
                if entry.file_type().is_dir() {
                    walker.skip_current_dir();
                }
                continue;
            }
        }

        if entry.file_type().is_file() {
            paths.push((rel, entry.into_path()));
        }
    }

    paths.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(paths)
}
