//! Shared test utilities for the filesmith test suite.
//!
//! Tree helpers build and inspect small directory fixtures inside a
//! `TempDir`, so each test gets an isolated copy it can mutate freely.
//!
//! ```rust
//! use crate::test_helpers::*;
//!
//! let tmp = TempDir::new().unwrap();
//! write_tree(tmp.path(), &[("index.md", "---\ntitle: A\n---\nbody")]);
//! assert_eq!(read_tree(tmp.path())["index.md"], b"---\ntitle: A\n---\nbody");
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use crate::file::{File, Files};

// =========================================================================
// Fixture trees
// =========================================================================

/// Write `(relative path, contents)` pairs under `root`, creating parents.
pub fn write_tree(root: &Path, entries: &[(&str, &str)]) {
    for (rel, contents) in entries {
        let path = root.join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(&path, contents).unwrap();
    }
}

/// Every regular file under `root` as `relative path → bytes`.
pub fn read_tree(root: &Path) -> BTreeMap<String, Vec<u8>> {
    let mut out = BTreeMap::new();
    if !root.exists() {
        return out;
    }
    for entry in walkdir::WalkDir::new(root).min_depth(1) {
        let entry = entry.unwrap();
        if entry.file_type().is_file() {
            let rel = entry.path().strip_prefix(root).unwrap();
            let key = crate::file::normalize(rel).unwrap();
            out.insert(key, fs::read(entry.path()).unwrap());
        }
    }
    out
}

/// Relative paths of every regular file under `root`, sorted.
pub fn tree_paths(root: &Path) -> Vec<String> {
    read_tree(root).into_keys().collect()
}

// =========================================================================
// In-memory stores
// =========================================================================

/// Build a store from `(path, contents)` pairs.
pub fn files_from(entries: &[(&str, &str)]) -> Files {
    entries
        .iter()
        .map(|(path, contents)| (path.to_string(), File::new(*contents)))
        .collect()
}

/// Store keys in order.
pub fn keys(files: &Files) -> Vec<&str> {
    files.keys().map(String::as_str).collect()
}
