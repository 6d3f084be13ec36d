//! Filesystem writer: [`Files`] store → destination tree.
//!
//! Writes mirror the reader's batching: at most `concurrency` files are in
//! flight at once, batches run strictly one after another.
//!
//! ## Partial failure
//!
//! When a write fails, every other write of the same batch still runs to
//! completion and stays on disk; no later batch is started. The first failure
//! in path order is returned. Nothing is rolled back: the destination is a
//! build output that the next successful build overwrites.
//!
//! Store keys must stay inside the destination: an absolute key, an empty
//! key, or one that climbs out with `..` fails with a write error before
//! anything touches the disk.

use crate::error::{Error, Result};
use crate::file::{File, Files, normalize};
use crate::reader::batch_size;
use rayon::prelude::*;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Write every file of the store under `dir`.
pub fn write_files(files: &Files, dir: &Path, concurrency: Option<usize>) -> Result<()> {
    let entries = files
        .iter()
        .map(|(rel, file)| Ok((output_path(dir, Path::new(rel))?, file)))
        .collect::<Result<Vec<(PathBuf, &File)>>>()?;
    let limit = batch_size(concurrency, entries.len());

    for batch in entries.chunks(limit) {
        let results: Vec<Result<()>> = batch
            .par_iter()
            .map(|(path, file)| write_file(path, file))
            .collect();
        if let Some(err) = results.into_iter().find_map(Result::err) {
            return Err(err);
        }
    }

    debug!(dir = %dir.display(), count = files.len(), "wrote files");
    Ok(())
}

/// Resolve store key `rel` to its output path under `dir`.
pub fn output_path(dir: &Path, rel: &Path) -> Result<PathBuf> {
    match normalize(rel) {
        Some(key) if !key.is_empty() => Ok(dir.join(key)),
        _ => Err(Error::write(
            dir.join(rel),
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("path {} escapes the destination", rel.display()),
            ),
        )),
    }
}

/// Write one file, creating parent directories, then apply its mode.
pub fn write_file(path: &Path, file: &File) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| Error::write(path, e))?;
    }
    fs::write(path, &file.contents).map_err(|e| Error::write(path, e))?;
    if let Some(mode) = &file.mode {
        apply_mode(path, mode).map_err(|e| Error::write(path, e))?;
    }
    debug!(path = %path.display(), size = file.contents.len(), "wrote file");
    Ok(())
}

/// Remove everything inside `dir`, keeping `dir` itself. A missing `dir` is
/// not an error.
pub fn clean_dir(dir: &Path) -> Result<()> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(clean_error(dir, e)),
    };
    for entry in entries {
        let entry = entry.map_err(|e| clean_error(dir, e))?;
        let path = entry.path();
        let file_type = entry.file_type().map_err(|e| clean_error(&path, e))?;
        let removed = if file_type.is_dir() {
            fs::remove_dir_all(&path)
        } else {
            fs::remove_file(&path)
        };
        removed.map_err(|e| clean_error(&path, e))?;
    }
    debug!(dir = %dir.display(), "cleaned destination");
    Ok(())
}

/// Delete the output for store key `rel` under `dir`, then prune parent
/// directories left empty. An already-missing file is not an error.
pub fn remove_output(dir: &Path, rel: &str) -> Result<()> {
    let path = output_path(dir, Path::new(rel))?;
    match fs::remove_file(&path) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(Error::write(&path, e)),
    }

    let mut current = path.parent();
    while let Some(parent) = current {
        if parent == dir || !parent.starts_with(dir) {
            break;
        }
        // Fails on non-empty directories, which ends the pruning.
        if fs::remove_dir(parent).is_err() {
            break;
        }
        current = parent.parent();
    }
    debug!(path = %path.display(), "removed output");
    Ok(())
}

fn clean_error(path: &Path, source: io::Error) -> Error {
    Error::Clean {
        path: path.to_path_buf(),
        source,
    }
}

#[cfg(unix)]
fn apply_mode(path: &Path, mode: &str) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    let bits = u32::from_str_radix(mode, 8).map_err(|_| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("invalid file mode {mode:?}"),
        )
    })?;
    fs::set_permissions(path, fs::Permissions::from_mode(bits))
}

#[cfg(not(unix))]
fn apply_mode(_path: &Path, _mode: &str) -> io::Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{files_from, read_tree, tree_paths, write_tree};
    use tempfile::TempDir;

    #[test]
    fn writes_nested_paths() {
        let tmp = TempDir::new().unwrap();
        let files = files_from(&[("a.txt", "a"), ("x/y/z.txt", "z")]);
        write_files(&files, tmp.path(), None).unwrap();
        let tree = read_tree(tmp.path());
        assert_eq!(tree["a.txt"], b"a");
        assert_eq!(tree["x/y/z.txt"], b"z");
    }

    #[test]
    fn concurrency_limit_writes_everything() {
        let tmp = TempDir::new().unwrap();
        let entries: Vec<(String, String)> =
            (0..17).map(|i| (format!("f{i}.txt"), i.to_string())).collect();
        let refs: Vec<(&str, &str)> = entries.iter().map(|(a, b)| (a.as_str(), b.as_str())).collect();
        write_files(&files_from(&refs), tmp.path(), Some(4)).unwrap();
        assert_eq!(tree_paths(tmp.path()).len(), 17);
    }

    #[test]
    fn overwrites_existing_files() {
        let tmp = TempDir::new().unwrap();
        write_tree(tmp.path(), &[("a.txt", "old")]);
        write_files(&files_from(&[("a.txt", "new")]), tmp.path(), None).unwrap();
        assert_eq!(read_tree(tmp.path())["a.txt"], b"new");
    }

    #[cfg(unix)]
    #[test]
    fn applies_mode() {
        use std::os::unix::fs::PermissionsExt;
        let tmp = TempDir::new().unwrap();
        let mut file = File::new("#!/bin/sh");
        file.mode = Some("0755".into());
        write_file(&tmp.path().join("run.sh"), &file).unwrap();
        let mode = fs::metadata(tmp.path().join("run.sh")).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o755);
    }

    #[cfg(unix)]
    #[test]
    fn invalid_mode_is_write_error_after_contents_land() {
        let tmp = TempDir::new().unwrap();
        let mut file = File::new("x");
        file.mode = Some("rwx".into());
        let err = write_file(&tmp.path().join("a.txt"), &file).unwrap_err();
        assert_eq!(err.code(), "failed_write");
        assert_eq!(read_tree(tmp.path())["a.txt"], b"x");
    }

    #[test]
    fn failing_batch_leaves_siblings_in_place() {
        let tmp = TempDir::new().unwrap();
        // `blocker` is a file, so `blocker/child.txt` cannot be created.
        write_tree(tmp.path(), &[("blocker", "file")]);
        let files = files_from(&[
            ("a.txt", "a"),
            ("blocker/child.txt", "nope"),
            ("c.txt", "c"),
            ("z-later.txt", "z"),
        ]);
        let err = write_files(&files, tmp.path(), Some(3)).unwrap_err();
        assert_eq!(err.code(), "failed_write");
        assert!(err.to_string().contains("child.txt"));

        let paths = tree_paths(tmp.path());
        assert!(paths.contains(&"a.txt".to_string()));
        assert!(paths.contains(&"c.txt".to_string()));
        assert!(!paths.contains(&"z-later.txt".to_string()));
    }

    #[test]
    fn clean_dir_empties_but_keeps_root() {
        let tmp = TempDir::new().unwrap();
        write_tree(tmp.path(), &[("a.txt", "a"), (".hidden", "h"), ("d/e.txt", "e")]);
        clean_dir(tmp.path()).unwrap();
        assert!(tmp.path().exists());
        assert!(tree_paths(tmp.path()).is_empty());
        assert_eq!(fs::read_dir(tmp.path()).unwrap().count(), 0);
    }

    #[test]
    fn clean_missing_dir_is_ok() {
        let tmp = TempDir::new().unwrap();
        clean_dir(&tmp.path().join("absent")).unwrap();
    }

    #[test]
    fn escaping_keys_are_rejected_before_writing() {
        let tmp = TempDir::new().unwrap();
        let dest = tmp.path().join("build");
        let absolute = tmp.path().join("abs.txt");
        for key in ["../escaped.txt", "a/../../escaped.txt", absolute.to_str().unwrap(), ""] {
            let files = files_from(&[("ok.txt", "ok"), (key, "x")]);
            let err = write_files(&files, &dest, None).unwrap_err();
            assert_eq!(err.code(), "failed_write");
        }
        assert!(!tmp.path().join("escaped.txt").exists());
        assert!(!absolute.exists());
        assert!(!dest.exists());
    }

    #[test]
    fn dot_segments_inside_the_destination_are_allowed() {
        let tmp = TempDir::new().unwrap();
        write_files(&files_from(&[("a/../b.txt", "b")]), tmp.path(), None).unwrap();
        assert_eq!(read_tree(tmp.path())["b.txt"], b"b");
    }

    #[test]
    fn remove_output_stays_inside_destination() {
        let tmp = TempDir::new().unwrap();
        write_tree(tmp.path(), &[("victim.txt", "v"), ("build/a.txt", "a")]);
        let dest = tmp.path().join("build");
        let err = remove_output(&dest, "../victim.txt").unwrap_err();
        assert_eq!(err.code(), "failed_write");
        assert!(tmp.path().join("victim.txt").exists());
    }

    #[test]
    fn remove_output_prunes_empty_parents() {
        let tmp = TempDir::new().unwrap();
        write_tree(tmp.path(), &[("a/b/c.txt", "c"), ("a/keep.txt", "k")]);
        remove_output(tmp.path(), "a/b/c.txt").unwrap();
        assert!(!tmp.path().join("a/b").exists());
        assert!(tmp.path().join("a/keep.txt").exists());
        remove_output(tmp.path(), "a/b/c.txt").unwrap();
    }
}
