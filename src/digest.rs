//! Content digests for incremental rebuilds.
//!
//! After each watch rebuild the result store is fingerprinted path by path.
//! Comparing against the previous fingerprints tells the watcher which
//! outputs to delete and which to rewrite; everything else on disk is left
//! alone.
//!
//! Digests are SHA-256 of the file contents only. Metadata changes that do not
//! alter the bytes do not cause a rewrite.
//!
//! ## Diff rules
//!
//! ```text
//! changed_or_removed = { p in prev : prev[p] != next[p] or p not in next }
//! added              = (next \ prev) \ changed_or_removed
//! removed            = changed_or_removed, p not in next
//! changed            = changed_or_removed, p in next
//! ```

use crate::file::Files;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;

/// Store path → hex SHA-256 of its contents.
pub type DigestMap = BTreeMap<String, String>;

/// Hex SHA-256 of `bytes`.
pub fn hash_bytes(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

/// Fingerprint every file of a store.
pub fn digest_files(files: &Files) -> DigestMap {
    files
        .iter()
        .map(|(path, file)| (path.clone(), hash_bytes(&file.contents)))
        .collect()
}

/// Paths that differ between two digest maps, each list sorted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Changes {
    pub added: Vec<String>,
    pub changed: Vec<String>,
    pub removed: Vec<String>,
}

impl Changes {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.changed.is_empty() && self.removed.is_empty()
    }

    /// Paths whose output has to be (re)written.
    pub fn to_write(&self) -> impl Iterator<Item = &str> {
        self.added.iter().chain(&self.changed).map(String::as_str)
    }
}

impl fmt::Display for Changes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} added, {} changed, {} removed",
            self.added.len(),
            self.changed.len(),
            self.removed.len()
        )
    }
}

/// Compare the previous fingerprints with the new ones.
pub fn diff(prev: &DigestMap, next: &DigestMap) -> Changes {
    let mut changes = Changes::default();
    for (path, hash) in prev {
        match next.get(path) {
            None => changes.removed.push(path.clone()),
            Some(new_hash) if new_hash != hash => changes.changed.push(path.clone()),
            Some(_) => {}
        }
    }
    changes.added = next
        .keys()
        .filter(|path| !prev.contains_key(*path))
        .cloned()
        .collect();
    changes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::files_from;

    fn map(entries: &[(&str, &str)]) -> DigestMap {
        digest_files(&files_from(entries))
    }

    #[test]
    fn hash_is_hex_sha256() {
        assert_eq!(
            hash_bytes(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
        assert_eq!(hash_bytes(b"a").len(), 64);
    }

    #[test]
    fn identical_maps_have_no_changes() {
        let a = map(&[("a.txt", "a"), ("b.txt", "b")]);
        let changes = diff(&a, &a.clone());
        assert!(changes.is_empty());
        assert_eq!(changes.to_string(), "0 added, 0 changed, 0 removed");
    }

    #[test]
    fn classifies_added_changed_removed() {
        let prev = map(&[("keep.txt", "k"), ("edit.txt", "old"), ("gone.txt", "g")]);
        let next = map(&[("keep.txt", "k"), ("edit.txt", "new"), ("new.txt", "n")]);
        let changes = diff(&prev, &next);
        assert_eq!(changes.added, vec!["new.txt"]);
        assert_eq!(changes.changed, vec!["edit.txt"]);
        assert_eq!(changes.removed, vec!["gone.txt"]);
        assert_eq!(changes.to_write().collect::<Vec<_>>(), vec!["new.txt", "edit.txt"]);
    }

    #[test]
    fn removed_path_is_not_reported_changed() {
        let prev = map(&[("a.txt", "a"), ("b.txt", "b")]);
        let next = map(&[("a.txt", "a")]);
        let changes = diff(&prev, &next);
        assert_eq!(changes.removed, vec!["b.txt"]);
        assert!(changes.changed.is_empty());
        assert!(changes.added.is_empty());
    }

    #[test]
    fn metadata_only_change_is_not_a_change() {
        let mut files = files_from(&[("a.md", "body")]);
        let prev = digest_files(&files);
        files.get_mut("a.md").unwrap().set("title", "New");
        assert!(diff(&prev, &digest_files(&files)).is_empty());
    }

    #[test]
    fn empty_previous_map_reports_everything_added() {
        let next = map(&[("b.txt", "b"), ("a.txt", "a")]);
        let changes = diff(&DigestMap::new(), &next);
        assert_eq!(changes.added, vec!["a.txt", "b.txt"]);
    }
}
