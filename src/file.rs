//! In-memory file model.
//!
//! A build operates on a [`Files`] store: an ordered map from a normalized,
//! slash-separated path (relative to the source or destination root) to a
//! [`File`] record. The map is a `BTreeMap` so enumeration is sorted by path,
//! which keeps builds reproducible for a given input tree.
//!
//! ```text
//! "index.md"        → File { contents, mode: "0644", stats, metadata: {title: ...} }
//! "posts/first.md"  → File { ... }
//! "img/logo.png"    → File { contents (binary), mode, stats, metadata: {} }
//! ```

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fs::Metadata as FsMetadata;
use std::path::{Component, Path};
use std::time::SystemTime;

/// The store passed through a build: relative path → file record.
pub type Files = BTreeMap<String, File>;

/// Arbitrary per-file metadata (parsed frontmatter plus plugin additions).
pub type Metadata = Map<String, Value>;

/// One logical file.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct File {
    /// Raw content bytes. Always present, possibly empty.
    #[serde(serialize_with = "contents_as_text")]
    pub contents: Vec<u8>,
    /// Octal permission string such as `"0644"`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
    /// Snapshot of the source file's filesystem metadata.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stats: Option<Stats>,
    #[serde(flatten)]
    pub metadata: Metadata,
}

impl File {
    pub fn new(contents: impl Into<Vec<u8>>) -> Self {
        Self {
            contents: contents.into(),
            ..Self::default()
        }
    }

    /// Builder-style metadata insertion.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.metadata.get(key)
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.metadata.insert(key.into(), value.into())
    }

    /// Contents as UTF-8, if they are valid UTF-8.
    pub fn text(&self) -> Option<&str> {
        std::str::from_utf8(&self.contents).ok()
    }
}

/// Filesystem metadata captured when a file is read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stats {
    pub size: u64,
    pub is_file: bool,
    pub is_dir: bool,
    pub is_symlink: bool,
    /// Full `st_mode` bits on Unix, `0` elsewhere.
    pub mode: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified: Option<SystemTime>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accessed: Option<SystemTime>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<SystemTime>,
}

impl Stats {
    /// Snapshot `meta`. `is_symlink` must be supplied by the caller because
    /// followed metadata never reports a link.
    pub fn from_metadata(meta: &FsMetadata, is_symlink: bool) -> Self {
        Self {
            size: meta.len(),
            is_file: meta.is_file(),
            is_dir: meta.is_dir(),
            is_symlink,
            mode: raw_mode(meta),
            modified: meta.modified().ok(),
            accessed: meta.accessed().ok(),
            created: meta.created().ok(),
        }
    }

    /// Permission bits as a four-digit octal string (`"0644"`), or `None` on
    /// platforms without Unix permissions.
    pub fn octal_mode(&self) -> Option<String> {
        if cfg!(unix) {
            Some(format!("{:04o}", self.mode & 0o7777))
        } else {
            None
        }
    }
}

#[cfg(unix)]
fn raw_mode(meta: &FsMetadata) -> u32 {
    use std::os::unix::fs::MetadataExt;
    meta.mode()
}

#[cfg(not(unix))]
fn raw_mode(_meta: &FsMetadata) -> u32 {
    0
}

/// Convert a relative filesystem path into a store key.
///
/// Separators become `/`, `.` components are dropped. Returns `None` for
/// absolute paths and for paths that climb out of the root with `..`.
pub fn normalize(path: &Path) -> Option<String> {
    let mut parts: Vec<String> = Vec::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => parts.push(part.to_string_lossy().into_owned()),
            Component::CurDir => {}
            Component::ParentDir => {
                parts.pop()?;
            }
            Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    Some(parts.join("/"))
}

/// Canonicalize a string path to forward slashes.
pub fn to_slash(path: &str) -> String {
    path.replace('\\', "/")
}

/// Contents serialize as text when possible so store dumps stay readable.
fn contents_as_text<S: serde::Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
    match std::str::from_utf8(bytes) {
        Ok(text) => s.serialize_str(text),
        Err(_) => s.serialize_bytes(bytes),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn normalize_uses_forward_slashes() {
        let p: PathBuf = ["posts", "2024", "hello.md"].iter().collect();
        assert_eq!(normalize(&p).as_deref(), Some("posts/2024/hello.md"));
    }

    #[test]
    fn normalize_drops_current_dir() {
        assert_eq!(normalize(Path::new("./a/./b.md")).as_deref(), Some("a/b.md"));
    }

    #[test]
    fn normalize_resolves_inner_parent() {
        assert_eq!(normalize(Path::new("a/../b.md")).as_deref(), Some("b.md"));
    }

    #[test]
    fn normalize_rejects_escape_and_absolute() {
        assert_eq!(normalize(Path::new("../outside.md")), None);
        assert_eq!(normalize(Path::new("/etc/passwd")), None);
    }

    #[test]
    fn file_metadata_accessors() {
        let mut file = File::new("body").with("title", "Hello");
        assert_eq!(file.get("title"), Some(&Value::from("Hello")));
        assert_eq!(file.set("draft", true), None);
        assert_eq!(file.text(), Some("body"));
    }

    #[test]
    fn binary_contents_have_no_text() {
        let file = File::new(vec![0xff, 0xfe, 0x00]);
        assert!(file.text().is_none());
    }

    #[test]
    fn to_slash_converts_backslashes() {
        assert_eq!(to_slash("a\\b\\c.md"), "a/b/c.md");
    }
}
