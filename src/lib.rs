//! # Filesmith
//!
//! A pluggable file-transformation engine. A build reads a source directory
//! into an in-memory store of files, passes the store through a chain of
//! plugins, and writes the result to a destination directory.
//!
//! # Architecture: Read → Run → Write
//!
//! ```text
//! 1. Read   src/   →  Files    (directory tree → path-keyed records, frontmatter parsed)
//! 2. Run    Files  →  Files    (plugins, one at a time, in registration order)
//! 3. Write  Files  →  build/   (records → files, permissions restored)
//! ```
//!
//! The store ([`file::Files`]) is a `BTreeMap` from slash-separated relative
//! path to [`file::File`], so every stage sees paths in the same sorted
//! order regardless of platform or filesystem.
//!
//! ```rust,no_run
//! use filesmith::{Filesmith, plugin};
//!
//! # fn main() -> filesmith::Result<()> {
//! let files = Filesmith::new("site")
//!     .destination("public")
//!     .plugin(plugin::sync(|files, _ctx| {
//!         files.retain(|_, file| file.get("draft") != Some(&true.into()));
//!         Ok(())
//!     }))
//!     .build()?;
//! println!("wrote {} files", files.len());
//! # Ok(())
//! # }
//! ```
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`smith`] | `Filesmith` builder: settings plus build/process/run/read/write/watch |
//! | [`file`] | File record, stat snapshot, path-keyed store |
//! | [`reader`] | Directory → store, bounded batches, ignore filtering |
//! | [`writer`] | Store → directory, destination cleaning |
//! | [`plugin`] | Plugin trait, sync/callback/future adapters, sequential runner |
//! | [`watch`] | Watch sessions with debounced incremental rebuilds |
//! | [`digest`] | Content hashes and change sets for incremental writes |
//! | [`matter`] | Frontmatter parsing (YAML, JSON, TOML) |
//! | [`matcher`] | Glob matching over store paths |
//! | [`ignore`] | Glob and predicate ignore rules |
//! | [`env`] | Case-insensitive build environment |
//! | [`debug`] | Named debug channels on top of `tracing` |
//! | [`config`] | `filesmith.toml` loading and validation |
//! | [`error`] | Error taxonomy with machine-readable codes |
//!
//! # Design Decisions
//!
//! ## Bounded I/O Batches
//!
//! With a concurrency limit of `n`, files are read and written `n` at a time
//! on the rayon pool; each batch finishes before the next starts. This bounds
//! open file descriptors on large trees without changing the result.
//!
//! ## One Store, One Actor
//!
//! Plugins receive `&mut Files` in turn. Only one plugin touches the store at
//! any moment, so no locking is involved. Watch sessions keep the raw read
//! result as a cache and hand each rebuild a deep copy.
//!
//! ## Failed Builds Keep Old Output
//!
//! `build()` only cleans the destination once every plugin has succeeded.
//! A build that fails in a plugin leaves the previous output untouched.

pub mod config;
pub mod debug;
pub mod digest;
pub mod env;
pub mod error;
pub mod file;
pub mod ignore;
pub mod matcher;
pub mod matter;
pub mod plugin;
pub mod reader;
pub mod smith;
pub mod watch;
pub mod writer;

pub use error::{Error, PluginError, Result};
pub use file::{File, Files, Metadata, Stats};
pub use plugin::{Context, Plugin};
pub use smith::Filesmith;
pub use watch::{Rebuild, WatchHandle, WatchOptions};

#[cfg(test)]
pub(crate) mod test_helpers;
