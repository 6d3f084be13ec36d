//! Error taxonomy shared by every stage of a build.
//!
//! Each variant maps to a stable machine-readable code (see [`Error::code`])
//! so callers can branch on the kind of failure without parsing messages.
//! Messages always carry the offending path where one exists.

use crate::config::ConfigError;
use crate::matter::MatterError;
use std::path::PathBuf;
use thiserror::Error;

/// Error type produced by plugins.
///
/// Plugins fail with any boxed error; the runner hands it back to the caller
/// untouched.
pub type PluginError = Box<dyn std::error::Error + Send + Sync + 'static>;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid configuration: {0}")]
    Config(String),
    #[error(transparent)]
    ConfigFile(#[from] ConfigError),
    #[error("Invalid glob pattern {pattern:?}: {source}")]
    Glob {
        pattern: String,
        source: globset::Error,
    },
    #[error("Failed to read the file at: {}\n\n{source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Invalid frontmatter in the file at: {}\n\n{source}", path.display())]
    Frontmatter { path: PathBuf, source: MatterError },
    #[error("Failed to write the file at: {}\n\n{source}", path.display())]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Error cleaning destination: {}\n\n{source}", path.display())]
    Clean {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error(transparent)]
    Plugin(PluginError),
    #[error("File watcher error: {0}")]
    Watch(#[from] notify::Error),
}

impl Error {
    /// Machine-readable error kind.
    pub fn code(&self) -> &'static str {
        match self {
            Error::Config(_) | Error::ConfigFile(_) => "invalid_config",
            Error::Glob { .. } => "invalid_pattern",
            Error::Read { .. } => "failed_read",
            Error::Frontmatter { .. } => "invalid_frontmatter",
            Error::Write { .. } => "failed_write",
            Error::Clean { .. } => "failed_clean",
            Error::Plugin(_) => "plugin_error",
            Error::Watch(_) => "failed_watch",
        }
    }

    /// The path the error is about, if it concerns a single file.
    pub fn path(&self) -> Option<&std::path::Path> {
        match self {
            Error::Read { path, .. }
            | Error::Frontmatter { path, .. }
            | Error::Write { path, .. }
            | Error::Clean { path, .. } => Some(path),
            _ => None,
        }
    }

    pub(crate) fn read(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Read {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn write(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Write {
            path: path.into(),
            source,
        }
    }
}
