//! Project configuration module.
//!
//! Loads and validates `filesmith.toml` from the working directory. Every key
//! is optional; a missing file means all defaults.
//!
//! ## Configuration Options
//!
//! ```toml
//! source = "src"            # Input directory, relative to the working dir
//! destination = "build"     # Output directory, relative to the working dir
//! clean = true              # Empty the destination before a full write
//! concurrency = 16          # Max files read/written at once (omit = unbounded)
//! ignore = ["*.swp", "drafts/**"]
//!
//! frontmatter = true        # or false, or a table:
//! # [frontmatter]
//! # language = "yaml"       # yaml | json | toml
//! # delimiters = "---"      # or ["+++", "+++"]
//! # excerpt = false
//! # excerpt_separator = "---"
//!
//! watch = false             # or a list of paths, or a table:
//! # [watch]
//! # paths = ["src", "layouts"]
//! # debounce_ms = 50
//!
//! [metadata]                # Global metadata available to plugins
//! sitename = "Example"
//!
//! [env]                     # Build environment (names are case-insensitive)
//! DEBUG = false
//! ```
//!
//! Unknown keys are rejected to catch typos early.

use crate::env::Environment;
use crate::file::Metadata;
use crate::matcher::{MatchOptions, Matcher};
use crate::matter::MatterOptions;
use crate::watch::{DEFAULT_DEBOUNCE, WatchOptions};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// File name looked up in the working directory.
pub const CONFIG_FILENAME: &str = "filesmith.toml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Project configuration loaded from `filesmith.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub source: String,
    pub destination: String,
    pub clean: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub concurrency: Option<usize>,
    pub frontmatter: FrontmatterConfig,
    pub ignore: Vec<String>,
    pub metadata: Metadata,
    pub env: Environment,
    pub watch: WatchConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            source: "src".to_string(),
            destination: "build".to_string(),
            clean: true,
            concurrency: None,
            frontmatter: FrontmatterConfig::default(),
            ignore: Vec::new(),
            metadata: Metadata::new(),
            env: Environment::new(),
            watch: WatchConfig::default(),
        }
    }
}

impl Config {
    /// Validate values serde cannot check on its own.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.source.trim().is_empty() {
            return Err(ConfigError::Validation("source must not be empty".into()));
        }
        if self.destination.trim().is_empty() {
            return Err(ConfigError::Validation(
                "destination must not be empty".into(),
            ));
        }
        if self.concurrency == Some(0) {
            return Err(ConfigError::Validation(
                "concurrency must be at least 1".into(),
            ));
        }
        if let Err(e) = Matcher::new(&self.ignore, &MatchOptions::default()) {
            return Err(ConfigError::Validation(format!("ignore: {e}")));
        }
        if let WatchConfig::Options(table) = &self.watch
            && table.debounce_ms == 0
        {
            return Err(ConfigError::Validation(
                "watch.debounce_ms must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

/// `frontmatter = true | false | { ... }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FrontmatterConfig {
    Enabled(bool),
    Options(MatterOptions),
}

impl Default for FrontmatterConfig {
    fn default() -> Self {
        FrontmatterConfig::Enabled(true)
    }
}

impl FrontmatterConfig {
    /// Parser options, or `None` when frontmatter parsing is off.
    pub fn options(&self) -> Option<MatterOptions> {
        match self {
            FrontmatterConfig::Enabled(true) => Some(MatterOptions::default()),
            FrontmatterConfig::Enabled(false) => None,
            FrontmatterConfig::Options(options) => Some(options.clone()),
        }
    }
}

/// `watch = true | false | ["paths"] | { paths, debounce_ms }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WatchConfig {
    Enabled(bool),
    Paths(Vec<PathBuf>),
    Options(WatchTable),
}

impl Default for WatchConfig {
    fn default() -> Self {
        WatchConfig::Enabled(false)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WatchTable {
    pub paths: Vec<PathBuf>,
    pub debounce_ms: u64,
}

impl Default for WatchTable {
    fn default() -> Self {
        Self {
            paths: Vec::new(),
            debounce_ms: DEFAULT_DEBOUNCE.as_millis() as u64,
        }
    }
}

impl WatchConfig {
    /// Whether watching is switched on in the file.
    pub fn enabled(&self) -> bool {
        !matches!(self, WatchConfig::Enabled(false))
    }

    /// Watch options this entry describes. `watch = false` still yields the
    /// defaults so `filesmith watch` works without any watch config.
    pub fn options(&self) -> WatchOptions {
        match self {
            WatchConfig::Enabled(_) => WatchOptions::default(),
            WatchConfig::Paths(paths) => WatchOptions::default().paths(paths.clone()),
            WatchConfig::Options(table) => WatchOptions::default()
                .paths(table.paths.clone())
                .debounce(Duration::from_millis(table.debounce_ms)),
        }
    }
}

// =============================================================================
// Config loading
// =============================================================================

/// Load `filesmith.toml` from `root`, falling back to defaults when absent.
pub fn load_config(root: &Path) -> Result<Config, ConfigError> {
    let path = root.join(CONFIG_FILENAME);
    if !path.exists() {
        return Ok(Config::default());
    }
    load_config_file(&path)
}

/// Load and validate a specific config file.
pub fn load_config_file(path: &Path) -> Result<Config, ConfigError> {
    let content = fs::read_to_string(path)?;
    parse_config(&content)
}

/// Parse and validate config text.
pub fn parse_config(content: &str) -> Result<Config, ConfigError> {
    let config: Config = toml::from_str(content)?;
    config.validate()?;
    Ok(config)
}

/// Returns a fully-commented stock `filesmith.toml`.
///
/// Used by the `gen-config` CLI command.
pub fn stock_config_toml() -> &'static str {
    r##"# Filesmith Configuration
# =======================
# All settings are optional. Values shown below are the defaults.
# Unknown keys will cause an error.

# Directory holding the input files, relative to the working directory.
source = "src"

# Directory receiving the output files, relative to the working directory.
destination = "build"

# Empty the destination before writing a full build.
clean = true

# Maximum number of files read or written at the same time.
# Omit for no limit.
# concurrency = 16

# Glob patterns (relative to the source directory) of files to skip.
ignore = []

# Parse frontmatter at the top of text files: true, false, or a table.
frontmatter = true

# [frontmatter]
# language = "yaml"          # yaml | json | toml
# delimiters = "---"         # or ["<open>", "<close>"]
# excerpt = false            # store the text before excerpt_separator as `excerpt`
# excerpt_separator = "---"

# Rebuild on change: true, false, a list of paths, or a table.
watch = false

# [watch]
# paths = ["src"]            # defaults to the source directory
# debounce_ms = 50

# ---------------------------------------------------------------------------
# Global metadata, visible to every plugin
# ---------------------------------------------------------------------------
[metadata]
# sitename = "My Site"

# ---------------------------------------------------------------------------
# Build environment (case-insensitive names; string, number, bool values)
# ---------------------------------------------------------------------------
[env]
# DEBUG = "filesmith*"
"##
}
