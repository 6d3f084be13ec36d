//! The `Filesmith` builder: build settings plus the operations that use them.
//!
//! ```text
//! build()    = process() → clean destination (if enabled) → write()
//! process()  = read() → run()
//! read()     = source dir → Files
//! run()      = plugins over Files
//! write()    = Files → destination dir
//! watch()    = build(), then incremental rebuilds on change
//! ```
//!
//! Setters consume and return the builder so a build can be described in one
//! expression; setters that validate their input return [`Result`].
//! `Filesmith` is cheap to clone: plugins are shared behind `Arc`.

use crate::config::Config;
use crate::debug::Debugger;
use crate::env::{EnvValue, Environment};
use crate::error::{Error, Result};
use crate::file::{File, Files, Metadata};
use crate::ignore::{Ignore, IgnoreRule};
use crate::matcher::{self, MatchOptions};
use crate::matter::{Matter, MatterOptions};
use crate::plugin::{self, BoxedPlugin, Context, Plugin};
use crate::reader::{self, ReadOptions};
use crate::watch::{self, WatchHandle, WatchOptions};
use crate::writer;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::info;

/// Build settings and plugin chain.
#[derive(Clone)]
pub struct Filesmith {
    directory: PathBuf,
    source: PathBuf,
    destination: PathBuf,
    concurrency: Option<usize>,
    clean: bool,
    frontmatter: Option<MatterOptions>,
    ignore: Ignore,
    metadata: Metadata,
    env: Environment,
    plugins: Vec<BoxedPlugin>,
}

impl Filesmith {
    /// Start a build rooted at `directory`. Source and destination default to
    /// `src` and `build` inside it.
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
            source: PathBuf::from("src"),
            destination: PathBuf::from("build"),
            concurrency: None,
            clean: true,
            frontmatter: Some(MatterOptions::default()),
            ignore: Ignore::default(),
            metadata: Metadata::new(),
            env: Environment::new(),
            plugins: Vec::new(),
        }
    }

    /// Apply a loaded configuration file on top of the defaults.
    pub fn from_config(directory: impl Into<PathBuf>, config: &Config) -> Result<Self> {
        let mut smith = Self::new(directory)
            .source(&config.source)
            .destination(&config.destination)
            .clean(config.clean)
            .frontmatter(config.frontmatter.options())
            .metadata(config.metadata.clone())
            .env_all(config.env.iter().map(|(k, v)| (k.to_string(), v.clone())))
            .ignore(config.ignore.iter().map(String::as_str))?;
        if let Some(limit) = config.concurrency {
            smith = smith.concurrency(limit)?;
        }
        Ok(smith)
    }

    // ========================================================================
    // Settings
    // ========================================================================

    pub fn directory(mut self, directory: impl Into<PathBuf>) -> Self {
        self.directory = directory.into();
        self
    }

    /// Source directory, relative to the working directory unless absolute.
    pub fn source(mut self, source: impl Into<PathBuf>) -> Self {
        self.source = source.into();
        self
    }

    /// Destination directory, relative to the working directory unless
    /// absolute.
    pub fn destination(mut self, destination: impl Into<PathBuf>) -> Self {
        self.destination = destination.into();
        self
    }

    /// Maximum number of files read or written at once. Must be at least 1.
    pub fn concurrency(mut self, limit: usize) -> Result<Self> {
        if limit == 0 {
            return Err(Error::Config("concurrency must be at least 1".into()));
        }
        self.concurrency = Some(limit);
        Ok(self)
    }

    /// Whether `build()` empties the destination before writing.
    pub fn clean(mut self, clean: bool) -> Self {
        self.clean = clean;
        self
    }

    /// Enable (with options) or disable frontmatter parsing.
    pub fn frontmatter(mut self, options: Option<MatterOptions>) -> Self {
        self.frontmatter = options;
        self
    }

    /// Add ignore rules to the existing ones.
    pub fn ignore<I, R>(mut self, rules: I) -> Result<Self>
    where
        I: IntoIterator<Item = R>,
        R: Into<IgnoreRule>,
    {
        let mut all = self.ignore.rules().to_vec();
        all.extend(rules.into_iter().map(Into::into));
        self.ignore = Ignore::new(all)?;
        Ok(self)
    }

    /// Merge keys into the global metadata.
    pub fn metadata(mut self, metadata: Metadata) -> Self {
        self.metadata.extend(metadata);
        self
    }

    pub fn env(mut self, name: &str, value: impl Into<EnvValue>) -> Self {
        self.env.set(name, value);
        self
    }

    /// Merge variables into the environment.
    pub fn env_all<K, V, I>(mut self, vars: I) -> Self
    where
        K: AsRef<str>,
        V: Into<EnvValue>,
        I: IntoIterator<Item = (K, V)>,
    {
        self.env.extend(vars);
        self
    }

    /// Replace the whole environment.
    pub fn set_env_all(mut self, env: Environment) -> Self {
        self.env = env;
        self
    }

    /// Append a plugin to the chain.
    pub fn plugin(mut self, plugin: impl Plugin + 'static) -> Self {
        self.plugins.push(Arc::new(plugin));
        self
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub fn working_dir(&self) -> &Path {
        &self.directory
    }

    /// Resolved source directory.
    pub fn source_dir(&self) -> PathBuf {
        self.path([&self.source])
    }

    /// Resolved destination directory.
    pub fn destination_dir(&self) -> PathBuf {
        self.path([&self.destination])
    }

    pub fn concurrency_limit(&self) -> Option<usize> {
        self.concurrency
    }

    pub fn cleans(&self) -> bool {
        self.clean
    }

    /// The configured frontmatter parser, or `None` when disabled.
    pub fn matter(&self) -> Option<Matter> {
        self.frontmatter.clone().map(Matter::new)
    }

    pub fn ignores(&self) -> &Ignore {
        &self.ignore
    }

    pub fn global_metadata(&self) -> &Metadata {
        &self.metadata
    }

    pub fn environment(&self) -> &Environment {
        &self.env
    }

    /// Look up one environment variable (case-insensitive).
    pub fn env_var(&self, name: &str) -> Option<&EnvValue> {
        self.env.get(name)
    }

    pub fn plugins(&self) -> &[BoxedPlugin] {
        &self.plugins
    }

    /// Resolve `parts` against the working directory. An absolute part
    /// replaces everything before it.
    pub fn path<P: AsRef<Path>>(&self, parts: impl IntoIterator<Item = P>) -> PathBuf {
        parts
            .into_iter()
            .fold(self.directory.clone(), |acc, part| acc.join(part))
    }

    /// Glob-match `input` paths (typically store keys).
    pub fn match_paths<P, I>(
        &self,
        patterns: &[P],
        input: I,
        options: Option<&MatchOptions>,
    ) -> Result<Vec<String>>
    where
        P: AsRef<str>,
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        let defaults = MatchOptions::default();
        matcher::match_paths(patterns, input, options.unwrap_or(&defaults))
    }

    /// A debug channel gated by this build's `DEBUG` variable.
    pub fn debug(&self, namespace: &str) -> Result<Debugger> {
        Debugger::new(namespace, &self.env)
    }

    // ========================================================================
    // Operations
    // ========================================================================

    /// Read, run every plugin, then write to the destination. The destination
    /// is only cleaned after the plugins succeed, so a failing build leaves
    /// the previous output in place.
    pub fn build(&self) -> Result<Files> {
        let started = Instant::now();
        let files = self.process()?;
        let destination = self.destination_dir();
        if self.clean {
            writer::clean_dir(&destination)?;
        }
        self.write(&files)?;
        info!(
            destination = %destination.display(),
            files = files.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "build complete"
        );
        Ok(files)
    }

    /// Read the source and run the plugins without writing.
    pub fn process(&self) -> Result<Files> {
        let files = self.read()?;
        self.run(files)
    }

    /// Run this builder's plugins over `files`.
    pub fn run(&self, files: Files) -> Result<Files> {
        self.run_with(files, &self.plugins)
    }

    /// Run an explicit plugin list over `files`.
    pub fn run_with(&self, mut files: Files, plugins: &[BoxedPlugin]) -> Result<Files> {
        let mut ctx = Context::new(self.clone());
        plugin::run_plugins(&mut files, plugins, &mut ctx)?;
        Ok(files)
    }

    /// Read the source directory.
    pub fn read(&self) -> Result<Files> {
        self.read_dir(&self.source_dir())
    }

    /// Read `dir`, relative to the working directory unless absolute.
    pub fn read_dir(&self, dir: impl AsRef<Path>) -> Result<Files> {
        let dir = self.path([dir]);
        let matter = self.matter();
        reader::read_dir(
            &dir,
            &ReadOptions {
                ignore: &self.ignore,
                concurrency: self.concurrency,
                matter: matter.as_ref(),
            },
        )
    }

    /// Read one file, relative to the source directory unless absolute.
    pub fn read_file(&self, path: impl AsRef<Path>) -> Result<File> {
        let path = self.source_dir().join(path);
        reader::read_file(&path, self.matter().as_ref())
    }

    /// Write `files` to the destination directory.
    pub fn write(&self, files: &Files) -> Result<()> {
        self.write_to(files, &self.destination_dir())
    }

    /// Write `files` under `dir`, relative to the working directory unless
    /// absolute.
    pub fn write_to(&self, files: &Files, dir: impl AsRef<Path>) -> Result<()> {
        writer::write_files(files, &self.path([dir]), self.concurrency)
    }

    /// Write one file, relative to the destination directory unless absolute.
    /// A relative path may not climb out of the destination.
    pub fn write_file(&self, path: impl AsRef<Path>, file: &File) -> Result<()> {
        let path = path.as_ref();
        let target = if path.is_absolute() {
            path.to_path_buf()
        } else {
            writer::output_path(&self.destination_dir(), path)?
        };
        writer::write_file(&target, file)
    }

    /// Build once, then rebuild whenever watched paths change.
    pub fn watch(&self, options: WatchOptions) -> Result<WatchHandle> {
        watch::start(self.clone(), options)
    }
}

impl fmt::Debug for Filesmith {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let plugins: Vec<&str> = self.plugins.iter().map(|p| p.name()).collect();
        f.debug_struct("Filesmith")
            .field("directory", &self.directory)
            .field("source", &self.source)
            .field("destination", &self.destination)
            .field("concurrency", &self.concurrency)
            .field("clean", &self.clean)
            .field("frontmatter", &self.frontmatter)
            .field("ignore", &self.ignore.rules())
            .field("metadata", &self.metadata)
            .field("env", &self.env)
            .field("plugins", &plugins)
            .finish()
    }
}
