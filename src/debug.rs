//! Named debug channels for plugins and the watch loop.
//!
//! `Debugger::new("my-plugin", &env)` returns a channel with four levels.
//! Each level logs through [`tracing`] with a `namespace` field:
//!
//! ```text
//! dbg.debug(format_args!("..."))  → DEBUG  namespace=my-plugin
//! dbg.info(format_args!("..."))   → INFO   namespace=my-plugin:info
//! dbg.warn(format_args!("..."))   → WARN   namespace=my-plugin:warn
//! dbg.error(format_args!("..."))  → ERROR  namespace=my-plugin:error
//! ```
//!
//! When the environment has a `DEBUG` entry, it selects channels: a comma or
//! whitespace separated list of globs, `-` prefixed entries disable
//! (`DEBUG="my-plugin*,-my-plugin:info"`). Without a `DEBUG` entry every
//! channel is forwarded and the subscriber's own filter decides.

use crate::env::Environment;
use crate::error::{Error, Result};
use crate::matcher::{MatchOptions, Matcher};
use std::fmt;

/// Characters shown by [`preview`] before truncation.
const PREVIEW_CHARS: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Level {
    Debug,
    Info,
    Warn,
    Error,
}

/// Channel selection parsed from a `DEBUG` value.
#[derive(Debug, Clone)]
struct Selection {
    enable: Matcher,
    disable: Matcher,
}

impl Selection {
    fn parse(spec: &str) -> Result<Self> {
        let mut enable = Vec::new();
        let mut disable = Vec::new();
        for item in spec.split(|c: char| c == ',' || c.is_whitespace()) {
            match item.strip_prefix('-') {
                Some(rest) if !rest.is_empty() => disable.push(flatten(rest)),
                Some(_) => {}
                None if !item.is_empty() => enable.push(flatten(item)),
                None => {}
            }
        }
        let options = MatchOptions::default();
        Ok(Self {
            enable: Matcher::new(&enable, &options)?,
            disable: Matcher::new(&disable, &options)?,
        })
    }

    fn allows(&self, channel: &str) -> bool {
        let channel = flatten(channel);
        let channel = channel.as_str();
        !self.enable.is_empty()
            && self.enable.is_match(channel)
            && (self.disable.is_empty() || !self.disable.is_match(channel))
    }
}

/// Namespaces are flat names, so `*` has to match across `/` too.
fn flatten(name: &str) -> String {
    name.replace('/', ":")
}

/// A named debug channel.
#[derive(Debug, Clone)]
pub struct Debugger {
    namespace: String,
    selection: Option<Selection>,
}

impl Debugger {
    /// Create a channel. Namespaces must be non-empty.
    pub fn new(namespace: &str, env: &Environment) -> Result<Self> {
        if namespace.trim().is_empty() {
            return Err(Error::Config(format!(
                "invalid debugger namespace {namespace:?}"
            )));
        }
        let selection = match env.get("DEBUG") {
            Some(value) if !value.is_null() => match value.as_bool() {
                Some(false) => Some(Selection::parse("")?),
                Some(true) => Some(Selection::parse("*")?),
                None => Some(Selection::parse(&value.to_string())?),
            },
            _ => None,
        };
        Ok(Self {
            namespace: namespace.to_string(),
            selection,
        })
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Whether the base channel is selected.
    pub fn enabled(&self) -> bool {
        self.channel_enabled(&self.namespace)
    }

    pub fn debug(&self, args: fmt::Arguments<'_>) {
        self.emit(Level::Debug, args);
    }

    pub fn info(&self, args: fmt::Arguments<'_>) {
        self.emit(Level::Info, args);
    }

    pub fn warn(&self, args: fmt::Arguments<'_>) {
        self.emit(Level::Warn, args);
    }

    pub fn error(&self, args: fmt::Arguments<'_>) {
        self.emit(Level::Error, args);
    }

    fn channel(&self, level: Level) -> String {
        match level {
            Level::Debug => self.namespace.clone(),
            Level::Info => format!("{}:info", self.namespace),
            Level::Warn => format!("{}:warn", self.namespace),
            Level::Error => format!("{}:error", self.namespace),
        }
    }

    fn channel_enabled(&self, channel: &str) -> bool {
        self.selection.as_ref().is_none_or(|s| s.allows(channel))
    }

    fn emit(&self, level: Level, args: fmt::Arguments<'_>) {
        let channel = self.channel(level);
        if !self.channel_enabled(&channel) {
            return;
        }
        match level {
            Level::Debug => tracing::debug!(namespace = %channel, "{}", args),
            Level::Info => tracing::info!(namespace = %channel, "{}", args),
            Level::Warn => tracing::warn!(namespace = %channel, "{}", args),
            Level::Error => tracing::error!(namespace = %channel, "{}", args),
        }
    }
}

/// Render file contents for a log line: the first 200 characters of UTF-8
/// text followed by `...`, or a byte count for binary content.
pub fn preview(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(text) => {
            let head: String = text.chars().take(PREVIEW_CHARS).collect();
            format!("{head}...")
        }
        Err(_) => format!("<{} bytes>", bytes.len()),
    }
}
