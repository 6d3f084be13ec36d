//! Frontmatter parsing and serialization.
//!
//! A file may start with a delimited metadata block:
//!
//! ```text
//! ---
//! title: Hello
//! tags: [a, b]
//! ---
//! Body text.
//! ```
//!
//! [`Matter::parse`] turns the block into [`File`] metadata and keeps
//! everything after the closing delimiter as `contents`. Content that does not
//! start with the opening delimiter passes through untouched.
//!
//! ## Languages
//!
//! The block is YAML by default. JSON and TOML are also supported, chosen
//! through [`MatterOptions::language`] or inline right after the opening
//! delimiter (`---json`, `---toml`).
//!
//! ## Excerpts
//!
//! With `excerpt` enabled, the body text before the first `excerpt_separator`
//! is trimmed into an `excerpt` metadata field and removed, together with the
//! separator, from `contents`.

use crate::file::{File, Metadata};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MatterError {
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
    #[error("Frontmatter must be a key/value mapping, found {0}")]
    NotAMapping(&'static str),
    #[error("Unsupported frontmatter language: {0}")]
    UnsupportedLanguage(String),
}

/// Structured format of the metadata block.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[default]
    Yaml,
    Json,
    Toml,
}

impl Language {
    fn from_name(name: &str) -> Result<Self, MatterError> {
        match name.to_ascii_lowercase().as_str() {
            "yaml" | "yml" => Ok(Language::Yaml),
            "json" => Ok(Language::Json),
            "toml" => Ok(Language::Toml),
            other => Err(MatterError::UnsupportedLanguage(other.to_string())),
        }
    }
}

/// Opening and closing delimiters: one string for both, or a pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Delimiters {
    Same(String),
    Pair(String, String),
}

impl Delimiters {
    pub fn open(&self) -> &str {
        match self {
            Delimiters::Same(d) => d,
            Delimiters::Pair(open, _) => open,
        }
    }

    pub fn close(&self) -> &str {
        match self {
            Delimiters::Same(d) => d,
            Delimiters::Pair(_, close) => close,
        }
    }
}

impl Default for Delimiters {
    fn default() -> Self {
        Delimiters::Same("---".to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MatterOptions {
    /// Extract an excerpt from the body.
    pub excerpt: bool,
    /// Separator ending the excerpt. Defaults to `---`.
    pub excerpt_separator: String,
    pub language: Language,
    pub delimiters: Delimiters,
}

impl Default for MatterOptions {
    fn default() -> Self {
        Self {
            excerpt: false,
            excerpt_separator: "---".to_string(),
            language: Language::Yaml,
            delimiters: Delimiters::default(),
        }
    }
}

/// A configured frontmatter parser.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Matter {
    options: MatterOptions,
}

impl Matter {
    pub fn new(options: MatterOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &MatterOptions {
        &self.options
    }

    /// Parse raw bytes into a file record.
    ///
    /// Non-UTF-8 input is returned unchanged with no metadata.
    pub fn parse(&self, input: &[u8]) -> Result<File, MatterError> {
        let Ok(text) = std::str::from_utf8(input) else {
            return Ok(File::new(input));
        };

        let (mut metadata, mut body) = match self.split(text)? {
            Some((metadata, body)) => (metadata, body.to_string()),
            None => (Metadata::new(), text.to_string()),
        };

        if self.options.excerpt
            && let Some((excerpt, rest)) = extract_excerpt(&body, &self.options.excerpt_separator)
        {
            metadata.insert("excerpt".to_string(), Value::String(excerpt));
            body = rest;
        }

        let mut file = File::new(body);
        file.metadata = metadata;
        Ok(file)
    }

    /// Serialize a record's metadata back into a frontmatter block followed
    /// by its contents. Records without metadata serialize to their contents.
    pub fn stringify(&self, file: &File) -> Result<Vec<u8>, MatterError> {
        let mut out = Vec::with_capacity(file.contents.len() + 64);
        if !file.metadata.is_empty() {
            let data = self.serialize_metadata(&file.metadata)?;
            out.extend_from_slice(self.wrap(data.trim_end()).as_bytes());
            out.push(b'\n');
        }
        out.extend_from_slice(&file.contents);
        if out.last() != Some(&b'\n') {
            out.push(b'\n');
        }
        Ok(out)
    }

    /// Surround already-serialized metadata with the configured delimiters.
    pub fn wrap(&self, data: &str) -> String {
        let delimiters = &self.options.delimiters;
        [delimiters.open(), data, delimiters.close()].join("\n")
    }

    /// Split `text` into parsed metadata and the remaining body.
    ///
    /// Returns `None` when `text` does not open with a frontmatter block.
    fn split<'a>(&self, text: &'a str) -> Result<Option<(Metadata, &'a str)>, MatterError> {
        let open = self.options.delimiters.open();
        let close = self.options.delimiters.close();

        let Some(after_open) = text.strip_prefix(open) else {
            return Ok(None);
        };
        // `----` is a horizontal rule, not an opening delimiter.
        if open.chars().last().is_some_and(|c| after_open.starts_with(c)) {
            return Ok(None);
        }

        let (first_line, mut rest) = match after_open.find('\n') {
            Some(i) => (&after_open[..i], &after_open[i + 1..]),
            None => (after_open, ""),
        };
        let inline = first_line.trim();
        let language = if inline.is_empty() {
            self.options.language
        } else {
            Language::from_name(inline)?
        };

        let (block, body) = if rest.starts_with(close) {
            ("", &rest[close.len()..])
        } else if let Some(i) = rest.find(&format!("\n{close}")) {
            let block = &rest[..i + 1];
            rest = &rest[i + 1 + close.len()..];
            (block, rest)
        } else {
            (rest, "")
        };

        let body = body
            .strip_prefix("\r\n")
            .or_else(|| body.strip_prefix('\n'))
            .unwrap_or(body);
        let metadata = parse_block(language, block)?;
        Ok(Some((metadata, body)))
    }

    fn serialize_metadata(&self, metadata: &Metadata) -> Result<String, MatterError> {
        Ok(match self.options.language {
            Language::Yaml => serde_yaml::to_string(metadata)?,
            Language::Json => serde_json::to_string_pretty(metadata)?,
            Language::Toml => toml::to_string(metadata)?,
        })
    }
}

fn parse_block(language: Language, block: &str) -> Result<Metadata, MatterError> {
    let has_content = block
        .lines()
        .any(|line| !line.trim().is_empty() && !line.trim_start().starts_with('#'));
    if !has_content {
        return Ok(Metadata::new());
    }

    let value: Value = match language {
        Language::Yaml => serde_yaml::from_str(block)?,
        Language::Json => serde_json::from_str(block)?,
        Language::Toml => serde_json::to_value(toml::from_str::<toml::Table>(block)?)?,
    };

    match value {
        Value::Object(map) => Ok(map),
        Value::Null => Ok(Metadata::new()),
        Value::Bool(_) => Err(MatterError::NotAMapping("a boolean")),
        Value::Number(_) => Err(MatterError::NotAMapping("a number")),
        Value::String(_) => Err(MatterError::NotAMapping("a string")),
        Value::Array(_) => Err(MatterError::NotAMapping("a list")),
    }
}

/// Split off the text before `separator`. Returns the trimmed excerpt and the
/// body with excerpt and separator removed.
fn extract_excerpt(body: &str, separator: &str) -> Option<(String, String)> {
    if separator.is_empty() {
        return None;
    }
    let idx = body.find(separator)?;
    let head = &body[..idx];
    let excerpt = head.trim();
    if excerpt.is_empty() {
        return None;
    }
    let rest = if head.trim_start() == head {
        body[idx + separator.len()..].trim_start().to_string()
    } else {
        body.to_string()
    };
    Some((excerpt.to_string(), rest))
}
