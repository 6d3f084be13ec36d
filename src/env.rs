//! Build environment variables.
//!
//! A small typed key/value bag that plugins consult for build-wide switches
//! (`NODE_ENV`-style modes, `DEBUG` channel selection). Names are
//! case-insensitive and stored upper-case; values are primitives only.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// A primitive environment value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EnvValue {
    Null,
    Bool(bool),
    Number(f64),
    String(String),
}

impl EnvValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            EnvValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            EnvValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            EnvValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, EnvValue::Null)
    }
}

impl fmt::Display for EnvValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EnvValue::Null => f.write_str("null"),
            EnvValue::Bool(b) => write!(f, "{b}"),
            EnvValue::Number(n) => write!(f, "{n}"),
            EnvValue::String(s) => f.write_str(s),
        }
    }
}

impl From<&str> for EnvValue {
    fn from(s: &str) -> Self {
        EnvValue::String(s.to_string())
    }
}

impl From<String> for EnvValue {
    fn from(s: String) -> Self {
        EnvValue::String(s)
    }
}

impl From<bool> for EnvValue {
    fn from(b: bool) -> Self {
        EnvValue::Bool(b)
    }
}

impl From<f64> for EnvValue {
    fn from(n: f64) -> Self {
        EnvValue::Number(n)
    }
}

impl From<i64> for EnvValue {
    fn from(n: i64) -> Self {
        EnvValue::Number(n as f64)
    }
}

impl From<i32> for EnvValue {
    fn from(n: i32) -> Self {
        EnvValue::Number(f64::from(n))
    }
}

impl<T: Into<EnvValue>> From<Option<T>> for EnvValue {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(EnvValue::Null)
    }
}

/// Case-insensitive environment bag.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(
    from = "BTreeMap<String, EnvValue>",
    into = "BTreeMap<String, EnvValue>"
)]
pub struct Environment {
    vars: BTreeMap<String, EnvValue>,
}

impl From<BTreeMap<String, EnvValue>> for Environment {
    fn from(vars: BTreeMap<String, EnvValue>) -> Self {
        let mut env = Environment::new();
        env.extend(vars);
        env
    }
}

impl From<Environment> for BTreeMap<String, EnvValue> {
    fn from(env: Environment) -> Self {
        env.vars
    }
}

impl Environment {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&EnvValue> {
        self.vars.get(&name.to_uppercase())
    }

    pub fn set(&mut self, name: &str, value: impl Into<EnvValue>) {
        self.vars.insert(name.to_uppercase(), value.into());
    }

    /// Merge `vars` in, overwriting existing names but removing none.
    pub fn extend<K, V, I>(&mut self, vars: I)
    where
        K: AsRef<str>,
        V: Into<EnvValue>,
        I: IntoIterator<Item = (K, V)>,
    {
        for (name, value) in vars {
            self.set(name.as_ref(), value);
        }
    }

    /// All variables, names upper-cased.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &EnvValue)> {
        self.vars.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }
}
