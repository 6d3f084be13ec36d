//! Ignore specification.
//!
//! An ignore list mixes glob patterns and predicates over `(relative path,
//! stats)`. A path ignored by either kind is excluded from reading and from
//! watch-driven cache updates. Globs are checked first because they need
//! nothing but the path; predicates run only on survivors, since each one
//! costs a `stat`.
//!
//! A glob without a `/` is matched against the last path segment at any
//! depth: `*.swp` ignores `posts/a.swp` as well as `a.swp`. Globs containing
//! a `/` are anchored at the source root.

use crate::error::Result;
use crate::file::Stats;
use crate::matcher::{MatchOptions, Matcher};
use std::fmt;
use std::sync::Arc;

type PredicateFn = dyn Fn(&str, &Stats) -> bool + Send + Sync;

/// One entry of an ignore list.
#[derive(Clone)]
pub enum IgnoreRule {
    Glob(String),
    Predicate(Arc<PredicateFn>),
}

impl IgnoreRule {
    pub fn predicate<F>(f: F) -> Self
    where
        F: Fn(&str, &Stats) -> bool + Send + Sync + 'static,
    {
        IgnoreRule::Predicate(Arc::new(f))
    }
}

impl fmt::Debug for IgnoreRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IgnoreRule::Glob(pattern) => f.debug_tuple("Glob").field(pattern).finish(),
            IgnoreRule::Predicate(_) => f.write_str("Predicate(..)"),
        }
    }
}

impl From<&str> for IgnoreRule {
    fn from(pattern: &str) -> Self {
        IgnoreRule::Glob(pattern.to_string())
    }
}

impl From<String> for IgnoreRule {
    fn from(pattern: String) -> Self {
        IgnoreRule::Glob(pattern)
    }
}

/// A compiled ignore list.
#[derive(Clone, Default)]
pub struct Ignore {
    rules: Vec<IgnoreRule>,
    globs: Option<Matcher>,
    predicates: Vec<Arc<PredicateFn>>,
}

impl Ignore {
    pub fn new(rules: Vec<IgnoreRule>) -> Result<Self> {
        let patterns: Vec<String> = rules
            .iter()
            .filter_map(|r| match r {
                IgnoreRule::Glob(p) => Some(any_depth(p)),
                IgnoreRule::Predicate(_) => None,
            })
            .collect();
        let globs = if patterns.is_empty() {
            None
        } else {
            Some(Matcher::new(&patterns, &MatchOptions::default())?)
        };
        let predicates = rules
            .iter()
            .filter_map(|r| match r {
                IgnoreRule::Predicate(f) => Some(Arc::clone(f)),
                IgnoreRule::Glob(_) => None,
            })
            .collect();
        Ok(Self {
            rules,
            globs,
            predicates,
        })
    }

    pub fn rules(&self) -> &[IgnoreRule] {
        &self.rules
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Whether any predicate rules exist, i.e. whether survivors of the glob
    /// phase need a `stat`.
    pub fn needs_stats(&self) -> bool {
        !self.predicates.is_empty()
    }

    /// Cheap phase: glob patterns only.
    pub fn matches_pattern(&self, rel_path: &str) -> bool {
        self.globs.as_ref().is_some_and(|m| m.is_match(rel_path))
    }

    /// Expensive phase: predicates over path and stats.
    pub fn matches_predicate(&self, rel_path: &str, stats: &Stats) -> bool {
        self.predicates.iter().any(|f| f(rel_path, stats))
    }

    /// Both phases, pattern first.
    pub fn is_ignored(&self, rel_path: &str, stats: Option<&Stats>) -> bool {
        if self.matches_pattern(rel_path) {
            return true;
        }
        match stats {
            Some(stats) => self.matches_predicate(rel_path, stats),
            None => false,
        }
    }

    /// Whether `rel_path` or one of its parent directories is ignored by a
    /// pattern.
    pub fn covers(&self, rel_path: &str) -> bool {
        let mut prefix = String::with_capacity(rel_path.len());
        for segment in rel_path.split('/') {
            if !prefix.is_empty() {
                prefix.push('/');
            }
            prefix.push_str(segment);
            if self.matches_pattern(&prefix) {
                return true;
            }
        }
        false
    }
}

/// `name` → `**/name`, keeping a leading `!`. Patterns with a `/` are
/// returned unchanged.
fn any_depth(pattern: &str) -> String {
    let (negated, body) = match pattern.strip_prefix('!') {
        Some(rest) if !rest.starts_with('(') => ("!", rest),
        _ => ("", pattern),
    };
    if body.contains('/') {
        pattern.to_string()
    } else {
        format!("{negated}**/{body}")
    }
}

impl fmt::Debug for Ignore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Ignore").field("rules", &self.rules).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stats(size: u64) -> Stats {
        Stats {
            size,
            is_file: true,
            is_dir: false,
            is_symlink: false,
            mode: 0o100644,
            modified: None,
            accessed: None,
            created: None,
        }
    }

    #[test]
    fn empty_ignores_nothing() {
        let ignore = Ignore::default();
        assert!(!ignore.is_ignored("a.md", Some(&stats(1))));
        assert!(!ignore.needs_stats());
    }

    #[test]
    fn glob_rule_matches() {
        let ignore = Ignore::new(vec!["**/*.tmp".into(), "drafts".into()]).unwrap();
        assert!(ignore.matches_pattern("x/y.tmp"));
        assert!(ignore.matches_pattern("drafts"));
        assert!(!ignore.matches_pattern("drafts/a.md"));
        assert!(ignore.covers("drafts/a.md"));
        assert!(!ignore.covers("posts/a.md"));
    }

    #[test]
    fn slashless_globs_match_at_any_depth() {
        let ignore = Ignore::new(vec!["*.swp".into(), ".DS_Store".into()]).unwrap();
        assert!(ignore.matches_pattern("a.md.swp"));
        assert!(ignore.matches_pattern("posts/b.md.swp"));
        assert!(ignore.matches_pattern("posts/2024/.DS_Store"));
        assert!(!ignore.matches_pattern("posts/b.md"));
    }

    #[test]
    fn globs_with_a_slash_stay_anchored() {
        let ignore = Ignore::new(vec!["posts/*.md".into()]).unwrap();
        assert!(ignore.matches_pattern("posts/a.md"));
        assert!(!ignore.matches_pattern("archive/posts/a.md"));
        assert_eq!(any_depth("!keep.md"), "!**/keep.md");
        assert_eq!(any_depth("a/b"), "a/b");
    }

    #[test]
    fn predicate_rule_needs_stats() {
        let ignore = Ignore::new(vec![IgnoreRule::predicate(|_, s| s.size == 0)]).unwrap();
        assert!(ignore.needs_stats());
        assert!(ignore.is_ignored("empty.md", Some(&stats(0))));
        assert!(!ignore.is_ignored("full.md", Some(&stats(10))));
        assert!(!ignore.is_ignored("empty.md", None));
    }

    #[test]
    fn either_kind_ignores() {
        let ignore = Ignore::new(vec![
            "*.log".into(),
            IgnoreRule::predicate(|path, _| path.starts_with("secret")),
        ])
        .unwrap();
        assert!(ignore.is_ignored("debug.log", None));
        assert!(ignore.is_ignored("secret.md", Some(&stats(3))));
        assert!(!ignore.is_ignored("index.md", Some(&stats(3))));
    }

    #[test]
    fn invalid_glob_rejected_at_construction() {
        let err = Ignore::new(vec!["[".into()]).unwrap_err();
        assert_eq!(err.code(), "invalid_pattern");
    }
}
