//! Glob-based path matching.
//!
//! Patterns follow the usual shell glob dialect, compiled with [`globset`]:
//!
//! | Pattern | Matches |
//! |---------|---------|
//! | `*.md` | markdown files in the root only (`*` never crosses `/`) |
//! | `**/*.md` | markdown files at any depth |
//! | `posts/{a,b}.md` | `posts/a.md` and `posts/b.md` |
//! | `*.(md\|html)` or `*.@(md\|html)` | either extension |
//! | `!drafts/**` | excludes everything under `drafts/` |
//!
//! A path matches when it matches at least one positive pattern and no
//! negated one. A list made only of negations matches everything it does not
//! exclude. An empty list matches nothing. Backslashes in input paths are
//! canonicalized to `/` before matching so the same pattern behaves
//! identically on every host.

use crate::error::{Error, Result};
use crate::file::to_slash;
use globset::{Glob, GlobBuilder, GlobSet, GlobSetBuilder};

/// Options for [`match_paths`] and [`Matcher`].
#[derive(Debug, Clone)]
pub struct MatchOptions {
    /// Let wildcards match path segments starting with a dot.
    pub dot: bool,
    pub case_insensitive: bool,
}

impl Default for MatchOptions {
    fn default() -> Self {
        Self {
            dot: true,
            case_insensitive: false,
        }
    }
}

/// A compiled list of include/exclude patterns.
#[derive(Debug, Clone)]
pub struct Matcher {
    includes: GlobSet,
    /// Per include pattern: whether it names a dot segment explicitly.
    include_dot: Vec<bool>,
    excludes: GlobSet,
    dot: bool,
}

impl Matcher {
    pub fn new<S: AsRef<str>>(patterns: &[S], options: &MatchOptions) -> Result<Self> {
        let mut includes = GlobSetBuilder::new();
        let mut include_dot = Vec::new();
        let mut excludes = GlobSetBuilder::new();

        for raw in patterns {
            let raw = raw.as_ref();
            match negation(raw) {
                Some(rest) => {
                    excludes.add(compile(rest, options)?);
                }
                None => {
                    includes.add(compile(raw, options)?);
                    include_dot.push(names_dot_segment(raw));
                }
            }
        }

        Ok(Self {
            includes: build(includes)?,
            include_dot,
            excludes: build(excludes)?,
            dot: options.dot,
        })
    }

    pub fn is_match(&self, path: &str) -> bool {
        if self.is_empty() {
            return false;
        }
        let path = canonical(path);
        if self.excludes.is_match(path.as_str()) {
            return false;
        }
        if self.include_dot.is_empty() {
            return self.dot || !has_dot_segment(&path);
        }
        let hits = self.includes.matches(path.as_str());
        if hits.is_empty() {
            return false;
        }
        self.dot || !has_dot_segment(&path) || hits.iter().any(|&i| self.include_dot[i])
    }

    /// True when the pattern list contained no patterns at all.
    pub fn is_empty(&self) -> bool {
        self.include_dot.is_empty() && self.excludes.is_empty()
    }
}

/// Filter `input` down to the paths matching `patterns`, sorted and
/// de-duplicated.
pub fn match_paths<P, I>(patterns: &[P], input: I, options: &MatchOptions) -> Result<Vec<String>>
where
    P: AsRef<str>,
    I: IntoIterator,
    I::Item: AsRef<str>,
{
    let matcher = Matcher::new(patterns, options)?;
    let mut out: Vec<String> = input
        .into_iter()
        .map(|p| canonical(p.as_ref()))
        .filter(|p| matcher.is_match(p))
        .collect();
    out.sort();
    out.dedup();
    Ok(out)
}

fn compile(pattern: &str, options: &MatchOptions) -> Result<Glob> {
    let translated = translate_alternation(&canonical_pattern(pattern));
    GlobBuilder::new(&translated)
        .literal_separator(true)
        .case_insensitive(options.case_insensitive)
        .backslash_escape(true)
        .build()
        .map_err(|source| Error::Glob {
            pattern: pattern.to_string(),
            source,
        })
}

fn build(builder: GlobSetBuilder) -> Result<GlobSet> {
    builder.build().map_err(|source| Error::Glob {
        pattern: String::new(),
        source,
    })
}

/// `!pattern` → `Some("pattern")`. `!(a|b)` is an extglob, not a negation.
fn negation(pattern: &str) -> Option<&str> {
    pattern
        .strip_prefix('!')
        .filter(|rest| !rest.starts_with('('))
}

fn canonical(path: &str) -> String {
    let path = to_slash(path);
    match path.strip_prefix("./") {
        Some(rest) => rest.to_string(),
        None => path,
    }
}

fn canonical_pattern(pattern: &str) -> String {
    pattern.strip_prefix("./").unwrap_or(pattern).to_string()
}

/// Rewrite `(a|b)`, `@(a|b)` and `+(a|b)` groups into `{a,b}` alternations.
fn translate_alternation(pattern: &str) -> String {
    let chars: Vec<char> = pattern.chars().collect();
    let mut out = String::with_capacity(pattern.len());
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        let opens_group = c == '(' || (matches!(c, '@' | '+') && chars.get(i + 1) == Some(&'('));
        if opens_group {
            let start = if c == '(' { i + 1 } else { i + 2 };
            if let Some(len) = chars[start..].iter().position(|&ch| ch == ')') {
                let inner: String = chars[start..start + len].iter().collect();
                if inner.contains('|') {
                    out.push('{');
                    out.push_str(&inner.replace('|', ","));
                    out.push('}');
                    i = start + len + 1;
                    continue;
                }
            }
        }
        if c == '\\'
            && let Some(&next) = chars.get(i + 1)
        {
            out.push(c);
            out.push(next);
            i += 2;
            continue;
        }
        out.push(c);
        i += 1;
    }
    out
}

fn has_dot_segment(path: &str) -> bool {
    path.split('/').any(|seg| seg.starts_with('.') && seg != "." && seg != "..")
}

fn names_dot_segment(pattern: &str) -> bool {
    pattern.split('/').any(|seg| seg.starts_with('.'))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn m(patterns: &[&str], input: &[&str]) -> Vec<String> {
        match_paths(patterns, input, &MatchOptions::default()).unwrap()
    }

    #[test]
    fn negation_only_excludes() {
        assert_eq!(m(&["!index.md"], &["index.md", "other.md"]), vec!["other.md"]);
    }

    #[test]
    fn empty_pattern_list_matches_nothing() {
        let none: [&str; 0] = [];
        assert!(m(&none, &["a.md", ".env"]).is_empty());
        assert!(!Matcher::new(&none, &MatchOptions::default()).unwrap().is_match("a.md"));
    }

    #[test]
    fn star_does_not_cross_separator() {
        assert_eq!(
            m(&["*.md"], &["a.md", "posts/b.md", "c.html"]),
            vec!["a.md"]
        );
    }

    #[test]
    fn globstar_crosses_separators() {
        assert_eq!(
            m(&["**/*.md"], &["a.md", "posts/b.md", "posts/2024/c.md", "d.txt"]),
            vec!["a.md", "posts/2024/c.md", "posts/b.md"]
        );
    }

    #[test]
    fn brace_alternation() {
        assert_eq!(
            m(&["posts/{a,b}.md"], &["posts/a.md", "posts/b.md", "posts/c.md"]),
            vec!["posts/a.md", "posts/b.md"]
        );
    }

    #[test]
    fn extension_or_syntax() {
        let input = ["a.md", "b.html", "c.css"];
        assert_eq!(m(&["*.(md|html)"], &input), vec!["a.md", "b.html"]);
        assert_eq!(m(&["*.@(md|html)"], &input), vec!["a.md", "b.html"]);
    }

    #[test]
    fn include_then_exclude() {
        assert_eq!(
            m(
                &["**/*.md", "!drafts/**"],
                &["a.md", "drafts/wip.md", "posts/b.md"]
            ),
            vec!["a.md", "posts/b.md"]
        );
    }

    #[test]
    fn dotfiles_included_by_default() {
        assert_eq!(m(&["**"], &[".env", "a/.hidden", "b"]), vec![".env", "a/.hidden", "b"]);
    }

    #[test]
    fn dotfiles_excluded_when_disabled() {
        let opts = MatchOptions {
            dot: false,
            ..MatchOptions::default()
        };
        let out = match_paths(&["**"], [".env", "a/.hidden", "b"], &opts).unwrap();
        assert_eq!(out, vec!["b"]);

        let explicit = match_paths(&[".env"], [".env", "b"], &opts).unwrap();
        assert_eq!(explicit, vec![".env"]);
    }

    #[test]
    fn backslash_paths_are_canonicalized() {
        assert_eq!(m(&["posts/*.md"], &["posts\\a.md"]), vec!["posts/a.md"]);
    }

    #[test]
    fn results_sorted_and_deduplicated() {
        assert_eq!(m(&["*"], &["b", "a", "b"]), vec!["a", "b"]);
    }

    #[test]
    fn case_insensitive_option() {
        let opts = MatchOptions {
            case_insensitive: true,
            ..MatchOptions::default()
        };
        let out = match_paths(&["*.MD"], ["a.md"], &opts).unwrap();
        assert_eq!(out, vec!["a.md"]);
    }

    #[test]
    fn invalid_pattern_is_error() {
        let err = Matcher::new(&["a/{b"], &MatchOptions::default()).unwrap_err();
        assert_eq!(err.code(), "invalid_pattern");
    }

    #[test]
    fn translate_leaves_plain_groups_alone() {
        assert_eq!(translate_alternation("a(b).md"), "a(b).md");
        assert_eq!(translate_alternation("*.+(md|txt)"), "*.{md,txt}");
    }
}
