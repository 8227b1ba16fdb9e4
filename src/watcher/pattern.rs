//! Include/exclude glob matching for watched paths.
//!
//! Globs are compiled to anchored regexes. `**` spans directories, `*` and
//! `?` stay inside one path component, `[a-z]` and `[!a-z]` are character
//! classes, `{a,b}` is alternation and `\` escapes the next character. A
//! pattern with no `/` is matched against each component of the path, so
//! `node_modules` excludes everything beneath any `node_modules` directory
//! and `*.js` includes JavaScript files at any depth.

use std::path::{Component, Path};

use regex::Regex;

use super::error::WatcherError;

/// A single compiled glob.
#[derive(Debug, Clone)]
pub struct GlobPattern {
    source: String,
    regex: Regex,
    per_component: bool,
}

impl GlobPattern {
    /// Compile a glob pattern.
    ///
    /// # Errors
    ///
    /// Returns `WatcherError::InvalidPattern` for unclosed classes or braces,
    /// nested braces, or a glob whose translation does not compile.
    pub fn new(pattern: &str) -> Result<Self, WatcherError> {
        let invalid = |reason: String| WatcherError::InvalidPattern {
            pattern: pattern.to_string(),
            reason,
        };
        let translated = glob_to_regex(pattern).map_err(|r| invalid(r.to_string()))?;
        let regex = Regex::new(&translated).map_err(|e| invalid(e.to_string()))?;

        Ok(Self {
            source: pattern.to_string(),
            regex,
            per_component: !pattern.contains('/'),
        })
    }

    /// Check a path relative to the watch root.
    #[must_use]
    pub fn matches(&self, relative: &Path) -> bool {
        if self.per_component {
            relative.components().any(|c| match c {
                Component::Normal(name) => self.regex.is_match(&name.to_string_lossy()),
                _ => false,
            })
        } else {
            self.regex.is_match(&to_slash(relative))
        }
    }

    /// The original glob text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.source
    }
}

/// Include and exclude globs evaluated together.
#[derive(Debug, Clone, Default)]
pub struct GlobSet {
    include: Vec<GlobPattern>,
    exclude: Vec<GlobPattern>,
}

impl GlobSet {
    /// Compile include and exclude lists.
    ///
    /// # Errors
    ///
    /// Returns the first pattern that fails to compile.
    pub fn new<S: AsRef<str>>(include: &[S], exclude: &[S]) -> Result<Self, WatcherError> {
        Ok(Self {
            include: include
                .iter()
                .map(|p| GlobPattern::new(p.as_ref()))
                .collect::<Result<_, _>>()?,
            exclude: exclude
                .iter()
                .map(|p| GlobPattern::new(p.as_ref()))
                .collect::<Result<_, _>>()?,
        })
    }

    /// A path is accepted when it matches no exclude and, if any includes
    /// are configured, at least one include.
    #[must_use]
    pub fn accepts(&self, relative: &Path) -> bool {
        if self.exclude.iter().any(|p| p.matches(relative)) {
            return false;
        }
        self.include.is_empty() || self.include.iter().any(|p| p.matches(relative))
    }
}

fn to_slash(path: &Path) -> String {
    path.components()
        .filter_map(|c| match c {
            Component::Normal(name) => Some(name.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

fn glob_to_regex(pattern: &str) -> Result<String, &'static str> {
    let chars: Vec<char> = pattern.chars().collect();
    let mut out = String::with_capacity(pattern.len() * 2 + 2);
    out.push('^');

    let mut in_group = false;
    let mut i = 0;
    while i < chars.len() {
        match chars[i] {
            '*' if chars.get(i + 1) == Some(&'*') => {
                if chars.get(i + 2) == Some(&'/') {
                    out.push_str("(?:.*/)?");
                    i += 3;
                } else {
                    out.push_str(".*");
                    i += 2;
                }
                continue;
            }
            '*' => out.push_str("[^/]*"),
            '?' => out.push_str("[^/]"),
            '[' => {
                i = push_class(&chars, i, &mut out)?;
                continue;
            }
            '{' if in_group => return Err("nested braces are not supported"),
            '{' => {
                in_group = true;
                out.push_str("(?:");
            }
            '}' if in_group => {
                in_group = false;
                out.push(')');
            }
            '}' => return Err("unmatched '}'"),
            ',' if in_group => out.push('|'),
            '\\' => {
                let c = *chars.get(i + 1).ok_or("trailing backslash")?;
                push_literal(c, &mut out);
                i += 1;
            }
            c => push_literal(c, &mut out),
        }
        i += 1;
    }

    if in_group {
        return Err("unclosed brace");
    }
    out.push('$');
    Ok(out)
}

/// Translate the class starting at `chars[start] == '['`. Returns the index
/// just past the closing `]`.
fn push_class(chars: &[char], start: usize, out: &mut String) -> Result<usize, &'static str> {
    let mut i = start + 1;
    let negated = matches!(chars.get(i), Some('!' | '^'));
    if negated {
        i += 1;
    }

    let body_start = i;
    let mut body = String::new();
    loop {
        let c = *chars.get(i).ok_or("unclosed character class")?;
        // A `]` right after the opening bracket is a literal member.
        if c == ']' && i > body_start {
            break;
        }
        if c == '/' {
            return Err("character class cannot contain '/'");
        }
        let is_range = c == '-' && i > body_start && chars.get(i + 1).is_some_and(|n| *n != ']');
        if is_range {
            body.push('-');
        } else {
            if matches!(c, '\\' | '[' | ']' | '^' | '-' | '&' | '~') {
                body.push('\\');
            }
            body.push(c);
        }
        i += 1;
    }

    out.push('[');
    if negated {
        out.push_str("^/");
    }
    out.push_str(&body);
    out.push(']');
    Ok(i + 1)
}

fn push_literal(c: char, out: &mut String) {
    let mut buf = [0u8; 4];
    out.push_str(&regex::escape(c.encode_utf8(&mut buf)));
}
