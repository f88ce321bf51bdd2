//! Named identifier patterns (dates, addresses, ...) recognised as single
//! tokens when a line first becomes a cluster.
//!
//! The configuration file holds one `NAME pattern` entry per line. Names
//! prefixed with `!` are intermittent: they can be referenced as `%{NAME}`
//! from other entries but are not identifiers themselves.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use ahash::AHashMap;
use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

use crate::token::Token;

static RE_CONFIG_LINE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(!?[A-Z]+) (.*)$").unwrap());

static RE_REFERENCE: Lazy<Regex> = Lazy::new(|| Regex::new(r"%\{([A-Z]+)\}").unwrap());

#[derive(Debug, Error)]
pub enum IdentifierError {
    #[error("failed to read identifiers file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid configuration line {line_number}: {line}")]
    InvalidLine { line_number: usize, line: String },
    #[error("invalid identifier {reference} referenced to by {name}")]
    UnknownReference { name: String, reference: String },
    #[error("identifier {name} refers back to itself through %{{{reference}}}")]
    CyclicReference { name: String, reference: String },
    #[error("identifier {name} has an invalid pattern: {source}")]
    InvalidPattern {
        name: String,
        #[source]
        source: regex::Error,
    },
    #[error("identifier {name} defines named capture groups")]
    NamedGroup { name: String },
}

/// Raw configuration entries in file order. Names keep their `!` prefix.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdentifiersConfig {
    entries: Vec<(String, String)>,
}

impl IdentifiersConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, IdentifierError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| IdentifierError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&text)
    }

    /// Parse configuration text. Blank lines and `#` comments are skipped.
    pub fn parse(text: &str) -> Result<Self, IdentifierError> {
        let mut config = Self::default();
        for (n, line) in text.lines().enumerate() {
            if line.starts_with('#') || line.trim().is_empty() {
                continue;
            }
            let caps = RE_CONFIG_LINE.captures(line).ok_or_else(|| IdentifierError::InvalidLine {
                line_number: n + 1,
                line: line.to_string(),
            })?;
            config.insert(&caps[1], &caps[2]);
        }
        Ok(config)
    }

    pub fn from_entries<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut config = Self::default();
        for (name, pattern) in entries {
            config.insert(&name.into(), &pattern.into());
        }
        config
    }

    /// Later entries replace earlier ones with the same name.
    fn insert(&mut self, name: &str, pattern: &str) {
        match self.entries.iter_mut().find(|(n, _)| n == name) {
            Some(entry) => entry.1 = pattern.to_string(),
            None => self.entries.push((name.to_string(), pattern.to_string())),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Non-intermittent identifiers with every `%{NAME}` reference expanded,
    /// in configuration order.
    pub fn resolve(&self) -> Result<Vec<(String, String)>, IdentifierError> {
        let all: AHashMap<&str, &str> = self
            .entries
            .iter()
            .map(|(name, pattern)| (name.trim_start_matches('!'), pattern.as_str()))
            .collect();

        let mut resolved = Vec::new();
        for (name, pattern) in &self.entries {
            if name.starts_with('!') {
                continue;
            }
            let mut stack = vec![name.as_str()];
            let expanded = expand(name, pattern, &all, &mut stack)?;
            resolved.push((name.clone(), expanded));
        }
        Ok(resolved)
    }
}

fn expand<'a>(
    owner: &str,
    pattern: &'a str,
    all: &AHashMap<&'a str, &'a str>,
    stack: &mut Vec<&'a str>,
) -> Result<String, IdentifierError> {
    let mut out = String::with_capacity(pattern.len());
    let mut last = 0;
    for caps in RE_REFERENCE.captures_iter(pattern) {
        let (Some(whole), Some(reference)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        let reference = reference.as_str();
        if stack.contains(&reference) {
            return Err(IdentifierError::CyclicReference {
                name: owner.to_string(),
                reference: reference.to_string(),
            });
        }
        let target = all.get(reference).copied().ok_or_else(|| IdentifierError::UnknownReference {
            name: owner.to_string(),
            reference: reference.to_string(),
        })?;

        stack.push(reference);
        let sub = expand(reference, target, all, stack)?;
        stack.pop();

        out.push_str(&pattern[last..whole.start()]);
        out.push_str(&sub);
        last = whole.end();
    }
    out.push_str(&pattern[last..]);
    Ok(out)
}

#[derive(Debug, Clone)]
struct Identifier {
    name: Arc<str>,
    pattern: Arc<str>,
    regex: Regex,
}

/// Compiled identifiers, tried in configuration order.
#[derive(Debug, Clone, Default)]
pub struct Identifiers {
    identifiers: Vec<Identifier>,
}

impl Identifiers {
    pub fn compile(config: &IdentifiersConfig) -> Result<Self, IdentifierError> {
        Self::from_resolved(config.resolve()?)
    }

    /// Compile already resolved `(name, pattern)` pairs.
    ///
    /// Patterns are embedded in cluster matchers next to each other, so named
    /// capture groups (which would clash) are rejected.
    pub fn from_resolved<I>(resolved: I) -> Result<Self, IdentifierError>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut identifiers = Vec::new();
        for (name, pattern) in resolved {
            let regex = Regex::new(&pattern).map_err(|source| IdentifierError::InvalidPattern {
                name: name.clone(),
                source,
            })?;
            if regex.capture_names().flatten().next().is_some() {
                return Err(IdentifierError::NamedGroup { name });
            }
            identifiers.push(Identifier {
                name: Arc::from(name),
                pattern: Arc::from(pattern),
                regex,
            });
        }
        Ok(Self { identifiers })
    }

    pub fn len(&self) -> usize {
        self.identifiers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.identifiers.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.identifiers.iter().map(|id| id.name.as_ref())
    }

    /// Split `line` into literal and identifier tokens.
    ///
    /// At each position the earliest identifier match wins; ties go to the
    /// longer match, then to configuration order. Empty matches are ignored.
    pub fn tokenize(&self, line: &str) -> Vec<Token> {
        let mut tokens = Vec::new();
        let mut pos = 0;
        while pos < line.len() {
            let mut best: Option<(usize, usize, &Identifier)> = None;
            for id in &self.identifiers {
                let Some((start, end)) = first_nonempty_match(&id.regex, line, pos) else {
                    continue;
                };
                let better = match best {
                    None => true,
                    Some((s, e, _)) => start < s || (start == s && end > e),
                };
                if better {
                    best = Some((start, end, id));
                }
            }
            let Some((start, end, id)) = best else {
                break;
            };
            if start > pos {
                tokens.push(Token::literal(&line[pos..start]));
            }
            tokens.push(Token::identifier(id.name.clone(), id.pattern.clone(), &line[start..end]));
            pos = end;
        }
        if pos < line.len() || tokens.is_empty() {
            tokens.push(Token::literal(&line[pos..]));
        }
        tokens
    }
}

fn first_nonempty_match(regex: &Regex, line: &str, from: usize) -> Option<(usize, usize)> {
    let mut at = from;
    while at <= line.len() {
        let m = regex.find_at(line, at)?;
        if !m.is_empty() {
            return Some((m.start(), m.end()));
        }
        at = m.start() + line[m.start()..].chars().next().map_or(1, char::len_utf8);
    }
    None
}
