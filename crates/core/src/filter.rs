// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Transaction filters and the context they are evaluated against
//!
//! A filter is a list of clauses separated by [`CLAUSE_SEPARATOR`]. Each clause
//! compares a context variable with a quoted literal:
//!
//! ```text
//! uri == "/foo"
//! status != "500"
//! ```
//!
//! A transaction passes only when every clause holds. A clause over a
//! variable that was never populated does not hold, whatever its operator.
//! Variable names are case-insensitive.

use std::collections::HashMap;

use thiserror::Error;

/// Byte separating independent clauses
pub const CLAUSE_SEPARATOR: char = '\u{1}';

/// Errors from parsing a filter expression
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FilterError {
    #[error("clause {index}: missing variable name")]
    MissingVariable { index: usize },
    #[error("clause {index}: expected `==` or `!=`")]
    MissingOperator { index: usize },
    #[error("clause {index}: expected a double-quoted literal")]
    MissingLiteral { index: usize },
    #[error("clause {index}: unterminated literal")]
    UnterminatedLiteral { index: usize },
    #[error("clause {index}: unexpected trailing input {rest:?}")]
    TrailingInput { index: usize, rest: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    Equal,
    NotEqual,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Clause {
    pub variable: String,
    pub comparison: Comparison,
    pub literal: String,
}

impl Clause {
    fn holds(&self, context: &FilterContext) -> bool {
        match context.get(&self.variable) {
            None => false,
            Some(value) => match self.comparison {
                Comparison::Equal => value == self.literal,
                Comparison::NotEqual => value != self.literal,
            },
        }
    }
}

/// A conjunction of clauses
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Filter {
    clauses: Vec<Clause>,
}

impl Filter {
    /// Parse a filter expression. Empty clauses are skipped, so an empty
    /// expression yields a filter that always passes.
    pub fn parse(expression: &str) -> Result<Self, FilterError> {
        let clauses = expression
            .split(CLAUSE_SEPARATOR)
            .enumerate()
            .filter(|(_, text)| !text.trim().is_empty())
            .map(|(index, text)| parse_clause(index, text))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { clauses })
    }

    pub fn clauses(&self) -> &[Clause] {
        &self.clauses
    }

    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }

    pub fn evaluate(&self, context: &FilterContext) -> bool {
        self.clauses.iter().all(|clause| clause.holds(context))
    }
}

fn parse_clause(index: usize, text: &str) -> Result<Clause, FilterError> {
    let text = text.trim_start();
    let name_len = text
        .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
        .unwrap_or(text.len());
    if name_len == 0 {
        return Err(FilterError::MissingVariable { index });
    }
    let (variable, rest) = text.split_at(name_len);
    let rest = rest.trim_start();

    let (comparison, rest) = if let Some(rest) = rest.strip_prefix("==") {
        (Comparison::Equal, rest)
    } else if let Some(rest) = rest.strip_prefix("!=") {
        (Comparison::NotEqual, rest)
    } else {
        return Err(FilterError::MissingOperator { index });
    };

    let rest = rest
        .trim_start()
        .strip_prefix('"')
        .ok_or(FilterError::MissingLiteral { index })?;

    let mut literal = String::new();
    let mut chars = rest.char_indices();
    let mut end = None;
    while let Some((pos, c)) = chars.next() {
        match c {
            '"' => {
                end = Some(pos + 1);
                break;
            }
            '\\' => match chars.next() {
                Some((_, escaped)) => literal.push(escaped),
                None => break,
            },
            c => literal.push(c),
        }
    }
    let end = end.ok_or(FilterError::UnterminatedLiteral { index })?;

    let trailing = rest[end..].trim();
    if !trailing.is_empty() {
        return Err(FilterError::TrailingInput {
            index,
            rest: trailing.to_string(),
        });
    }

    Ok(Clause {
        variable: variable.to_ascii_lowercase(),
        comparison,
        literal,
    })
}

/// Variables collected from a transaction's payloads; later values win
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterContext {
    values: HashMap<String, String>,
}

impl FilterContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, variable: impl Into<String>, value: impl Into<String>) {
        let mut variable = variable.into();
        variable.make_ascii_lowercase();
        self.values.insert(variable, value.into());
    }

    pub fn get(&self, variable: &str) -> Option<&str> {
        self.values
            .get(&variable.to_ascii_lowercase())
            .map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Pulls a `(variable, value)` assignment out of a message payload
pub trait ContextExtractor: Send + Sync {
    fn extract(&self, payload: &[u8]) -> Option<(String, String)>;
}

/// Recognizes `KEY: value` payloads and assigns `key = value`
///
/// The key must be an identifier and is lower-cased. With an allow-list only
/// the listed keys (compared case-insensitively) are recognized.
#[derive(Debug, Clone, Default)]
pub struct PrefixExtractor {
    allowed: Option<Vec<String>>,
}

impl PrefixExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_keys<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            allowed: Some(
                keys.into_iter()
                    .map(|k| k.as_ref().to_ascii_lowercase())
                    .collect(),
            ),
        }
    }
}

impl ContextExtractor for PrefixExtractor {
    fn extract(&self, payload: &[u8]) -> Option<(String, String)> {
        let text = std::str::from_utf8(payload).ok()?;
        let (key, value) = text.split_once(": ")?;
        let is_identifier = !key.is_empty()
            && key.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
            && !key.starts_with(|c: char| c.is_ascii_digit());
        if !is_identifier {
            return None;
        }
        let key = key.to_ascii_lowercase();
        if let Some(allowed) = &self.allowed {
            if !allowed.contains(&key) {
                return None;
            }
        }
        Some((key, value.trim_end_matches(['\r', '\n']).to_string()))
    }
}

#[cfg(test)]
#[path = "filter_tests.rs"]
mod tests;
