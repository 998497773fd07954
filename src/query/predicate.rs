//! Predicate classification
//!
//! Command payloads are duck-typed: the same structural position may hold a
//! literal value, an operator mapping, a pattern key, or a nested
//! create-shape. The shape is inspected once here, at the boundary, and
//! turned into tagged variants the rest of the engine matches on.

use regex::{Regex, RegexBuilder};
use serde_json::{Map, Value};

use crate::error::{DbError, Result};

/// A comparison operator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CompareOp {
    /// Parse an operator token (`$eq`/`$ne` alias `==`/`!=`)
    pub fn parse(token: &str) -> Option<Self> {
        match token {
            "==" | "$eq" => Some(Self::Eq),
            "!=" | "$ne" => Some(Self::Ne),
            "<" => Some(Self::Lt),
            "<=" => Some(Self::Le),
            ">" => Some(Self::Gt),
            ">=" => Some(Self::Ge),
            _ => None,
        }
    }

    /// True for the equality pair `==` / `!=`
    pub fn is_equality(self) -> bool {
        matches!(self, Self::Eq | Self::Ne)
    }
}

/// How a pattern fragment is anchored
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatternKind {
    /// `^frag`: anchored at the start
    StartsWith,

    /// `~frag`: matches a proper substring (an exact whole-string match does
    /// not count as "contains")
    Contains,

    /// `frag$`: anchored at the end
    EndsWith,

    /// No marker: the fragment is applied unanchored
    Unanchored,
}

/// A compiled pattern operator
#[derive(Debug, Clone)]
pub struct Pattern {
    kind: PatternKind,
    regex: Regex,
}

impl Pattern {
    /// Compile a pattern string. The `~` marker is stripped; `^` and `$` are
    /// genuine regex anchors and stay in the fragment. Patterns match
    /// case-insensitively.
    pub fn compile(pattern: &str) -> Result<Self> {
        let (kind, fragment) = if let Some(rest) = pattern.strip_prefix('~') {
            (PatternKind::Contains, rest)
        } else if pattern.starts_with('^') {
            (PatternKind::StartsWith, pattern)
        } else if pattern.ends_with('$') {
            (PatternKind::EndsWith, pattern)
        } else {
            (PatternKind::Unanchored, pattern)
        };

        let regex = RegexBuilder::new(fragment)
            .case_insensitive(true)
            .build()
            .map_err(|e| DbError::InvalidQuery(format!("Invalid pattern '{}': {}", pattern, e)))?;

        Ok(Self { kind, regex })
    }

    /// Test a candidate string against this pattern
    pub fn matches(&self, candidate: &str) -> bool {
        match self.kind {
            PatternKind::Contains => match self.regex.find(candidate) {
                // "contains" excludes a match spanning the whole candidate
                Some(m) => !(m.start() == 0 && m.end() == candidate.len()),
                None => false,
            },
            _ => self.regex.is_match(candidate),
        }
    }

    pub fn kind(&self) -> PatternKind {
        self.kind
    }
}

/// True if a key carries a pattern marker (`^` / `~` / trailing `$`)
pub fn is_pattern_key(key: &str) -> bool {
    key.starts_with('^') || key.starts_with('~') || (key.ends_with('$') && key != "$")
}

/// A filter over resource names (databases or collections)
#[derive(Debug, Clone)]
pub enum NameFilter {
    Compare(CompareOp, String),
    Pattern(Pattern),
}

impl NameFilter {
    /// Parse a `{op: name}` pair or a pattern key into a name filter.
    /// Only the equality pair and patterns apply to names.
    pub fn parse(key: &str, value: &Value) -> Result<Self> {
        if let Some(op) = CompareOp::parse(key) {
            if !op.is_equality() {
                return Err(DbError::InvalidQuery(format!(
                    "Operator '{}' cannot filter resource names",
                    key
                )));
            }
            let name = value.as_str().ok_or_else(|| {
                DbError::InvalidQuery(format!("Name filter '{}' requires a string value", key))
            })?;
            return Ok(Self::Compare(op, name.to_string()));
        }

        if is_pattern_key(key) {
            return Ok(Self::Pattern(Pattern::compile(key)?));
        }

        Err(DbError::InvalidQuery(format!(
            "Unrecognized name filter: '{}'",
            key
        )))
    }

    /// True if `key` would parse as a name filter
    pub fn applies_to(key: &str) -> bool {
        matches!(key, "==" | "!=") || is_pattern_key(key)
    }

    pub fn matches(&self, name: &str) -> bool {
        match self {
            Self::Compare(CompareOp::Eq, value) => name == value,
            Self::Compare(CompareOp::Ne, value) => name != value,
            Self::Compare(..) => false,
            Self::Pattern(pattern) => pattern.matches(name),
        }
    }
}

/// A document-granularity query, classified from its payload shape
#[derive(Debug, Clone)]
pub enum DocQuery {
    /// `{}` — every document
    All,

    /// Field conditions combined by AND (literals and operator mappings)
    Literal(Map<String, Value>),

    /// `{"$field": f, op: value}` — a single comparison on one field
    FieldCompare {
        field: String,
        op: CompareOp,
        value: Value,
    },

    /// `{"$field": f, "^pat": {}, ...}` — patterns on one field (any may match)
    FieldPattern {
        field: String,
        patterns: Vec<Pattern>,
    },
}

impl DocQuery {
    /// Classify a query payload. Fails with `InvalidQuery` before any side
    /// effect can occur, so bulk operations never partially apply.
    pub fn classify(value: &Value) -> Result<Self> {
        let obj = value.as_object().ok_or_else(|| {
            DbError::InvalidQuery("Query must be an object".to_string())
        })?;

        if obj.is_empty() {
            return Ok(Self::All);
        }

        let field = obj.get("$field").map(|f| {
            f.as_str()
                .map(str::to_string)
                .ok_or_else(|| DbError::InvalidQuery("\"$field\" must be a string".to_string()))
        });

        match field {
            Some(field) => {
                let field = field?;
                let op_keys: Vec<&String> = obj
                    .keys()
                    .filter(|k| k.as_str() != "$field" && CompareOp::parse(k).is_some())
                    .collect();

                if !op_keys.is_empty() {
                    if op_keys.len() != 1 || obj.len() != 2 {
                        return Err(DbError::InvalidQuery(
                            "Operator query requires exactly one operator key plus \"$field\""
                                .to_string(),
                        ));
                    }
                    let key = op_keys[0];
                    return Ok(Self::FieldCompare {
                        field,
                        op: CompareOp::parse(key).expect("checked above"),
                        value: obj[key].clone(),
                    });
                }

                let mut patterns = Vec::new();
                for key in obj.keys().filter(|k| k.as_str() != "$field") {
                    patterns.push(Pattern::compile(key)?);
                }
                if patterns.is_empty() {
                    return Err(DbError::InvalidQuery(
                        "\"$field\" query requires a pattern or operator key".to_string(),
                    ));
                }
                Ok(Self::FieldPattern { field, patterns })
            }
            None => Ok(Self::Literal(obj.clone())),
        }
    }
}
