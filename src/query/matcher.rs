//! Document matching
//!
//! Pure predicate evaluation against documents. No I/O: the chunk store
//! feeds documents through here for search and bulk deletion.

use serde_json::{Map, Value};

use crate::error::{DbError, Result};

use super::predicate::{CompareOp, DocQuery};

/// Evaluate a classified query against one document
pub fn matches_query(document: &Value, query: &DocQuery) -> Result<bool> {
    match query {
        DocQuery::All => Ok(true),
        DocQuery::Literal(conditions) => matches_literal(document, conditions),
        DocQuery::FieldCompare { field, op, value } => {
            Ok(compare(lookup_path(document, field), *op, value))
        }
        DocQuery::FieldPattern { field, patterns } => {
            // Patterns only apply to string fields
            match lookup_path(document, field).and_then(Value::as_str) {
                Some(target) => Ok(patterns.iter().any(|p| p.matches(target))),
                None => Ok(false),
            }
        }
    }
}

/// Evaluate literal field conditions, combined by AND.
///
/// Each condition is either a literal value (deep equality, dot-notation
/// paths reach nested fields) or an operator mapping `{op: value}`.
fn matches_literal(document: &Value, conditions: &Map<String, Value>) -> Result<bool> {
    for (field, condition) in conditions {
        let actual = lookup_path(document, field);

        match condition {
            Value::Object(ops) if is_operator_object(ops)? => {
                for (token, expected) in ops {
                    let op = CompareOp::parse(token).expect("validated operator object");
                    if !compare(actual, op, expected) {
                        return Ok(false);
                    }
                }
            }
            _ => {
                // Literal deep equality; a missing field never equals
                match actual {
                    Some(actual) if values_equal(actual, condition) => {}
                    _ => return Ok(false),
                }
            }
        }
    }
    Ok(true)
}

/// Decide whether an object in condition position is an operator mapping.
///
/// All keys operators -> operator mapping. No operator-like keys -> nested
/// literal. A mix, or an unrecognized `$`-prefixed token, is `InvalidQuery`.
fn is_operator_object(obj: &Map<String, Value>) -> Result<bool> {
    if obj.is_empty() {
        return Ok(false);
    }
    let operator_keys = obj.keys().filter(|k| CompareOp::parse(k).is_some()).count();
    if operator_keys == obj.len() {
        return Ok(true);
    }
    if operator_keys > 0 {
        return Err(DbError::InvalidQuery(
            "Cannot mix operators and literal fields in one condition".to_string(),
        ));
    }
    if let Some(token) = obj.keys().find(|k| k.starts_with('$')) {
        return Err(DbError::InvalidQuery(format!(
            "Unrecognized operator: '{}'",
            token
        )));
    }
    Ok(false)
}

/// Resolve a dot-notation path ("profile.name") against a document
pub fn lookup_path<'a>(document: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = document;
    for segment in path.split('.') {
        current = current.as_object()?.get(segment)?;
    }
    Some(current)
}

/// Apply a comparison operator.
///
/// - equality is deep equality (numbers compare numerically, 1 == 1.0)
/// - a missing field satisfies `!=` against anything, never `==` or ordering
/// - ordering compares numbers numerically and strings lexicographically
///   (ISO-8601 date strings order correctly this way); mixed types never
///   match
pub fn compare(actual: Option<&Value>, op: CompareOp, expected: &Value) -> bool {
    match op {
        CompareOp::Eq => actual.is_some_and(|a| values_equal(a, expected)),
        CompareOp::Ne => !actual.is_some_and(|a| values_equal(a, expected)),
        CompareOp::Lt | CompareOp::Le | CompareOp::Gt | CompareOp::Ge => {
            let Some(actual) = actual else { return false };
            let Some(ordering) = order(actual, expected) else {
                return false;
            };
            match op {
                CompareOp::Lt => ordering.is_lt(),
                CompareOp::Le => ordering.is_le(),
                CompareOp::Gt => ordering.is_gt(),
                CompareOp::Ge => ordering.is_ge(),
                _ => unreachable!(),
            }
        }
    }
}

/// Deep equality with numeric normalization
pub fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => match (x.as_f64(), y.as_f64()) {
            (Some(x), Some(y)) => x == y,
            _ => x == y,
        },
        (Value::Array(xs), Value::Array(ys)) => {
            xs.len() == ys.len() && xs.iter().zip(ys).all(|(x, y)| values_equal(x, y))
        }
        (Value::Object(xs), Value::Object(ys)) => {
            xs.len() == ys.len()
                && xs
                    .iter()
                    .all(|(k, x)| ys.get(k).is_some_and(|y| values_equal(x, y)))
        }
        _ => a == b,
    }
}

/// Ordering between two values, if they are comparable
fn order(a: &Value, b: &Value) -> Option<std::cmp::Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::String(x), Value::String(y)) => Some(x.as_str().cmp(y.as_str())),
        _ => None,
    }
}
