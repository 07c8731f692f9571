//! Equality filters evaluated by the bundled stores.
//!
//! A filter is a document whose attributes must all match. A condition is
//! either a plain value (equality, with `null` also matching a missing
//! attribute) or an operator object: `{"$eq": v}`, `{"$ne": v}` or
//! `{"$in": [..]}`.

use crate::core::{Document, MigrateError, Result};
use serde_json::Value;

pub type Filter = Document;

/// Checks that every operator object in a filter is supported.
pub fn validate(filter: &Filter) -> Result<()> {
    for (field, condition) in filter {
        if let Some(op) = operator(condition) {
            match op {
                ("$eq", _) | ("$ne", _) => {}
                ("$in", Value::Array(_)) => {}
                ("$in", _) => {
                    return Err(MigrateError::Store(format!(
                        "$in on '{}' requires an array",
                        field
                    )));
                }
                (name, _) => {
                    return Err(MigrateError::Store(format!(
                        "unsupported filter operator '{}' on '{}'",
                        name, field
                    )));
                }
            }
        }
    }
    Ok(())
}

pub fn matches(document: &Document, filter: &Filter) -> bool {
    filter
        .iter()
        .all(|(field, condition)| condition_matches(document.get(field), condition))
}

fn condition_matches(actual: Option<&Value>, condition: &Value) -> bool {
    match operator(condition) {
        Some(("$eq", expected)) => value_equals(actual, expected),
        Some(("$ne", expected)) => !value_equals(actual, expected),
        Some(("$in", Value::Array(options))) => options.iter().any(|o| value_equals(actual, o)),
        Some(_) => false,
        None => value_equals(actual, condition),
    }
}

fn value_equals(actual: Option<&Value>, expected: &Value) -> bool {
    match (actual, expected) {
        (None, Value::Null) => true,
        (None, _) => false,
        (Some(a), e) => a == e,
    }
}

/// Single-key objects whose key starts with `$` are operators.
fn operator(condition: &Value) -> Option<(&str, &Value)> {
    let obj = condition.as_object()?;
    if obj.len() != 1 {
        return None;
    }
    let (key, value) = obj.iter().next()?;
    key.starts_with('$').then_some((key.as_str(), value))
}
