//! Closed value model for tag and permission values.
//!
//! Values are plain `serde_json::Value`s. Two tag values are the same when
//! they are structurally equal after [`normalize`]; two permission values are
//! the same when their [`is_truthy`] projections agree.
//!
//! Numeric normalization: every number is reinterpreted as an IEEE-754
//! double, then integral values within ±2^53 are stored as integers. This
//! makes `1`, `1.0` and `1e0` the same value, and keeps non-integral floats
//! as floats.

use serde_json::{Number, Value};

const MAX_EXACT_INTEGER: f64 = 9_007_199_254_740_992.0;

/// Canonical form of a value: numbers normalized, containers recursed.
///
/// Object key order never matters for equality (`serde_json::Map` compares
/// as a map), so only numbers need rewriting.
pub fn normalize(value: &Value) -> Value {
    match value {
        Value::Number(number) => normalize_number(number),
        Value::Array(items) => Value::Array(items.iter().map(normalize).collect()),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(key, inner)| (key.clone(), normalize(inner)))
                .collect(),
        ),
        Value::Null | Value::Bool(_) | Value::String(_) => value.clone(),
    }
}

fn normalize_number(number: &Number) -> Value {
    let Some(float) = number.as_f64() else {
        return Value::Number(number.clone());
    };
    if float.fract() == 0.0 && float.abs() <= MAX_EXACT_INTEGER {
        return Value::from(float as i64);
    }
    Number::from_f64(float).map_or_else(|| Value::Number(number.clone()), Value::Number)
}

/// Deep structural equality after normalization.
pub fn same_tag_value(has: &Value, wants: &Value) -> bool {
    normalize(has) == normalize(wants)
}

/// Equality of the boolean projections of two permission values.
pub fn same_permission_value(has: &Value, wants: &Value) -> bool {
    is_truthy(has) == is_truthy(wants)
}

/// Boolean projection of an arbitrary value.
///
/// - booleans are themselves
/// - numbers are true when non-zero
/// - strings are true for `1`, `t`, `T`, `true`, `TRUE`, `True`
/// - null, arrays and objects are false
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Bool(flag) => *flag,
        Value::Number(number) => number.as_f64().is_some_and(|n| n != 0.0),
        Value::String(text) => matches!(text.as_str(), "1" | "t" | "T" | "true" | "TRUE" | "True"),
        Value::Null | Value::Array(_) | Value::Object(_) => false,
    }
}

/// Compact JSON rendering used in reports.
pub fn render(value: &Value) -> String {
    value.to_string()
}
