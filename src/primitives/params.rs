//! Typed access to loosely-typed primitive parameters.
//!
//! Numbers may arrive as JSON numbers or numeric strings and must be
//! finite. Vectors are JSON arrays of exactly three numbers.

use serde_json::Value;

use super::{PrimitiveError, PrimitiveId};
use crate::domain::{Params, Vec3};

fn invalid(primitive: PrimitiveId, param: &str, reason: impl Into<String>) -> PrimitiveError {
    PrimitiveError::InvalidParam {
        primitive,
        param: param.to_string(),
        reason: reason.into(),
    }
}

fn missing(primitive: PrimitiveId, param: &str) -> PrimitiveError {
    PrimitiveError::MissingParam {
        primitive,
        param: param.to_string(),
    }
}

fn number(value: &Value) -> Option<f64> {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    };
    parsed.filter(|v: &f64| v.is_finite())
}

/// Present and non-null
fn present<'a>(params: &'a Params, key: &str) -> Option<&'a Value> {
    params.get(key).filter(|v| !v.is_null())
}

pub fn has(params: &Params, key: &str) -> bool {
    present(params, key).is_some()
}

pub fn required_str<'a>(
    params: &'a Params,
    primitive: PrimitiveId,
    key: &str,
) -> Result<&'a str, PrimitiveError> {
    match present(params, key) {
        None => Err(missing(primitive, key)),
        Some(Value::String(s)) => Ok(s.as_str()),
        Some(other) => Err(invalid(primitive, key, format!("expected a string, got {}", other))),
    }
}

pub fn optional_str<'a>(
    params: &'a Params,
    primitive: PrimitiveId,
    key: &str,
) -> Result<Option<&'a str>, PrimitiveError> {
    match present(params, key) {
        None => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.as_str())),
        Some(other) => Err(invalid(primitive, key, format!("expected a string, got {}", other))),
    }
}

pub fn required_f64(
    params: &Params,
    primitive: PrimitiveId,
    key: &str,
) -> Result<f64, PrimitiveError> {
    let value = present(params, key).ok_or_else(|| missing(primitive, key))?;
    number(value).ok_or_else(|| invalid(primitive, key, format!("expected a finite number, got {}", value)))
}

pub fn optional_f64(
    params: &Params,
    primitive: PrimitiveId,
    key: &str,
    default: f64,
) -> Result<f64, PrimitiveError> {
    match present(params, key) {
        None => Ok(default),
        Some(value) => number(value)
            .ok_or_else(|| invalid(primitive, key, format!("expected a finite number, got {}", value))),
    }
}

/// Reject an angle whose magnitude exceeds `limit` degrees
pub fn bounded_angle(
    primitive: PrimitiveId,
    key: &str,
    degrees: f64,
    limit: f64,
) -> Result<f64, PrimitiveError> {
    if degrees.abs() > limit {
        return Err(invalid(
            primitive,
            key,
            format!("{} degrees exceeds the {} degree limit", degrees, limit),
        ));
    }
    Ok(degrees)
}

pub fn optional_bool(
    params: &Params,
    primitive: PrimitiveId,
    key: &str,
    default: bool,
) -> Result<bool, PrimitiveError> {
    match present(params, key) {
        None => Ok(default),
        Some(Value::Bool(b)) => Ok(*b),
        Some(other) => Err(invalid(primitive, key, format!("expected a boolean, got {}", other))),
    }
}

pub fn optional_vec3(
    params: &Params,
    primitive: PrimitiveId,
    key: &str,
) -> Result<Option<Vec3>, PrimitiveError> {
    let Some(value) = present(params, key) else {
        return Ok(None);
    };
    let items = value
        .as_array()
        .filter(|items| items.len() == 3)
        .ok_or_else(|| invalid(primitive, key, "expected an array of three finite numbers"))?;

    let mut out = [0.0; 3];
    for (slot, item) in out.iter_mut().zip(items) {
        *slot = number(item).ok_or_else(|| {
            invalid(primitive, key, format!("expected a finite number, got {}", item))
        })?;
    }
    Ok(Some(out))
}

pub fn required_vec3(
    params: &Params,
    primitive: PrimitiveId,
    key: &str,
) -> Result<Vec3, PrimitiveError> {
    optional_vec3(params, primitive, key)?.ok_or_else(|| missing(primitive, key))
}

pub fn required_str_list(
    params: &Params,
    primitive: PrimitiveId,
    key: &str,
) -> Result<Vec<String>, PrimitiveError> {
    let value = present(params, key).ok_or_else(|| missing(primitive, key))?;
    let items = value
        .as_array()
        .ok_or_else(|| invalid(primitive, key, "expected a list of object ids"))?;

    items
        .iter()
        .map(|item| {
            item.as_str()
                .map(str::to_string)
                .ok_or_else(|| invalid(primitive, key, format!("expected a string, got {}", item)))
        })
        .collect()
}

/// Raw rendering of a parameter for narration (`fallback` when absent)
pub fn display(params: &Params, key: &str, fallback: &str) -> String {
    match present(params, key) {
        None => fallback.to_string(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}
