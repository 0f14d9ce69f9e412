//! JSON import.
//!
//! The payload is read as loose JSON first so that a record missing a key is
//! reported as a missing field rather than a generic parse error. `estado`
//! must be present even though any value other than `DEBE` maps to PAGO.

use serde_json::Value;

use super::ImportError;
use crate::models::Person;
use crate::normalize::{normalize_id, normalize_status};

pub fn parse_json(payload: &str) -> Result<Vec<Person>, ImportError> {
    let value: Value =
        serde_json::from_str(payload).map_err(|e| ImportError::InvalidFormat(e.to_string()))?;
    let items = value.as_array().ok_or(ImportError::NotAnArray)?;

    items
        .iter()
        .enumerate()
        .map(|(i, item)| parse_record(i + 1, item))
        .collect()
}

fn parse_record(record: usize, item: &Value) -> Result<Person, ImportError> {
    let field = |name: &'static str| {
        item.get(name)
            .and_then(present_text)
            .ok_or(ImportError::MissingField { record, field: name })
    };

    let id = field("dni")?;
    let last_name = field("apellido")?;
    let first_name = field("nombre")?;
    let status = field("estado")?;

    Ok(Person::new(
        normalize_id(&id),
        last_name,
        first_name,
        normalize_status(&status),
    ))
}

/// Text of a field that counts as present: a non-empty string, or a non-zero
/// number (DNIs are often exported as numbers). Booleans, arrays, objects and
/// null count as absent.
fn present_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) if n.as_f64() != Some(0.0) => Some(n.to_string()),
        _ => None,
    }
}
