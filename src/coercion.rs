//! Converts raw form input into the values the API expects.
//!
//! Form inputs are always strings. The rules below run in order and the first
//! one that applies decides the value; anything no rule claims is sent as the
//! raw string.

use indexmap::IndexMap;
use serde_json::Value;

use crate::error::{AdminError, AdminResult};
use crate::models::Row;
use crate::schema::{Property, Schema};

/// Formats whose empty input means "no value".
const NULL_ON_EMPTY_FORMATS: [&str; 5] = ["date-time", "date", "uuid", "email", "json"];

/// Types whose empty input means "no value".
const NULL_ON_EMPTY_TYPES: [&str; 2] = ["integer", "number"];

/// Raw form values keyed by column.
pub type RawRow = IndexMap<String, String>;

/// One field being coerced.
#[derive(Debug, Clone, Copy)]
pub struct FieldInput<'a> {
    pub column: &'a str,
    pub raw: &'a str,
    pub property: Option<&'a Property>,
}

impl FieldInput<'_> {
    fn effective_type(&self) -> Option<&str> {
        self.property.and_then(Property::effective_type)
    }

    fn format(&self) -> Option<&str> {
        self.property.and_then(Property::format)
    }
}

/// A coercion rule: when `applies` holds, `apply` produces the value.
pub struct CoercionRule {
    pub name: &'static str,
    pub applies: fn(&FieldInput<'_>) -> bool,
    pub apply: fn(&FieldInput<'_>) -> AdminResult<Value>,
}

/// Rules in precedence order.
pub const RULES: &[CoercionRule] = &[
    CoercionRule {
        name: "literal_null",
        applies: |input| input.raw == "null",
        apply: |_| Ok(Value::Null),
    },
    CoercionRule {
        name: "array_json",
        applies: |input| input.effective_type() == Some("array"),
        apply: parse_json_array,
    },
    CoercionRule {
        name: "empty_to_null",
        applies: is_empty_null,
        apply: |_| Ok(Value::Null),
    },
];

fn parse_json_array(input: &FieldInput<'_>) -> AdminResult<Value> {
    let invalid = |reason: String| AdminError::Coercion {
        column: input.column.to_string(),
        reason,
    };

    match serde_json::from_str(input.raw) {
        Ok(value @ Value::Array(_)) => Ok(value),
        Ok(other) => Err(invalid(format!("expected a JSON array, got {}", other))),
        Err(e) => Err(invalid(format!("expected a JSON array: {}", e))),
    }
}

fn is_empty_null(input: &FieldInput<'_>) -> bool {
    if !input.raw.is_empty() {
        return false;
    }
    let Some(property) = input.property else {
        return false;
    };

    property.is_nullable()
        || input
            .format()
            .is_some_and(|f| NULL_ON_EMPTY_FORMATS.contains(&f))
        || input
            .effective_type()
            .is_some_and(|t| NULL_ON_EMPTY_TYPES.contains(&t))
        || property.is_foreign_key()
}

/// Coerce a single raw value for `column` according to `schema`.
pub fn coerce_for_submission(column: &str, raw: &str, schema: &Schema) -> AdminResult<Value> {
    let input = FieldInput {
        column,
        raw,
        property: schema.property(column),
    };

    for rule in RULES {
        if (rule.applies)(&input) {
            tracing::trace!(column, rule = rule.name, "Coercion rule matched");
            return (rule.apply)(&input);
        }
    }

    Ok(Value::String(raw.to_string()))
}

/// Coerce every field of a raw row. Fails on the first invalid field.
pub fn coerce_row(raw: &RawRow, schema: &Schema) -> AdminResult<Row> {
    raw.iter()
        .map(|(column, value)| {
            coerce_for_submission(column, value, schema).map(|coerced| (column.clone(), coerced))
        })
        .collect()
}

/// Render a JSON value as raw form input.
pub fn raw_from_json(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
