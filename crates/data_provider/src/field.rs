//! Typed view over externally produced records.
//!
//! Records arrive from the source as loosely typed, nested structures (lists
//! of numbers, lists of `(column, value)` tuples, lists of lists, ...). Every
//! scanner reads them exclusively through [`FieldView`], so the quirks of a
//! concrete representation stay inside its adapter.
//!
//! A record is itself a `FieldView`: element `i` of the record is the field
//! for slot `i`.

use crate::errors::FieldError;
use serde_json::Value;

pub trait FieldView {
    /// Number of elements when this field is a sequence.
    fn len(&self) -> Result<usize, FieldError>;

    /// The `i`-th element of a sequence field.
    fn sub_field_at(&self, i: usize) -> Result<&Self, FieldError>;

    /// This field as a scalar value.
    fn as_scalar(&self) -> Result<f64, FieldError>;

    /// This field as a non-negative integer (an id or a column).
    fn as_index(&self) -> Result<u64, FieldError>;

    fn is_empty(&self) -> Result<bool, FieldError> {
        self.len().map(|len| len == 0)
    }

    /// Shorthand for `sub_field_at(i)?.as_scalar()`.
    fn scalar_at(&self, i: usize) -> Result<f64, FieldError> {
        self.sub_field_at(i)?.as_scalar()
    }
}

/// Adapter for JSON-shaped records: arrays are sequences, numbers are scalars.
impl FieldView for Value {
    fn len(&self) -> Result<usize, FieldError> {
        match self {
            Value::Array(items) => Ok(items.len()),
            other => Err(FieldError::NotASequence(describe(other))),
        }
    }

    fn sub_field_at(&self, i: usize) -> Result<&Self, FieldError> {
        match self {
            Value::Array(items) => items.get(i).ok_or(FieldError::OutOfBounds {
                index: i,
                len: items.len(),
            }),
            other => Err(FieldError::NotASequence(describe(other))),
        }
    }

    fn as_scalar(&self) -> Result<f64, FieldError> {
        self.as_f64()
            .ok_or_else(|| FieldError::NotANumber(describe(self)))
    }

    fn as_index(&self) -> Result<u64, FieldError> {
        self.as_u64()
            .ok_or_else(|| FieldError::NotAnIndex(describe(self)))
    }
}

/// Short, bounded rendering of an offending value for error messages.
fn describe(value: &Value) -> String {
    let kind = match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    };
    let mut text = value.to_string();
    if text.len() > 32 {
        let cut = (0..=32).rev().find(|&i| text.is_char_boundary(i)).unwrap_or(0);
        text.truncate(cut);
        text.push_str("...");
    }
    format!("{} `{}`", kind, text)
}
