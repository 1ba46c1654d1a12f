//! Schema-guided merge of partial-update payloads into existing records.
//!
//! Projection is split in two phases so a payload can never leave a record
//! half-updated: [`Projection::compile`] converts every matched key up front
//! and fails on the first unconvertible value; [`Projection::apply`] then
//! writes the already-converted values and cannot fail.

use serde_json::{Map, Value};
use thiserror::Error;

use super::attribute::{AttrValue, Attribute};
use super::Record;

/// Errors produced while compiling a projection.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProjectionError {
    /// A payload value has no conversion rule to the attribute's kind.
    #[error("type mismatch for `{key}`: expected {expected}")]
    TypeMismatch {
        key: String,
        expected: &'static str,
    },
}

/// A validated set of attribute assignments for record type `R`.
#[derive(Debug)]
pub struct Projection<R: 'static> {
    assignments: Vec<(&'static Attribute<R>, AttrValue)>,
}

impl<R: Record> Projection<R> {
    /// Convert `payload` into assignments against `R`'s schema.
    ///
    /// Keys absent from the schema are ignored, as is the identity key.
    ///
    /// # Errors
    ///
    /// Returns [`ProjectionError::TypeMismatch`] for the first matched key
    /// whose value cannot be converted.
    pub fn compile(payload: &Map<String, Value>) -> Result<Self, ProjectionError> {
        let schema = R::schema();
        let mut assignments = Vec::with_capacity(payload.len());

        for (key, value) in payload {
            let Some(attr) = schema.find(key) else {
                continue;
            };
            if attr.identity {
                continue;
            }
            let converted = AttrValue::from_json(attr.kind, value).ok_or_else(|| {
                ProjectionError::TypeMismatch {
                    key: key.clone(),
                    expected: attr.kind.name(),
                }
            })?;
            assignments.push((attr, converted));
        }

        Ok(Self { assignments })
    }

    /// Overwrite the matched attributes of `record`.
    pub fn apply(self, record: &mut R) {
        for (attr, value) in self.assignments {
            (attr.set)(record, value);
        }
    }
}

/// Merge `payload` into a copy of `existing` and return the updated record.
///
/// The identity of the result always equals the identity of `existing`.
///
/// # Errors
///
/// Returns [`ProjectionError::TypeMismatch`] if any matched value cannot be
/// converted; `existing` is never modified.
pub fn project<R: Record>(existing: &R, payload: &Map<String, Value>) -> Result<R, ProjectionError> {
    let projection = Projection::<R>::compile(payload)?;
    let mut updated = existing.clone();
    projection.apply(&mut updated);
    Ok(updated)
}
