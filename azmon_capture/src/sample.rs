//! Canonical representation of an emitted sample
//!
//! These structures are sink-agnostic. The JSON lines sink serializes a
//! [`Sample`] as-is, the gauge sink flattens it into one gauge per field.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
/// The value of a single field in [`Fields`].
#[serde(untagged)]
pub enum FieldValue {
    /// A floating point, 64 bits wide
    Float(f64),
    /// A free-form string
    String(String),
}

impl FieldValue {
    /// Get an f64 representation of this value, if it has one.
    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FieldValue::Float(float) => Some(*float),
            FieldValue::String(_) => None,
        }
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        FieldValue::Float(value)
    }
}

/// Ordered mapping from field name to value.
pub type Fields = BTreeMap<String, FieldValue>;

/// Ordered mapping from tag name to value.
pub type Tags = BTreeMap<String, String>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
/// A single timestamped observation as handed to an accumulator.
pub struct Sample {
    /// The measurement this sample belongs to, fixed per input.
    pub measurement: String,
    /// The time the observation was made, as reported by the source.
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    /// The observed values.
    pub fields: Fields,
    /// The labels associated with this sample.
    pub tags: Tags,
}
