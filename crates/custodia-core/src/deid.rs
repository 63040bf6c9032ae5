//! Payload deidentification before persistence.

use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;

/// Replacement marker for redacted fields.
pub const REDACTED: &str = "[REDACTED]";

/// Redacts or hashes sensitive fields in a flat JSON object.
///
/// String values under a key in the redaction set become [`REDACTED`];
/// string values under a key ending in `_hash` are replaced by the hex
/// SHA-256 of the value. Everything else passes through unchanged, and
/// non-string values are never touched. Applying the transform twice
/// redacts to the same marker; a `_hash` field hashes again, to the
/// digest of the previous digest.
#[derive(Debug, Clone)]
pub struct Deidentifier {
    redact_fields: BTreeSet<String>,
}

impl Default for Deidentifier {
    fn default() -> Self {
        Self::new()
    }
}

impl Deidentifier {
    pub fn new() -> Self {
        Self {
            redact_fields: ["ssn", "aadhar", "pan"]
                .into_iter()
                .map(String::from)
                .collect(),
        }
    }

    /// Replace the default redaction set.
    pub fn with_redact_fields(
        mut self,
        fields: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        self.redact_fields = fields.into_iter().map(Into::into).collect();
        self
    }

    /// Transform one payload. Non-object payloads come back unchanged.
    pub fn process(&self, payload: &Value) -> Value {
        let object = match payload.as_object() {
            Some(map) => map,
            None => return payload.clone(),
        };
        let mut out = Map::with_capacity(object.len());
        for (key, value) in object {
            let transformed = match value.as_str() {
                // Redaction wins over hashing when a key matches both
                Some(_) if self.redact_fields.contains(key) => {
                    Value::String(REDACTED.to_string())
                }
                Some(text) if key.ends_with("_hash") => Value::String(sha256_hex(text)),
                _ => value.clone(),
            };
            out.insert(key.clone(), transformed);
        }
        Value::Object(out)
    }
}

fn sha256_hex(input: &str) -> String {
    hex::encode(Sha256::digest(input.as_bytes()))
}
