//! Row types shared between storage and the services above it.

use crate::error::StoreError;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// A consent grant as stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsentRecord {
    pub id: i64,
    pub principal_id: String,
    pub purpose: String,
    pub scope: Vec<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

impl ConsentRecord {
    /// Whether this grant authorizes processing at `now`. Expiry is
    /// evaluated here, at decision time, never baked into a cached
    /// verdict.
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        self.active && self.expires_at.map_or(true, |t| t > now)
    }
}

/// Fields for a new consent grant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsentDraft {
    pub principal_id: String,
    pub purpose: String,
    pub scope: Vec<String>,
    pub expires_at: Option<DateTime<Utc>>,
}

/// Partial update of a consent grant. `None` leaves a field unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConsentUpdate {
    pub purpose: Option<String>,
    pub scope: Option<Vec<String>>,
    pub expires_at: Option<DateTime<Utc>>,
    pub active: Option<bool>,
}

/// A stored, deidentified ingestion payload.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IngestRecord {
    pub id: i64,
    pub principal_id: String,
    pub purpose: String,
    pub payload: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// Raw audit event row. Digests stay hex and timestamps stay text here;
/// the audit log decodes them when it needs typed values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditEventRow {
    pub sequence_index: u64,
    pub action: String,
    pub actor_id: String,
    pub scope: String,
    pub payload: String,
    pub leaf_hash: String,
    pub merkle_root: String,
    pub created_at: String,
}

/// Encode a timestamp for storage. Fixed-width UTC so lexicographic
/// order in SQL comparisons matches chronological order.
pub(crate) fn encode_ts(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn decode_ts(raw: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StoreError::Decode(format!("bad timestamp {raw:?}: {e}")))
}

pub(crate) fn encode_scope(scope: &[String]) -> Result<String, StoreError> {
    serde_json::to_string(scope).map_err(|e| StoreError::Decode(format!("bad scope: {e}")))
}

pub(crate) fn decode_scope(raw: &str) -> Result<Vec<String>, StoreError> {
    serde_json::from_str(raw).map_err(|e| StoreError::Decode(format!("bad scope {raw:?}: {e}")))
}
