//! Error types for governance operations.
//!
//! Each service layer has its own enum; `From` conversions follow the
//! dependency direction (store -> audit -> consent -> ingest) so `?`
//! crosses layers without manual mapping.

use thiserror::Error;

/// Storage-layer failures.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Row decode failed: {0}")]
    Decode(String),
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        StoreError::Database(e.to_string())
    }
}

/// Audit log failures.
#[derive(Debug, Error)]
pub enum AuditError {
    #[error("No audit event at sequence index {index}")]
    NotFound { index: u64 },

    /// The durable rows do not reconstruct to a consistent tree.
    #[error("Audit log corrupt: {reason}")]
    Corrupt { reason: String },

    #[error("Canonical serialization failed: {0}")]
    Canonicalize(String),

    #[error("Audit storage failure: {0}")]
    Store(#[from] StoreError),
}

/// Consent service failures.
#[derive(Debug, Error)]
pub enum ConsentError {
    #[error("Consent record not found: {id}")]
    NotFound { id: i64 },

    #[error("Consent storage failure: {0}")]
    Store(#[from] StoreError),

    #[error("Consent audit append failed: {0}")]
    Audit(#[from] AuditError),
}

/// Ingestion pipeline failures. Denials are not errors; these are
/// infrastructure faults that abort the request.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("Consent lookup failed: {0}")]
    Consent(#[from] ConsentError),

    #[error("Persist or audit append failed: {0}")]
    Audit(#[from] AuditError),

    #[error("Ingest storage failure: {0}")]
    Store(#[from] StoreError),
}

/// Retention sweep failures.
#[derive(Debug, Error)]
pub enum RetentionError {
    #[error("Retention storage failure: {0}")]
    Store(#[from] StoreError),

    #[error("Retention audit append failed: {0}")]
    Audit(#[from] AuditError),
}

/// Remote decision oracle failures. These never escape the policy
/// engine: every variant falls back to the local rule.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum OracleError {
    #[error("Decision oracle timed out after {timeout_ms} ms")]
    Timeout { timeout_ms: u64 },

    #[error("Decision oracle transport failure: {0}")]
    Transport(String),

    #[error("Decision oracle returned status {status}")]
    Status { status: u16 },

    #[error("Decision oracle returned malformed response: {0}")]
    Malformed(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_error_from_rusqlite() {
        let err: StoreError = rusqlite::Error::InvalidQuery.into();
        assert!(matches!(err, StoreError::Database(_)));
    }

    #[test]
    fn test_layer_conversions_compose() {
        let store = StoreError::Database("locked".to_string());
        let audit: AuditError = store.into();
        let consent: ConsentError = audit.into();
        let ingest: IngestError = consent.into();
        assert!(ingest.to_string().contains("locked"));
    }

    #[test]
    fn test_display_messages() {
        let err = AuditError::NotFound { index: 7 };
        assert_eq!(err.to_string(), "No audit event at sequence index 7");

        let err = OracleError::Timeout { timeout_ms: 2000 };
        assert_eq!(err.to_string(), "Decision oracle timed out after 2000 ms");
    }
}
