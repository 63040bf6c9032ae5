//! SQLite schema for governance storage.
//!
//! Tables:
//! - `consents`: Consent grants (withdraw flips `active`, rest immutable)
//! - `ingest_records`: Deidentified ingested payloads
//! - `audit_events`: Append-only audit log backing the Merkle tree

/// DDL for governance tables.
///
/// Schema version: 1
pub const GOVERNANCE_SCHEMA: &str = r#"
-- Consent grants
CREATE TABLE IF NOT EXISTS consents (
    id                INTEGER PRIMARY KEY AUTOINCREMENT,
    data_principal_id TEXT NOT NULL,
    purpose           TEXT NOT NULL,
    scope             TEXT NOT NULL,
    expires_at        TEXT,
    active            INTEGER NOT NULL DEFAULT 1,
    created_at        TEXT NOT NULL
);

-- Deidentified ingestion payloads
CREATE TABLE IF NOT EXISTS ingest_records (
    id                INTEGER PRIMARY KEY AUTOINCREMENT,
    data_principal_id TEXT NOT NULL,
    purpose           TEXT NOT NULL,
    payload           TEXT NOT NULL,
    created_at        TEXT NOT NULL
);

-- Audit events (append-only; sequence_index mirrors tree leaf order)
CREATE TABLE IF NOT EXISTS audit_events (
    id             INTEGER PRIMARY KEY AUTOINCREMENT,
    sequence_index INTEGER NOT NULL UNIQUE,
    action         TEXT NOT NULL,
    actor_id       TEXT NOT NULL,
    scope          TEXT NOT NULL,
    payload        TEXT NOT NULL,
    leaf_hash      TEXT NOT NULL,
    merkle_root    TEXT NOT NULL,
    created_at     TEXT NOT NULL
);

-- Indexes for lookups
CREATE INDEX IF NOT EXISTS idx_consents_principal_purpose
    ON consents(data_principal_id, purpose);
CREATE INDEX IF NOT EXISTS idx_ingest_records_created_at
    ON ingest_records(created_at);
"#;
