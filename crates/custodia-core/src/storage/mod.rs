//! GovernanceStore: SQLite-backed storage for consents, ingest records
//! and audit events.
//!
//! One connection behind a mutex. Compound operations run under
//! `BEGIN IMMEDIATE` with explicit commit/rollback; the `*_tx` variants
//! take the open connection so callers can compose several writes into
//! one transaction.

pub mod rows;
pub mod schema;

use crate::error::StoreError;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, ToSql};
use rows::{AuditEventRow, ConsentDraft, ConsentRecord, ConsentUpdate, IngestRecord};
use schema::GOVERNANCE_SCHEMA;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

type RawConsent = (i64, String, String, String, Option<String>, i64, String);
type RawRecord = (i64, String, String, String, String);
type RawAudit = (i64, String, String, String, String, String, String, String);

const CONSENT_COLS: &str = "id, data_principal_id, purpose, scope, expires_at, active, created_at";
const RECORD_COLS: &str = "id, data_principal_id, purpose, payload, created_at";
const AUDIT_COLS: &str =
    "sequence_index, action, actor_id, scope, payload, leaf_hash, merkle_root, created_at";

/// SQLite-backed governance store.
#[derive(Clone, Debug)]
pub struct GovernanceStore {
    conn: Arc<Mutex<Connection>>,
}

impl GovernanceStore {
    /// Open a file-backed store.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        Self::init_connection(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Create an in-memory store (for testing).
    pub fn memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        Self::init_connection(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Create a store from an existing connection.
    pub fn from_connection(conn: Connection) -> Result<Self, StoreError> {
        Self::init_connection(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn init_connection(conn: &Connection) -> Result<(), StoreError> {
        conn.execute("PRAGMA foreign_keys = ON", [])?;
        // WAL mode for file-backed DBs (no-op for in-memory)
        let _ = conn.execute("PRAGMA journal_mode = WAL", []);
        conn.execute_batch(GOVERNANCE_SCHEMA)?;
        Ok(())
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap()
    }

    // =========================================================================
    // Consents
    // =========================================================================

    pub(crate) fn insert_consent_tx(
        conn: &Connection,
        draft: &ConsentDraft,
        created_at: &DateTime<Utc>,
    ) -> Result<i64, StoreError> {
        conn.execute(
            r#"
            INSERT INTO consents (data_principal_id, purpose, scope, expires_at, active, created_at)
            VALUES (?1, ?2, ?3, ?4, 1, ?5)
            "#,
            params![
                draft.principal_id,
                draft.purpose,
                rows::encode_scope(&draft.scope)?,
                draft.expires_at.as_ref().map(rows::encode_ts),
                rows::encode_ts(created_at),
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn get_consent(&self, id: i64) -> Result<Option<ConsentRecord>, StoreError> {
        let conn = self.lock();
        Self::get_consent_tx(&conn, id)
    }

    pub(crate) fn get_consent_tx(
        conn: &Connection,
        id: i64,
    ) -> Result<Option<ConsentRecord>, StoreError> {
        let raw: Option<RawConsent> = conn
            .query_row(
                &format!("SELECT {CONSENT_COLS} FROM consents WHERE id = ?1"),
                [id],
                Self::read_consent_row,
            )
            .optional()?;
        raw.map(Self::decode_consent).transpose()
    }

    /// List consents, optionally narrowed by principal and/or purpose.
    pub fn list_consents(
        &self,
        principal_id: Option<&str>,
        purpose: Option<&str>,
    ) -> Result<Vec<ConsentRecord>, StoreError> {
        let conn = self.lock();
        let (clause, binds): (&str, Vec<&dyn ToSql>) = match (&principal_id, &purpose) {
            (Some(p), Some(u)) => (
                " WHERE data_principal_id = ?1 AND purpose = ?2 ORDER BY id",
                vec![p as &dyn ToSql, u as &dyn ToSql],
            ),
            (Some(p), None) => (
                " WHERE data_principal_id = ?1 ORDER BY id",
                vec![p as &dyn ToSql],
            ),
            (None, Some(u)) => (" WHERE purpose = ?1 ORDER BY id", vec![u as &dyn ToSql]),
            (None, None) => (" ORDER BY id", Vec::new()),
        };
        let sql = format!("SELECT {CONSENT_COLS} FROM consents{clause}");
        let mut stmt = conn.prepare(&sql)?;
        let raws = stmt
            .query_map(&binds[..], Self::read_consent_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        raws.into_iter().map(Self::decode_consent).collect()
    }

    /// Most recently created active consent for (principal, purpose).
    /// Expiry is not applied here; callers evaluate it at decision time.
    pub fn find_active_consent(
        &self,
        principal_id: &str,
        purpose: &str,
    ) -> Result<Option<ConsentRecord>, StoreError> {
        let conn = self.lock();
        let raw: Option<RawConsent> = conn
            .query_row(
                &format!(
                    r#"
                    SELECT {CONSENT_COLS} FROM consents
                    WHERE data_principal_id = ?1 AND purpose = ?2 AND active = 1
                    ORDER BY created_at DESC, id DESC
                    LIMIT 1
                    "#
                ),
                params![principal_id, purpose],
                Self::read_consent_row,
            )
            .optional()?;
        raw.map(Self::decode_consent).transpose()
    }

    /// Apply `update` on top of `before` and persist the result.
    pub(crate) fn update_consent_tx(
        conn: &Connection,
        before: &ConsentRecord,
        update: &ConsentUpdate,
    ) -> Result<ConsentRecord, StoreError> {
        let mut after = before.clone();
        if let Some(purpose) = &update.purpose {
            after.purpose = purpose.clone();
        }
        if let Some(scope) = &update.scope {
            after.scope = scope.clone();
        }
        if let Some(expires_at) = update.expires_at {
            after.expires_at = Some(expires_at);
        }
        if let Some(active) = update.active {
            after.active = active;
        }
        conn.execute(
            "UPDATE consents SET purpose = ?1, scope = ?2, expires_at = ?3, active = ?4 WHERE id = ?5",
            params![
                after.purpose,
                rows::encode_scope(&after.scope)?,
                after.expires_at.as_ref().map(rows::encode_ts),
                after.active as i32,
                after.id,
            ],
        )?;
        Ok(after)
    }

    /// Flip `active` off. Returns the withdrawn record, or `None` when
    /// no such row exists.
    pub(crate) fn withdraw_consent_tx(
        conn: &Connection,
        id: i64,
    ) -> Result<Option<ConsentRecord>, StoreError> {
        let record = match Self::get_consent_tx(conn, id)? {
            Some(r) => r,
            None => return Ok(None),
        };
        conn.execute("UPDATE consents SET active = 0 WHERE id = ?1", [id])?;
        Ok(Some(ConsentRecord {
            active: false,
            ..record
        }))
    }

    fn read_consent_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawConsent> {
        Ok((
            row.get(0)?,
            row.get(1)?,
            row.get(2)?,
            row.get(3)?,
            row.get(4)?,
            row.get(5)?,
            row.get(6)?,
        ))
    }

    fn decode_consent(raw: RawConsent) -> Result<ConsentRecord, StoreError> {
        let (id, principal_id, purpose, scope, expires_at, active, created_at) = raw;
        Ok(ConsentRecord {
            id,
            principal_id,
            purpose,
            scope: rows::decode_scope(&scope)?,
            expires_at: expires_at.as_deref().map(rows::decode_ts).transpose()?,
            active: active != 0,
            created_at: rows::decode_ts(&created_at)?,
        })
    }

    // =========================================================================
    // Ingest records
    // =========================================================================

    pub(crate) fn insert_ingest_record_tx(
        conn: &Connection,
        principal_id: &str,
        purpose: &str,
        payload_json: &str,
        created_at: &DateTime<Utc>,
    ) -> Result<i64, StoreError> {
        conn.execute(
            r#"
            INSERT INTO ingest_records (data_principal_id, purpose, payload, created_at)
            VALUES (?1, ?2, ?3, ?4)
            "#,
            params![principal_id, purpose, payload_json, rows::encode_ts(created_at)],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn get_ingest_record(&self, id: i64) -> Result<Option<IngestRecord>, StoreError> {
        let conn = self.lock();
        let raw: Option<RawRecord> = conn
            .query_row(
                &format!("SELECT {RECORD_COLS} FROM ingest_records WHERE id = ?1"),
                [id],
                Self::read_record_row,
            )
            .optional()?;
        raw.map(Self::decode_record).transpose()
    }

    /// Records created strictly before `cutoff`, oldest first.
    pub fn ingest_records_older_than(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<IngestRecord>, StoreError> {
        let conn = self.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {RECORD_COLS} FROM ingest_records WHERE created_at < ?1 ORDER BY id"
        ))?;
        let raws = stmt
            .query_map([rows::encode_ts(&cutoff)], Self::read_record_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        raws.into_iter().map(Self::decode_record).collect()
    }

    /// Returns whether a row was actually deleted.
    pub(crate) fn delete_ingest_record_tx(conn: &Connection, id: i64) -> Result<bool, StoreError> {
        let affected = conn.execute("DELETE FROM ingest_records WHERE id = ?1", [id])?;
        Ok(affected > 0)
    }

    /// Count stored records (for testing).
    pub fn count_ingest_records(&self) -> Result<u64, StoreError> {
        let conn = self.lock();
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM ingest_records", [], |row| {
            row.get(0)
        })?;
        Ok(count as u64)
    }

    fn read_record_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawRecord> {
        Ok((
            row.get(0)?,
            row.get(1)?,
            row.get(2)?,
            row.get(3)?,
            row.get(4)?,
        ))
    }

    fn decode_record(raw: RawRecord) -> Result<IngestRecord, StoreError> {
        let (id, principal_id, purpose, payload, created_at) = raw;
        Ok(IngestRecord {
            id,
            principal_id,
            purpose,
            payload: serde_json::from_str(&payload)
                .map_err(|e| StoreError::Decode(format!("bad record payload: {e}")))?,
            created_at: rows::decode_ts(&created_at)?,
        })
    }

    // =========================================================================
    // Audit events
    // =========================================================================

    pub(crate) fn insert_audit_event_tx(
        conn: &Connection,
        row: &AuditEventRow,
    ) -> Result<(), StoreError> {
        conn.execute(
            &format!(
                r#"
                INSERT INTO audit_events ({AUDIT_COLS})
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                "#
            ),
            params![
                row.sequence_index as i64,
                row.action,
                row.actor_id,
                row.scope,
                row.payload,
                row.leaf_hash,
                row.merkle_root,
                row.created_at,
            ],
        )?;
        Ok(())
    }

    /// All audit events in sequence order, for tree reconstruction.
    pub fn audit_events_ascending(&self) -> Result<Vec<AuditEventRow>, StoreError> {
        let conn = self.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {AUDIT_COLS} FROM audit_events ORDER BY sequence_index ASC"
        ))?;
        let raws = stmt
            .query_map([], Self::read_audit_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(raws.into_iter().map(Self::decode_audit).collect())
    }

    pub fn get_audit_event(
        &self,
        sequence_index: u64,
    ) -> Result<Option<AuditEventRow>, StoreError> {
        let conn = self.lock();
        let raw: Option<RawAudit> = conn
            .query_row(
                &format!("SELECT {AUDIT_COLS} FROM audit_events WHERE sequence_index = ?1"),
                [sequence_index as i64],
                Self::read_audit_row,
            )
            .optional()?;
        Ok(raw.map(Self::decode_audit))
    }

    /// Count audit events (for testing).
    pub fn count_audit_events(&self) -> Result<u64, StoreError> {
        let conn = self.lock();
        let count: i64 =
            conn.query_row("SELECT COUNT(*) FROM audit_events", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    fn read_audit_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawAudit> {
        Ok((
            row.get(0)?,
            row.get(1)?,
            row.get(2)?,
            row.get(3)?,
            row.get(4)?,
            row.get(5)?,
            row.get(6)?,
            row.get(7)?,
        ))
    }

    fn decode_audit(raw: RawAudit) -> AuditEventRow {
        let (sequence_index, action, actor_id, scope, payload, leaf_hash, merkle_root, created_at) =
            raw;
        AuditEventRow {
            sequence_index: sequence_index as u64,
            action,
            actor_id,
            scope,
            payload,
            leaf_hash,
            merkle_root,
            created_at,
        }
    }
}
