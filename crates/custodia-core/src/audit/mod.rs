//! Append-only audit log with Merkle commitments.
//!
//! Every governance action appends one event. The leaf hash covers the
//! canonicalized event content (RFC 8785), so identical logical events
//! hash identically regardless of field order. The durable rows are the
//! source of truth: on open the tree is rebuilt from them, and the log
//! refuses to open at all when they do not reconstruct cleanly.

pub mod merkle;

pub use merkle::{verify, AuditProof, ProofStep, Side};

use crate::error::{AuditError, StoreError};
use crate::storage::rows::{self, AuditEventRow};
use crate::storage::GovernanceStore;
use chrono::{DateTime, Utc};
use merkle::{MerkleTree, NodeDigest};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::fmt;
use std::sync::RwLock;
use tracing::debug;

/// Audit event kinds, by wire name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    ConsentCreate,
    ConsentUpdate,
    ConsentWithdraw,
    IngestStore,
    LogicalDelete,
    PhysicalDelete,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::ConsentCreate => "consent_create",
            AuditAction::ConsentUpdate => "consent_update",
            AuditAction::ConsentWithdraw => "consent_withdraw",
            AuditAction::IngestStore => "ingest_store",
            AuditAction::LogicalDelete => "logical_delete",
            AuditAction::PhysicalDelete => "physical_delete",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "consent_create" => Some(AuditAction::ConsentCreate),
            "consent_update" => Some(AuditAction::ConsentUpdate),
            "consent_withdraw" => Some(AuditAction::ConsentWithdraw),
            "ingest_store" => Some(AuditAction::IngestStore),
            "logical_delete" => Some(AuditAction::LogicalDelete),
            "physical_delete" => Some(AuditAction::PhysicalDelete),
            _ => None,
        }
    }
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One appended audit event, as persisted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GovernanceEvent {
    pub action: AuditAction,
    pub actor_id: String,
    pub scope: String,
    pub payload: Value,
    pub sequence_index: u64,
    pub leaf_hash: String,
    pub root_at_append: String,
    pub created_at: DateTime<Utc>,
}

/// Event content produced inside a transactional append.
#[derive(Debug, Clone)]
pub struct EventDraft {
    pub scope: String,
    pub payload: Value,
}

/// Returned from a successful append.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppendReceipt {
    pub sequence_index: u64,
    pub leaf_hash: String,
    pub root: String,
}

/// Hash input for one leaf.
///
/// Covers event content only. `sequence_index`, `root_at_append` and
/// `created_at` are stream identity, not content, and are excluded so
/// the leaf hash of a logical event is stable.
#[derive(Serialize)]
struct LeafContent<'a> {
    action: &'a str,
    actor_id: &'a str,
    scope: &'a str,
    payload: &'a Value,
}

fn leaf_hash(
    action: AuditAction,
    actor_id: &str,
    scope: &str,
    payload: &Value,
) -> Result<NodeDigest, AuditError> {
    let content = LeafContent {
        action: action.as_str(),
        actor_id,
        scope,
        payload,
    };
    let canonical =
        serde_jcs::to_vec(&content).map_err(|e| AuditError::Canonicalize(e.to_string()))?;
    Ok(Sha256::digest(&canonical).into())
}

/// Append-only audit log over a [`GovernanceStore`].
///
/// Appends are serialized by an exclusive tree lock; readers share it.
/// The transactional [`append_with`](AuditLog::append_with) lets callers
/// commit their own writes and the audit row as one unit.
#[derive(Debug)]
pub struct AuditLog {
    store: GovernanceStore,
    tree: RwLock<MerkleTree>,
}

impl AuditLog {
    /// Open over `store`, rebuilding the tree from the durable rows.
    ///
    /// Returns [`AuditError::Corrupt`] when the stored sequence has
    /// gaps, a leaf digest fails to decode, or the recomputed root
    /// differs from the stored one. A log that fails here serves no
    /// proofs.
    pub fn open(store: GovernanceStore) -> Result<Self, AuditError> {
        let stored = store.audit_events_ascending()?;
        let mut leaves = Vec::with_capacity(stored.len());
        for (i, row) in stored.iter().enumerate() {
            if row.sequence_index != i as u64 {
                return Err(AuditError::Corrupt {
                    reason: format!("sequence gap: expected {i}, found {}", row.sequence_index),
                });
            }
            match merkle::decode_digest(&row.leaf_hash) {
                Some(digest) => leaves.push(digest),
                None => {
                    return Err(AuditError::Corrupt {
                        reason: format!("undecodable leaf hash at sequence {i}"),
                    })
                }
            }
        }
        let tree = MerkleTree::from_leaves(leaves);
        if let Some(last) = stored.last() {
            let derived = tree.root().map(hex::encode).unwrap_or_default();
            if derived != last.merkle_root {
                return Err(AuditError::Corrupt {
                    reason: format!(
                        "root mismatch after rebuild: derived {derived}, stored {}",
                        last.merkle_root
                    ),
                });
            }
        }
        debug!(events = stored.len(), "audit log opened");
        Ok(Self {
            store,
            tree: RwLock::new(tree),
        })
    }

    /// Append one event.
    pub fn append(
        &self,
        action: AuditAction,
        actor_id: &str,
        scope: &str,
        payload: Value,
    ) -> Result<AppendReceipt, AuditError> {
        let scope = scope.to_string();
        let (_, receipt) = self.append_with::<_, AuditError>(action, actor_id, move |_| {
            Ok(((), EventDraft { scope, payload }))
        })?;
        Ok(receipt)
    }

    /// Append one event together with caller work, in one transaction.
    ///
    /// `work` runs inside the open transaction and returns a value plus
    /// the event content; the commit covers the closure's writes and
    /// the audit row together. On any failure nothing is committed and
    /// the tree is unchanged.
    pub fn append_with<T, E>(
        &self,
        action: AuditAction,
        actor_id: &str,
        work: impl FnOnce(&Connection) -> Result<(T, EventDraft), E>,
    ) -> Result<(T, AppendReceipt), E>
    where
        E: From<AuditError> + From<StoreError>,
    {
        // Lock order: tree writer first, then the connection
        let mut tree = self.tree.write().unwrap();
        let conn = self.store.lock();
        conn.execute("BEGIN IMMEDIATE", [])
            .map_err(|e| E::from(StoreError::from(e)))?;

        let result = Self::append_in_tx(&tree, &conn, action, actor_id, work);

        match &result {
            Ok(_) => {
                if let Err(e) = conn.execute("COMMIT", []) {
                    let _ = conn.execute("ROLLBACK", []);
                    return Err(E::from(StoreError::from(e)));
                }
            }
            Err(_) => {
                let _ = conn.execute("ROLLBACK", []);
            }
        }

        let (value, receipt, leaf) = result?;
        tree.push(leaf);
        Ok((value, receipt))
    }

    fn append_in_tx<T, E>(
        tree: &MerkleTree,
        conn: &Connection,
        action: AuditAction,
        actor_id: &str,
        work: impl FnOnce(&Connection) -> Result<(T, EventDraft), E>,
    ) -> Result<(T, AppendReceipt, NodeDigest), E>
    where
        E: From<AuditError> + From<StoreError>,
    {
        let (value, draft) = work(conn)?;
        let sequence_index = tree.len() as u64;
        let leaf = leaf_hash(action, actor_id, &draft.scope, &draft.payload).map_err(E::from)?;
        let root = tree.root_with(&leaf);
        let created_at = Utc::now();
        let row = AuditEventRow {
            sequence_index,
            action: action.as_str().to_string(),
            actor_id: actor_id.to_string(),
            scope: draft.scope,
            payload: draft.payload.to_string(),
            leaf_hash: hex::encode(leaf),
            merkle_root: hex::encode(root),
            created_at: rows::encode_ts(&created_at),
        };
        GovernanceStore::insert_audit_event_tx(conn, &row).map_err(E::from)?;
        debug!(sequence_index, action = %action, "audit event appended");
        Ok((
            value,
            AppendReceipt {
                sequence_index,
                leaf_hash: row.leaf_hash,
                root: row.merkle_root,
            },
            leaf,
        ))
    }

    /// Number of appended events.
    pub fn len(&self) -> u64 {
        self.tree.read().unwrap().len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.tree.read().unwrap().is_empty()
    }

    /// Current root commitment (hex), once anything has been appended.
    pub fn root(&self) -> Option<String> {
        self.tree.read().unwrap().root().map(hex::encode)
    }

    /// Inclusion proof for the event at `index` against the current
    /// root.
    pub fn prove(&self, index: u64) -> Result<AuditProof, AuditError> {
        self.tree
            .read()
            .unwrap()
            .prove(index as usize)
            .ok_or(AuditError::NotFound { index })
    }

    /// Read one event back as a typed value.
    pub fn event(&self, index: u64) -> Result<GovernanceEvent, AuditError> {
        let row = self
            .store
            .get_audit_event(index)?
            .ok_or(AuditError::NotFound { index })?;
        Self::decode_event(row)
    }

    fn decode_event(row: AuditEventRow) -> Result<GovernanceEvent, AuditError> {
        let action = AuditAction::parse(&row.action).ok_or_else(|| AuditError::Corrupt {
            reason: format!("unknown action {:?}", row.action),
        })?;
        let payload = serde_json::from_str(&row.payload).map_err(|e| AuditError::Corrupt {
            reason: format!("undecodable payload at sequence {}: {e}", row.sequence_index),
        })?;
        let created_at = rows::decode_ts(&row.created_at)?;
        Ok(GovernanceEvent {
            action,
            actor_id: row.actor_id,
            scope: row.scope,
            payload,
            sequence_index: row.sequence_index,
            leaf_hash: row.leaf_hash,
            root_at_append: row.merkle_root,
            created_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fresh_log() -> (GovernanceStore, AuditLog) {
        let store = GovernanceStore::memory().unwrap();
        let log = AuditLog::open(store.clone()).unwrap();
        (store, log)
    }

    // =========================================================================
    // A) Appends and roots
    // =========================================================================

    #[test]
    fn test_append_assigns_sequence_and_publishes_root() {
        let (_store, log) = fresh_log();
        let first = log
            .append(AuditAction::IngestStore, "p1", "research", json!({"record_id": 1}))
            .unwrap();
        assert_eq!(first.sequence_index, 0);
        assert_eq!(log.root(), Some(first.root.clone()));

        let second = log
            .append(AuditAction::IngestStore, "p1", "research", json!({"record_id": 2}))
            .unwrap();
        assert_eq!(second.sequence_index, 1);
        assert_ne!(first.root, second.root);
        assert_eq!(log.len(), 2);
    }

    #[test]
    fn test_empty_log_has_no_root() {
        let (_store, log) = fresh_log();
        assert!(log.root().is_none());
        assert!(log.is_empty());
    }

    #[test]
    fn test_identical_events_share_leaf_hash_but_extend_tree() {
        let (_store, log) = fresh_log();
        let a = log
            .append(AuditAction::ConsentCreate, "system", "research", json!({"consent_id": 1}))
            .unwrap();
        let b = log
            .append(AuditAction::ConsentCreate, "system", "research", json!({"consent_id": 1}))
            .unwrap();
        assert_eq!(a.leaf_hash, b.leaf_hash);
        assert_ne!(a.sequence_index, b.sequence_index);
        assert_ne!(a.root, b.root);
    }

    #[test]
    fn test_leaf_hash_ignores_json_key_order() {
        let spaced: Value = serde_json::from_str(r#"{"b": 1, "a": 2}"#).unwrap();
        let reordered: Value = serde_json::from_str(r#"{"a": 2, "b": 1}"#).unwrap();
        let h1 = leaf_hash(AuditAction::IngestStore, "p1", "s", &spaced).unwrap();
        let h2 = leaf_hash(AuditAction::IngestStore, "p1", "s", &reordered).unwrap();
        assert_eq!(h1, h2);
    }

    // =========================================================================
    // B) Transactional composition
    // =========================================================================

    #[test]
    fn test_append_with_commits_closure_writes_atomically() {
        let (store, log) = fresh_log();
        let now = Utc::now();
        let (record_id, receipt) = log
            .append_with::<_, AuditError>(AuditAction::IngestStore, "p1", |conn| {
                let id =
                    GovernanceStore::insert_ingest_record_tx(conn, "p1", "research", "{}", &now)?;
                Ok((
                    id,
                    EventDraft {
                        scope: "research".to_string(),
                        payload: json!({ "record_id": id }),
                    },
                ))
            })
            .unwrap();
        assert_eq!(receipt.sequence_index, 0);
        assert!(store.get_ingest_record(record_id).unwrap().is_some());
        assert_eq!(store.count_audit_events().unwrap(), 1);
    }

    #[test]
    fn test_append_with_rolls_back_everything_on_failure() {
        let (store, log) = fresh_log();
        let now = Utc::now();
        let result: Result<((), AppendReceipt), AuditError> =
            log.append_with(AuditAction::IngestStore, "p1", |conn| {
                GovernanceStore::insert_ingest_record_tx(conn, "p1", "research", "{}", &now)?;
                Err(AuditError::Canonicalize("boom".to_string()))
            });
        assert!(matches!(result, Err(AuditError::Canonicalize(_))));
        // Neither the closure's insert nor any audit row survives
        assert_eq!(store.count_ingest_records().unwrap(), 0);
        assert_eq!(store.count_audit_events().unwrap(), 0);
        assert_eq!(log.len(), 0);
        assert!(log.root().is_none());
    }

    // =========================================================================
    // C) Reconstruction on open
    // =========================================================================

    #[test]
    fn test_open_rebuilds_tree_and_root() {
        let store = GovernanceStore::memory().unwrap();
        let root = {
            let log = AuditLog::open(store.clone()).unwrap();
            for i in 0..3 {
                log.append(AuditAction::IngestStore, "p1", "research", json!({"record_id": i}))
                    .unwrap();
            }
            log.root().unwrap()
        };
        let reopened = AuditLog::open(store).unwrap();
        assert_eq!(reopened.len(), 3);
        assert_eq!(reopened.root(), Some(root.clone()));
        let proof = reopened.prove(1).unwrap();
        assert!(verify(&proof, &root));
    }

    #[test]
    fn test_open_rejects_sequence_gap() {
        let store = GovernanceStore::memory().unwrap();
        {
            let log = AuditLog::open(store.clone()).unwrap();
            log.append(AuditAction::IngestStore, "p1", "research", json!({}))
                .unwrap();
            log.append(AuditAction::IngestStore, "p1", "research", json!({"n": 1}))
                .unwrap();
        }
        {
            let conn = store.lock();
            conn.execute("DELETE FROM audit_events WHERE sequence_index = 0", [])
                .unwrap();
        }
        let err = AuditLog::open(store).unwrap_err();
        assert!(matches!(err, AuditError::Corrupt { .. }));
    }

    #[test]
    fn test_open_rejects_tampered_leaf_hash() {
        let store = GovernanceStore::memory().unwrap();
        {
            let log = AuditLog::open(store.clone()).unwrap();
            log.append(AuditAction::IngestStore, "p1", "research", json!({"n": 1}))
                .unwrap();
            log.append(AuditAction::IngestStore, "p1", "research", json!({"n": 2}))
                .unwrap();
        }
        {
            let conn = store.lock();
            conn.execute(
                "UPDATE audit_events SET leaf_hash = ?1 WHERE sequence_index = 0",
                ["ff".repeat(32)],
            )
            .unwrap();
        }
        let err = AuditLog::open(store).unwrap_err();
        assert!(matches!(err, AuditError::Corrupt { .. }));
    }

    #[test]
    fn test_open_rejects_undecodable_leaf_hash() {
        let store = GovernanceStore::memory().unwrap();
        {
            let log = AuditLog::open(store.clone()).unwrap();
            log.append(AuditAction::IngestStore, "p1", "research", json!({}))
                .unwrap();
        }
        {
            let conn = store.lock();
            conn.execute("UPDATE audit_events SET leaf_hash = 'zz'", [])
                .unwrap();
        }
        let err = AuditLog::open(store).unwrap_err();
        assert!(matches!(err, AuditError::Corrupt { .. }));
    }

    #[test]
    fn test_open_empty_store() {
        let (_store, log) = fresh_log();
        assert_eq!(log.len(), 0);
    }

    // =========================================================================
    // D) Reads
    // =========================================================================

    #[test]
    fn test_event_reads_back_typed() {
        let (_store, log) = fresh_log();
        let receipt = log
            .append(AuditAction::ConsentWithdraw, "system", "research", json!({"consent_id": 9}))
            .unwrap();
        let event = log.event(0).unwrap();
        assert_eq!(event.action, AuditAction::ConsentWithdraw);
        assert_eq!(event.actor_id, "system");
        assert_eq!(event.scope, "research");
        assert_eq!(event.payload, json!({"consent_id": 9}));
        assert_eq!(event.leaf_hash, receipt.leaf_hash);
        assert_eq!(event.root_at_append, receipt.root);
    }

    #[test]
    fn test_missing_event_and_proof() {
        let (_store, log) = fresh_log();
        assert!(matches!(log.event(0), Err(AuditError::NotFound { index: 0 })));
        assert!(matches!(log.prove(3), Err(AuditError::NotFound { index: 3 })));
    }

    #[test]
    fn test_action_wire_names_roundtrip() {
        for action in [
            AuditAction::ConsentCreate,
            AuditAction::ConsentUpdate,
            AuditAction::ConsentWithdraw,
            AuditAction::IngestStore,
            AuditAction::LogicalDelete,
            AuditAction::PhysicalDelete,
        ] {
            assert_eq!(AuditAction::parse(action.as_str()), Some(action));
        }
        assert!(AuditAction::parse("made_up").is_none());
    }
}
