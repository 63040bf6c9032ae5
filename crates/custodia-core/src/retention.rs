//! Time-based retention sweeps.
//!
//! Records older than the retention window are removed with a two-phase
//! audit trail per record: a `logical_delete` marker scoped to the
//! record's purpose, then a `physical_delete` event committed in the
//! same transaction as the row removal.

use crate::audit::{AuditAction, AuditLog, EventDraft};
use crate::error::RetentionError;
use crate::storage::GovernanceStore;
use crate::SYSTEM_ACTOR;
use chrono::{DateTime, Duration, Utc};
use serde_json::json;
use std::sync::Arc;
use tracing::{info, warn};

const PHYSICAL_DELETE_SCOPE: &str = "retention";

pub struct RetentionSweeper {
    store: GovernanceStore,
    audit: Arc<AuditLog>,
    window: Duration,
}

impl RetentionSweeper {
    pub fn new(store: GovernanceStore, audit: Arc<AuditLog>, window: Duration) -> Self {
        Self {
            store,
            audit,
            window,
        }
    }

    /// One sweep against the window ending at `now`. Returns how many
    /// records were removed.
    pub fn run_once(&self, now: DateTime<Utc>) -> Result<usize, RetentionError> {
        let cutoff = now - self.window;
        let expired = self.store.ingest_records_older_than(cutoff)?;
        if expired.is_empty() {
            return Ok(0);
        }

        for record in &expired {
            self.audit.append(
                AuditAction::LogicalDelete,
                SYSTEM_ACTOR,
                &record.purpose,
                json!({ "record_id": record.id }),
            )?;
        }

        let mut removed = 0;
        for record in &expired {
            let (deleted, _receipt) = self.audit.append_with::<_, RetentionError>(
                AuditAction::PhysicalDelete,
                SYSTEM_ACTOR,
                |conn| {
                    let deleted = GovernanceStore::delete_ingest_record_tx(conn, record.id)?;
                    let event = EventDraft {
                        scope: PHYSICAL_DELETE_SCOPE.to_string(),
                        payload: json!({ "record_id": record.id }),
                    };
                    Ok((deleted, event))
                },
            )?;
            if deleted {
                removed += 1;
            }
        }

        info!(removed, %cutoff, "retention sweep complete");
        Ok(removed)
    }

    /// Sweep at a fixed interval until the task is dropped. A failed
    /// sweep is logged and retried on the next tick, never fatal.
    pub async fn run_forever(&self, interval: std::time::Duration) {
        loop {
            if let Err(e) = self.run_once(Utc::now()) {
                warn!(error = %e, "retention sweep failed");
            }
            tokio::time::sleep(interval).await;
        }
    }
}
