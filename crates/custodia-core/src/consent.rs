//! Consent lifecycle and validity checks.
//!
//! Every mutation writes the consent row and its audit event in one
//! transaction: both persist or neither does. Validity reads prefer the
//! cache and fall back to storage; a cache entry is a snapshot of the
//! record, and expiry is re-evaluated against the clock on every read.

pub use crate::storage::rows::{ConsentDraft, ConsentRecord, ConsentUpdate};

use crate::audit::{AuditAction, AuditLog, EventDraft};
use crate::cache::{consent_key, ConsentCache};
use crate::error::ConsentError;
use crate::storage::GovernanceStore;
use crate::SYSTEM_ACTOR;
use chrono::{DateTime, Utc};
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, info};

/// Consent lifecycle service.
pub struct ConsentService {
    store: GovernanceStore,
    audit: Arc<AuditLog>,
    cache: Arc<dyn ConsentCache>,
}

impl ConsentService {
    pub fn new(store: GovernanceStore, audit: Arc<AuditLog>, cache: Arc<dyn ConsentCache>) -> Self {
        Self {
            store,
            audit,
            cache,
        }
    }

    /// Grant consent. Emits one `consent_create` event in the same
    /// transaction as the insert.
    pub fn create(&self, draft: ConsentDraft) -> Result<ConsentRecord, ConsentError> {
        let created_at = Utc::now();
        let (record, _receipt) = self.audit.append_with::<_, ConsentError>(
            AuditAction::ConsentCreate,
            SYSTEM_ACTOR,
            |conn| {
                let id = GovernanceStore::insert_consent_tx(conn, &draft, &created_at)?;
                let record = ConsentRecord {
                    id,
                    principal_id: draft.principal_id.clone(),
                    purpose: draft.purpose.clone(),
                    scope: draft.scope.clone(),
                    expires_at: draft.expires_at,
                    active: true,
                    created_at,
                };
                let event = EventDraft {
                    scope: draft.purpose.clone(),
                    payload: json!({ "consent_id": id }),
                };
                Ok((record, event))
            },
        )?;
        self.cache.insert(
            consent_key(&record.principal_id, &record.purpose),
            record.clone(),
        );
        info!(consent_id = record.id, purpose = %record.purpose, "consent created");
        Ok(record)
    }

    pub fn get(&self, consent_id: i64) -> Result<ConsentRecord, ConsentError> {
        self.store
            .get_consent(consent_id)?
            .ok_or(ConsentError::NotFound { id: consent_id })
    }

    pub fn list(
        &self,
        principal_id: Option<&str>,
        purpose: Option<&str>,
    ) -> Result<Vec<ConsentRecord>, ConsentError> {
        Ok(self.store.list_consents(principal_id, purpose)?)
    }

    /// Apply a partial update. Emits one `consent_update` event in the
    /// same transaction as the write.
    pub fn update(
        &self,
        consent_id: i64,
        update: ConsentUpdate,
    ) -> Result<ConsentRecord, ConsentError> {
        let ((before, after), _receipt) = self.audit.append_with::<_, ConsentError>(
            AuditAction::ConsentUpdate,
            SYSTEM_ACTOR,
            |conn| {
                let before = GovernanceStore::get_consent_tx(conn, consent_id)?
                    .ok_or(ConsentError::NotFound { id: consent_id })?;
                let after = GovernanceStore::update_consent_tx(conn, &before, &update)?;
                let event = EventDraft {
                    scope: after.purpose.clone(),
                    payload: json!({ "consent_id": after.id }),
                };
                Ok(((before, after), event))
            },
        )?;
        // Both keys: the purpose (and with it the cache key) may have
        // changed under the update
        self.cache
            .invalidate(&consent_key(&before.principal_id, &before.purpose));
        self.cache
            .invalidate(&consent_key(&after.principal_id, &after.purpose));
        info!(consent_id = after.id, "consent updated");
        Ok(after)
    }

    /// Withdraw consent. The cache entry is gone before this returns,
    /// so no later validity check can see the withdrawn grant.
    pub fn withdraw(&self, consent_id: i64) -> Result<ConsentRecord, ConsentError> {
        let (record, _receipt) = self.audit.append_with::<_, ConsentError>(
            AuditAction::ConsentWithdraw,
            SYSTEM_ACTOR,
            |conn| {
                let record = GovernanceStore::withdraw_consent_tx(conn, consent_id)?
                    .ok_or(ConsentError::NotFound { id: consent_id })?;
                let event = EventDraft {
                    scope: record.purpose.clone(),
                    payload: json!({ "consent_id": record.id }),
                };
                Ok((record, event))
            },
        )?;
        self.cache
            .invalidate(&consent_key(&record.principal_id, &record.purpose));
        info!(consent_id = record.id, "consent withdrawn");
        Ok(record)
    }

    /// Is there an active, unexpired consent for this principal and
    /// purpose right now?
    pub fn has_valid_consent(
        &self,
        principal_id: &str,
        purpose: &str,
    ) -> Result<bool, ConsentError> {
        self.has_valid_consent_at(principal_id, purpose, Utc::now())
    }

    /// Validity at an explicit instant, for deterministic callers.
    pub fn has_valid_consent_at(
        &self,
        principal_id: &str,
        purpose: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, ConsentError> {
        let key = consent_key(principal_id, purpose);
        if let Some(cached) = self.cache.get(&key) {
            if cached.is_valid_at(now) {
                return Ok(true);
            }
            // Stale snapshot; drop it and ask storage
            self.cache.invalidate(&key);
            debug!(principal_id, purpose, "cached consent no longer valid");
        }
        match self.store.find_active_consent(principal_id, purpose)? {
            Some(record) if record.is_valid_at(now) => {
                self.cache.insert(key, record);
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}
