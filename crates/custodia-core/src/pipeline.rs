//! The end-to-end ingestion pipeline.
//!
//! One request flows through age gate, consent lookup, policy decision,
//! de-identification, then persistence. The stored record and its
//! `ingest_store` audit event commit in one transaction; a record
//! without its event (or the reverse) cannot be observed.

use crate::age::AgeVerifier;
use crate::audit::{AuditAction, AuditLog, EventDraft};
use crate::consent::ConsentService;
use crate::deid::Deidentifier;
use crate::error::IngestError;
use crate::policy::{DecisionFacts, DenyReason, PolicyDecisionEngine};
use crate::storage::GovernanceStore;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::info;

/// One ingestion request as submitted by a caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestRequest {
    #[serde(rename = "data_principal_id")]
    pub principal_id: String,
    pub purpose: String,
    pub date_of_birth: String,
    #[serde(default)]
    pub guardian_consent_token: Option<String>,
    pub payload: Value,
}

impl IngestRequest {
    /// An empty token counts as absent.
    fn guardian_token_present(&self) -> bool {
        self.guardian_consent_token
            .as_deref()
            .map_or(false, |t| !t.is_empty())
    }
}

/// What the authorization stages concluded for one request.
///
/// Transient; produced once per request and never persisted.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct IngestionDecision {
    pub allowed: bool,
    pub reason: Option<DenyReason>,
    pub is_minor: bool,
    pub guardian_token_present: bool,
    pub has_consent: bool,
}

/// Terminal outcome of a submitted request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum IngestionOutcome {
    Allowed { record_id: i64 },
    Denied { reason: DenyReason },
}

/// Orchestrates one ingestion request end to end.
///
/// All collaborators are injected at construction; the pipeline holds
/// no global state.
pub struct IngestionPipeline {
    consent: Arc<ConsentService>,
    policy: Arc<PolicyDecisionEngine>,
    audit: Arc<AuditLog>,
    age: AgeVerifier,
    deid: Deidentifier,
}

impl IngestionPipeline {
    pub fn new(
        consent: Arc<ConsentService>,
        policy: Arc<PolicyDecisionEngine>,
        audit: Arc<AuditLog>,
    ) -> Self {
        Self {
            consent,
            policy,
            audit,
            age: AgeVerifier::default(),
            deid: Deidentifier::default(),
        }
    }

    #[must_use]
    pub fn with_age_verifier(mut self, age: AgeVerifier) -> Self {
        self.age = age;
        self
    }

    #[must_use]
    pub fn with_deidentifier(mut self, deid: Deidentifier) -> Self {
        self.deid = deid;
        self
    }

    /// Run the authorization stages only, short-circuiting on the first
    /// denial. Nothing is persisted and the payload is untouched.
    pub async fn evaluate(
        &self,
        request: &IngestRequest,
    ) -> Result<IngestionDecision, IngestError> {
        let report = self.age.check(&request.date_of_birth);
        let guardian_token_present = request.guardian_token_present();

        // A minor without a guardian token is refused before consent is
        // even looked up
        if report.is_minor && report.needs_guardian && !guardian_token_present {
            return Ok(IngestionDecision {
                allowed: false,
                reason: Some(DenyReason::GuardianRequired),
                is_minor: report.is_minor,
                guardian_token_present,
                has_consent: false,
            });
        }

        let has_consent = self
            .consent
            .has_valid_consent(&request.principal_id, &request.purpose)?;

        let facts = DecisionFacts {
            principal_id: request.principal_id.clone(),
            purpose: request.purpose.clone(),
            has_consent,
            is_minor: report.is_minor,
            guardian_token_present,
        };
        let decision = self.policy.allow_processing(&facts).await;

        Ok(IngestionDecision {
            allowed: decision.allowed,
            reason: decision.reason,
            is_minor: report.is_minor,
            guardian_token_present,
            has_consent,
        })
    }

    /// Decide, and when allowed, de-identify and store the payload.
    ///
    /// The record insert and the `ingest_store` event share one
    /// transaction. A storage failure emits no event; an append failure
    /// rolls the record back and surfaces as an error, never as an
    /// allowed outcome.
    pub async fn submit(&self, request: &IngestRequest) -> Result<IngestionOutcome, IngestError> {
        let decision = self.evaluate(request).await?;
        if !decision.allowed {
            let reason = decision.reason.unwrap_or(DenyReason::PolicyDenied);
            info!(
                principal_id = %request.principal_id,
                purpose = %request.purpose,
                reason = %reason,
                "ingestion denied"
            );
            return Ok(IngestionOutcome::Denied { reason });
        }

        let transformed = self.deid.process(&request.payload);
        let payload_json = transformed.to_string();
        let created_at = Utc::now();

        let (record_id, receipt) = self.audit.append_with::<_, IngestError>(
            AuditAction::IngestStore,
            &request.principal_id,
            |conn| {
                let record_id = GovernanceStore::insert_ingest_record_tx(
                    conn,
                    &request.principal_id,
                    &request.purpose,
                    &payload_json,
                    &created_at,
                )?;
                let event = EventDraft {
                    scope: request.purpose.clone(),
                    payload: json!({ "record_id": record_id }),
                };
                Ok((record_id, event))
            },
        )?;

        info!(
            principal_id = %request.principal_id,
            record_id,
            sequence_index = receipt.sequence_index,
            "ingestion stored"
        );
        Ok(IngestionOutcome::Allowed { record_id })
    }
}
