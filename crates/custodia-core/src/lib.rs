//! Consent-gated ingestion with a tamper-evident audit trail.
//!
//! This crate implements the decision-and-audit core of a data
//! governance service:
//!
//! - An ingestion pipeline gating every request behind age/guardian,
//!   consent and policy checks
//! - A consent lifecycle whose every mutation commits atomically with
//!   its audit event
//! - An append-only Merkle audit log producing root commitments and
//!   inclusion proofs verifiable without the log
//! - A two-arm policy engine delegating to a remote oracle with a
//!   deterministic local fallback
//! - Retention sweeps that delete expired records with a full audit
//!   trail
//!
//! # Quick Start
//!
//! ```no_run
//! use custodia_core::cache::MokaConsentCache;
//! use custodia_core::{
//!     AuditLog, ConsentService, GovernanceStore, IngestionPipeline, PolicyDecisionEngine,
//! };
//! use std::path::Path;
//! use std::sync::Arc;
//!
//! # fn example() -> anyhow::Result<()> {
//! let store = GovernanceStore::open(Path::new("custodia.db"))?;
//! let audit = Arc::new(AuditLog::open(store.clone())?);
//! let consent = Arc::new(ConsentService::new(
//!     store.clone(),
//!     audit.clone(),
//!     Arc::new(MokaConsentCache::default()),
//! ));
//! let pipeline = IngestionPipeline::new(consent, Arc::new(PolicyDecisionEngine::local()), audit);
//! # Ok(())
//! # }
//! ```
//!
//! # Configuration
//!
//! | Environment Variable | Description |
//! |---------------------|-------------|
//! | `CUSTODIA_DB` | SQLite database path (default: `custodia.db`) |
//! | `POLICY_URL` | Remote decision oracle base URL |
//! | `POLICY_DELEGATE` | Delegate decisions to the oracle (default: `false`) |
//! | `POLICY_TIMEOUT_MS` | Oracle round-trip bound (default: `2000`) |
//! | `POLICY_PACKAGE` | Oracle policy package (default: `custodia`) |
//! | `CACHE_TTL_SECS` | Consent cache TTL (default: `300`) |
//! | `RETENTION_MINUTES` | Retention window (default: `60`) |
//! | `DOB_FAIL_CLOSED` | Treat unparseable birth dates as minors (default: `false`) |

pub mod age;
pub mod audit;
pub mod cache;
pub mod config;
pub mod consent;
pub mod deid;
pub mod error;
pub mod pipeline;
pub mod policy;
pub mod retention;
pub mod storage;

// Re-export main types
pub use age::{AgeCheck, AgeVerifier, MalformedDobPolicy};
pub use audit::{
    verify, AppendReceipt, AuditAction, AuditLog, AuditProof, EventDraft, GovernanceEvent,
    ProofStep, Side,
};
pub use cache::{ConsentCache, MokaConsentCache, NoopConsentCache};
pub use config::GovernanceConfig;
pub use consent::{ConsentDraft, ConsentRecord, ConsentService, ConsentUpdate};
pub use deid::Deidentifier;
pub use error::{
    AuditError, ConsentError, IngestError, OracleError, RetentionError, StoreError,
};
pub use pipeline::{IngestRequest, IngestionDecision, IngestionOutcome, IngestionPipeline};
pub use policy::{
    DecisionFacts, DecisionOracle, DenyReason, HttpDecisionOracle, PolicyDecision,
    PolicyDecisionEngine,
};
pub use retention::RetentionSweeper;
pub use storage::GovernanceStore;

/// Actor recorded on events the service emits on its own behalf.
pub(crate) const SYSTEM_ACTOR: &str = "system";
