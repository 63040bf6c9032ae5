//! Authorization decisions from consent and age facts.
//!
//! Two arms: a deterministic local rule that is always available, and an
//! optional delegated oracle speaking the OPA data API. Any oracle
//! failure falls back to the local rule, so policy availability never
//! depends on the oracle's uptime.

use crate::error::OracleError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tracing::{debug, warn};

/// Facts one decision is evaluated from. Serialized verbatim as the
/// delegated oracle's input document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DecisionFacts {
    #[serde(rename = "data_principal_id")]
    pub principal_id: String,
    pub purpose: String,
    pub has_consent: bool,
    pub is_minor: bool,
    pub guardian_token_present: bool,
}

/// Why a request was refused.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DenyReason {
    NoConsent,
    GuardianRequired,
    PolicyDenied,
}

impl DenyReason {
    pub fn message(self) -> &'static str {
        match self {
            DenyReason::NoConsent => "No active consent for this purpose",
            DenyReason::GuardianRequired => "Guardian consent required",
            DenyReason::PolicyDenied => "Policy denied",
        }
    }
}

impl fmt::Display for DenyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}

/// Outcome of one policy evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PolicyDecision {
    pub allowed: bool,
    pub reason: Option<DenyReason>,
}

impl PolicyDecision {
    pub fn allow() -> Self {
        Self {
            allowed: true,
            reason: None,
        }
    }

    pub fn deny(reason: DenyReason) -> Self {
        Self {
            allowed: false,
            reason: Some(reason),
        }
    }
}

/// The deterministic arm. Deny without consent, deny a minor without a
/// guardian token, allow otherwise.
pub fn local_rule(facts: &DecisionFacts) -> PolicyDecision {
    if !facts.has_consent {
        return PolicyDecision::deny(DenyReason::NoConsent);
    }
    if facts.is_minor && !facts.guardian_token_present {
        return PolicyDecision::deny(DenyReason::GuardianRequired);
    }
    PolicyDecision::allow()
}

/// Remote decision oracle. Answers with a bare boolean; how the facts
/// are weighed is entirely the oracle's business.
#[async_trait]
pub trait DecisionOracle: Send + Sync {
    async fn allow(&self, facts: &DecisionFacts) -> Result<bool, OracleError>;
}

/// Default bound on one oracle round trip.
pub const DEFAULT_ORACLE_TIMEOUT: Duration = Duration::from_secs(2);

const DEFAULT_PACKAGE: &str = "custodia";

/// OPA data API client: POST `{base}/v1/data/{package}/allow` with
/// `{"input": facts}`, expecting `{"result": bool}`. One bounded call,
/// no retry.
pub struct HttpDecisionOracle {
    client: reqwest::Client,
    base_url: String,
    package: String,
    timeout: Duration,
}

#[derive(Serialize)]
struct OracleRequest<'a> {
    input: &'a DecisionFacts,
}

#[derive(Deserialize)]
struct OracleResponse {
    result: Option<bool>,
}

impl HttpDecisionOracle {
    pub fn new(base_url: impl Into<String>) -> Result<Self, OracleError> {
        Self::with_timeout(base_url, DEFAULT_ORACLE_TIMEOUT)
    }

    pub fn with_timeout(
        base_url: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, OracleError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| OracleError::Transport(format!("failed to create HTTP client: {}", e)))?;
        let base_url: String = base_url.into();
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            package: DEFAULT_PACKAGE.to_string(),
            timeout,
        })
    }

    /// Read the decision from a different policy package.
    #[must_use]
    pub fn with_package(mut self, package: impl Into<String>) -> Self {
        self.package = package.into();
        self
    }

    fn decision_url(&self) -> String {
        format!("{}/v1/data/{}/allow", self.base_url, self.package)
    }
}

#[async_trait]
impl DecisionOracle for HttpDecisionOracle {
    async fn allow(&self, facts: &DecisionFacts) -> Result<bool, OracleError> {
        let response = self
            .client
            .post(self.decision_url())
            .json(&OracleRequest { input: facts })
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    OracleError::Timeout {
                        timeout_ms: self.timeout.as_millis() as u64,
                    }
                } else {
                    OracleError::Transport(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(OracleError::Status {
                status: status.as_u16(),
            });
        }

        let body: OracleResponse = response
            .json()
            .await
            .map_err(|e| OracleError::Malformed(e.to_string()))?;
        body.result
            .ok_or_else(|| OracleError::Malformed("response missing `result`".to_string()))
    }
}

/// Two-arm decision engine.
pub struct PolicyDecisionEngine {
    oracle: Option<Box<dyn DecisionOracle>>,
}

impl PolicyDecisionEngine {
    /// Local rule only.
    pub fn local() -> Self {
        Self { oracle: None }
    }

    /// Delegate to an oracle; the local rule stays as the fallback arm.
    pub fn delegated(oracle: Box<dyn DecisionOracle>) -> Self {
        Self {
            oracle: Some(oracle),
        }
    }

    /// Evaluate the facts. A reachable oracle is authoritative: its
    /// answer substitutes for the local rule, it is never merged with
    /// it. An unreachable oracle is recovered locally, not surfaced.
    pub async fn allow_processing(&self, facts: &DecisionFacts) -> PolicyDecision {
        if let Some(oracle) = &self.oracle {
            match oracle.allow(facts).await {
                Ok(true) => {
                    debug!(principal_id = %facts.principal_id, "oracle allowed");
                    return PolicyDecision::allow();
                }
                Ok(false) => {
                    debug!(principal_id = %facts.principal_id, "oracle denied");
                    return PolicyDecision::deny(DenyReason::PolicyDenied);
                }
                Err(e) => {
                    warn!(error = %e, "decision oracle unavailable, using local rule");
                }
            }
        }
        local_rule(facts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn facts(has_consent: bool, is_minor: bool, guardian: bool) -> DecisionFacts {
        DecisionFacts {
            principal_id: "p1".to_string(),
            purpose: "research".to_string(),
            has_consent,
            is_minor,
            guardian_token_present: guardian,
        }
    }

    #[derive(Clone, Copy)]
    enum Script {
        Allow,
        Deny,
        Fail,
    }

    struct ScriptedOracle {
        script: Script,
        calls: Arc<AtomicUsize>,
    }

    impl ScriptedOracle {
        fn new(script: Script) -> (Self, Arc<AtomicUsize>) {
            let calls = Arc::new(AtomicUsize::new(0));
            (
                Self {
                    script,
                    calls: calls.clone(),
                },
                calls,
            )
        }
    }

    #[async_trait]
    impl DecisionOracle for ScriptedOracle {
        async fn allow(&self, _facts: &DecisionFacts) -> Result<bool, OracleError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.script {
                Script::Allow => Ok(true),
                Script::Deny => Ok(false),
                Script::Fail => Err(OracleError::Transport("connection refused".to_string())),
            }
        }
    }

    #[test]
    fn test_local_rule_denies_without_consent() {
        let decision = local_rule(&facts(false, false, false));
        assert!(!decision.allowed);
        assert_eq!(decision.reason, Some(DenyReason::NoConsent));
    }

    #[test]
    fn test_local_rule_denies_minor_without_guardian() {
        let decision = local_rule(&facts(true, true, false));
        assert!(!decision.allowed);
        assert_eq!(decision.reason, Some(DenyReason::GuardianRequired));
    }

    #[test]
    fn test_local_rule_allows_minor_with_guardian() {
        assert!(local_rule(&facts(true, true, true)).allowed);
    }

    #[test]
    fn test_local_rule_allows_adult_with_consent() {
        let decision = local_rule(&facts(true, false, false));
        assert!(decision.allowed);
        assert_eq!(decision.reason, None);
    }

    #[test]
    fn test_facts_serialize_with_wire_field_names() {
        let value = serde_json::to_value(facts(true, false, false)).unwrap();
        assert_eq!(value["data_principal_id"], "p1");
        assert_eq!(value["purpose"], "research");
        assert_eq!(value["has_consent"], true);
        assert!(value.get("principal_id").is_none());
    }

    #[tokio::test]
    async fn test_oracle_deny_is_authoritative_over_local_allow() {
        let (oracle, _) = ScriptedOracle::new(Script::Deny);
        let engine = PolicyDecisionEngine::delegated(Box::new(oracle));
        // Facts the local rule would wave through
        let decision = engine.allow_processing(&facts(true, false, false)).await;
        assert!(!decision.allowed);
        assert_eq!(decision.reason, Some(DenyReason::PolicyDenied));
    }

    #[tokio::test]
    async fn test_oracle_allow_is_authoritative_over_local_deny() {
        let (oracle, _) = ScriptedOracle::new(Script::Allow);
        let engine = PolicyDecisionEngine::delegated(Box::new(oracle));
        // Local rule would deny this for lack of consent; the oracle's
        // answer substitutes, it is not merged
        let decision = engine.allow_processing(&facts(false, false, false)).await;
        assert!(decision.allowed);
    }

    #[tokio::test]
    async fn test_oracle_failure_falls_back_to_local_rule() {
        let (oracle, calls) = ScriptedOracle::new(Script::Fail);
        let engine = PolicyDecisionEngine::delegated(Box::new(oracle));

        let allowed = engine.allow_processing(&facts(true, false, false)).await;
        assert!(allowed.allowed);

        let denied = engine.allow_processing(&facts(false, false, false)).await;
        assert!(!denied.allowed);
        assert_eq!(denied.reason, Some(DenyReason::NoConsent));
        // The oracle was consulted each time before falling back
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_local_engine_never_consults_an_oracle() {
        let engine = PolicyDecisionEngine::local();
        let decision = engine.allow_processing(&facts(true, true, true)).await;
        assert!(decision.allowed);
    }

    #[test]
    fn test_decision_url_shape() {
        let oracle = HttpDecisionOracle::new("http://localhost:8181/").unwrap();
        assert_eq!(
            oracle.decision_url(),
            "http://localhost:8181/v1/data/custodia/allow"
        );
        let scoped = HttpDecisionOracle::new("http://localhost:8181")
            .unwrap()
            .with_package("governance.intake");
        assert_eq!(
            scoped.decision_url(),
            "http://localhost:8181/v1/data/governance.intake/allow"
        );
    }

    #[test]
    fn test_deny_reason_messages() {
        assert_eq!(DenyReason::NoConsent.message(), "No active consent for this purpose");
        assert_eq!(DenyReason::GuardianRequired.message(), "Guardian consent required");
        assert_eq!(DenyReason::PolicyDenied.message(), "Policy denied");
    }
}
