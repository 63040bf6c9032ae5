//! Wires the service stack from a [`GovernanceConfig`].

use custodia_core::{
    AgeVerifier, AuditLog, ConsentService, GovernanceConfig, GovernanceStore, HttpDecisionOracle,
    IngestionPipeline, MokaConsentCache, PolicyDecisionEngine,
};
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

pub(crate) fn load_config(db_override: Option<&Path>) -> GovernanceConfig {
    let mut config = GovernanceConfig::from_env();
    if let Some(db) = db_override {
        config.db_path = db.display().to_string();
    }
    config
}

/// Open storage and rebuild the audit log from it. Fails if the stored
/// event chain does not reproduce the persisted root.
pub(crate) fn open_audit(
    config: &GovernanceConfig,
) -> anyhow::Result<(GovernanceStore, Arc<AuditLog>)> {
    let path = Path::new(&config.db_path);
    ensure_parent_dir(path)?;
    debug!(db = %config.db_path, "opening governance store");
    let store = GovernanceStore::open(path)?;
    let audit = Arc::new(AuditLog::open(store.clone())?);
    Ok((store, audit))
}

pub(crate) fn consent_service(
    store: GovernanceStore,
    audit: Arc<AuditLog>,
    config: &GovernanceConfig,
) -> Arc<ConsentService> {
    let cache = Arc::new(MokaConsentCache::new(
        config.cache_capacity,
        config.cache_ttl(),
    ));
    Arc::new(ConsentService::new(store, audit, cache))
}

/// Local two-arm rule by default; delegates to the remote oracle only
/// when both a policy URL and the delegation flag are configured.
pub(crate) fn policy_engine(config: &GovernanceConfig) -> anyhow::Result<Arc<PolicyDecisionEngine>> {
    let engine = match &config.policy_url {
        Some(url) if config.delegate_policy => {
            let oracle = HttpDecisionOracle::with_timeout(url.clone(), config.policy_timeout())?
                .with_package(config.policy_package.clone());
            PolicyDecisionEngine::delegated(Box::new(oracle))
        }
        _ => PolicyDecisionEngine::local(),
    };
    Ok(Arc::new(engine))
}

pub(crate) fn pipeline(
    consent: Arc<ConsentService>,
    policy: Arc<PolicyDecisionEngine>,
    audit: Arc<AuditLog>,
    config: &GovernanceConfig,
) -> IngestionPipeline {
    let age = AgeVerifier::new().with_malformed_policy(config.malformed_dob_policy());
    IngestionPipeline::new(consent, policy, audit).with_age_verifier(age)
}

pub(crate) fn ensure_parent_dir(path: &Path) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn db_override_wins() {
        let config = load_config(Some(Path::new("/tmp/override.db")));
        assert_eq!(config.db_path, "/tmp/override.db");
    }

    #[test]
    fn ensure_parent_dir_creates_nested_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("nested/state/gov.db");
        ensure_parent_dir(&db).unwrap();
        assert!(db.parent().unwrap().is_dir());
    }

    #[test]
    fn bare_filename_needs_no_parent_dir() {
        ensure_parent_dir(Path::new("custodia.db")).unwrap();
    }
}
