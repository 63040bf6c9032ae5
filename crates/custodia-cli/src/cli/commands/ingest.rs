use super::super::args::IngestArgs;
use super::stack;
use crate::exit_codes::{DENIED, SUCCESS};
use anyhow::Context;
use custodia_core::{GovernanceConfig, IngestRequest, IngestionOutcome};

pub(crate) async fn run(args: IngestArgs, config: &GovernanceConfig) -> anyhow::Result<i32> {
    let raw = std::fs::read_to_string(&args.input)
        .with_context(|| format!("failed to read {}", args.input.display()))?;
    let request: IngestRequest = serde_json::from_str(&raw)
        .with_context(|| format!("invalid ingestion request in {}", args.input.display()))?;

    let (store, audit) = stack::open_audit(config)?;
    let consent = stack::consent_service(store, audit.clone(), config);
    let policy = stack::policy_engine(config)?;
    let pipeline = stack::pipeline(consent, policy, audit, config);

    let outcome = pipeline.submit(&request).await?;
    println!("{}", serde_json::to_string_pretty(&outcome)?);
    Ok(match outcome {
        IngestionOutcome::Allowed { .. } => SUCCESS,
        IngestionOutcome::Denied { .. } => DENIED,
    })
}
