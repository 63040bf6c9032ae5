use super::super::args::{AuditArgs, AuditSub};
use super::stack;
use crate::exit_codes::{DENIED, SUCCESS};
use anyhow::Context;
use custodia_core::{verify, AuditProof, GovernanceConfig};
use serde_json::json;

pub(crate) fn run(args: AuditArgs, config: &GovernanceConfig) -> anyhow::Result<i32> {
    match args.cmd {
        AuditSub::Root => {
            let (_store, audit) = stack::open_audit(config)?;
            let summary = json!({
                "events": audit.len(),
                "root": audit.root(),
            });
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        AuditSub::Event { index } => {
            let (_store, audit) = stack::open_audit(config)?;
            let event = audit.event(index)?;
            println!("{}", serde_json::to_string_pretty(&event)?);
        }
        AuditSub::Prove { index, out } => {
            let (_store, audit) = stack::open_audit(config)?;
            let proof = audit.prove(index)?;
            let rendered = serde_json::to_string_pretty(&proof)?;
            match out {
                Some(path) => {
                    std::fs::write(&path, rendered)
                        .with_context(|| format!("failed to write {}", path.display()))?;
                    eprintln!("proof written: {}", path.display());
                }
                None => println!("{rendered}"),
            }
        }
        AuditSub::Verify { proof, root } => {
            let raw = std::fs::read_to_string(&proof)
                .with_context(|| format!("failed to read {}", proof.display()))?;
            let proof: AuditProof = serde_json::from_str(&raw).context("invalid proof JSON")?;
            // With --root the check runs fully offline against the pinned root.
            let expected = match root {
                Some(root) => root,
                None => {
                    let (_store, audit) = stack::open_audit(config)?;
                    audit
                        .root()
                        .context("audit log is empty, no root to verify against")?
                }
            };
            if verify(&proof, &expected) {
                eprintln!("proof ok: index={} root={expected}", proof.sequence_index);
            } else {
                eprintln!("proof REJECTED: index={}", proof.sequence_index);
                return Ok(DENIED);
            }
        }
    }
    Ok(SUCCESS)
}
