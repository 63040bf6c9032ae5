use super::super::args::{ConsentArgs, ConsentSub};
use super::stack;
use crate::exit_codes::SUCCESS;
use custodia_core::{ConsentDraft, ConsentUpdate, GovernanceConfig};

pub(crate) fn run(args: ConsentArgs, config: &GovernanceConfig) -> anyhow::Result<i32> {
    let (store, audit) = stack::open_audit(config)?;
    let svc = stack::consent_service(store, audit, config);

    match args.cmd {
        ConsentSub::Create(create) => {
            let record = svc.create(ConsentDraft {
                principal_id: create.principal,
                purpose: create.purpose,
                scope: create.scope,
                expires_at: create.expires_at,
            })?;
            println!("{}", serde_json::to_string_pretty(&record)?);
        }
        ConsentSub::Get { id } => {
            let record = svc.get(id)?;
            println!("{}", serde_json::to_string_pretty(&record)?);
        }
        ConsentSub::List(list) => {
            let records = svc.list(list.principal.as_deref(), list.purpose.as_deref())?;
            println!("{}", serde_json::to_string_pretty(&records)?);
        }
        ConsentSub::Update(update) => {
            let record = svc.update(
                update.id,
                ConsentUpdate {
                    purpose: update.purpose,
                    scope: update.scope,
                    expires_at: update.expires_at,
                    active: update.active,
                },
            )?;
            println!("{}", serde_json::to_string_pretty(&record)?);
        }
        ConsentSub::Withdraw { id } => {
            let record = svc.withdraw(id)?;
            eprintln!(
                "consent withdrawn: id={} principal={}",
                record.id, record.principal_id
            );
        }
    }
    Ok(SUCCESS)
}
