use super::super::args::SweepArgs;
use super::stack;
use crate::exit_codes::SUCCESS;
use chrono::Utc;
use custodia_core::{GovernanceConfig, RetentionSweeper};

pub(crate) async fn run(args: SweepArgs, config: &GovernanceConfig) -> anyhow::Result<i32> {
    let (store, audit) = stack::open_audit(config)?;
    let sweeper = RetentionSweeper::new(store, audit, config.retention_window());

    if args.follow {
        sweeper.run_forever(config.retention_poll()).await;
        return Ok(SUCCESS);
    }

    let removed = sweeper.run_once(Utc::now())?;
    eprintln!("retention sweep complete: removed={removed}");
    Ok(SUCCESS)
}
