use super::args::*;

pub(crate) mod audit;
pub(crate) mod consent;
pub(crate) mod ingest;
pub(crate) mod stack;
pub(crate) mod sweep;

pub async fn dispatch(cli: Cli) -> anyhow::Result<i32> {
    let config = stack::load_config(cli.db.as_deref());
    match cli.cmd {
        Command::Consent(args) => consent::run(args, &config),
        Command::Ingest(args) => ingest::run(args, &config).await,
        Command::Audit(args) => audit::run(args, &config),
        Command::Sweep(args) => sweep::run(args, &config).await,
    }
}
