use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "custodia",
    version,
    about = "Consent-gated data ingestion with a tamper-evident Merkle audit trail"
)]
pub struct Cli {
    /// SQLite database path (default: custodia.db)
    #[arg(long, global = true, env = "CUSTODIA_DB")]
    pub db: Option<PathBuf>,

    #[command(subcommand)]
    pub cmd: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Manage consent grants
    Consent(ConsentArgs),
    /// Submit a data ingestion request
    Ingest(IngestArgs),
    /// Inspect and verify the audit log
    Audit(AuditArgs),
    /// Purge ingest records past the retention window
    Sweep(SweepArgs),
}

#[derive(clap::Args)]
pub struct ConsentArgs {
    #[command(subcommand)]
    pub cmd: ConsentSub,
}

#[derive(Subcommand)]
pub enum ConsentSub {
    /// Record a new consent grant
    Create(ConsentCreateArgs),
    /// Show one consent by id
    Get {
        #[arg(long)]
        id: i64,
    },
    /// List consents, optionally filtered
    List(ConsentListArgs),
    /// Apply a partial update to a consent
    Update(ConsentUpdateArgs),
    /// Withdraw a consent grant
    Withdraw {
        #[arg(long)]
        id: i64,
    },
}

#[derive(clap::Args, Debug, Clone)]
pub struct ConsentCreateArgs {
    /// Data principal granting consent
    #[arg(long)]
    pub principal: String,

    /// Processing purpose the grant covers
    #[arg(long)]
    pub purpose: String,

    /// Data categories in scope (repeat or comma-separate)
    #[arg(long, value_delimiter = ',')]
    pub scope: Vec<String>,

    /// Expiry timestamp (RFC 3339); omit for an open-ended grant
    #[arg(long)]
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(clap::Args, Debug, Clone)]
pub struct ConsentListArgs {
    /// Only consents for this data principal
    #[arg(long)]
    pub principal: Option<String>,

    /// Only consents for this purpose
    #[arg(long)]
    pub purpose: Option<String>,
}

#[derive(clap::Args, Debug, Clone)]
pub struct ConsentUpdateArgs {
    #[arg(long)]
    pub id: i64,

    /// New processing purpose
    #[arg(long)]
    pub purpose: Option<String>,

    /// Replacement scope list
    #[arg(long, value_delimiter = ',')]
    pub scope: Option<Vec<String>>,

    /// New expiry timestamp (RFC 3339)
    #[arg(long)]
    pub expires_at: Option<DateTime<Utc>>,

    /// Activate or deactivate the grant
    #[arg(long)]
    pub active: Option<bool>,
}

#[derive(clap::Args, Debug, Clone)]
pub struct IngestArgs {
    /// Ingestion request JSON file
    #[arg(long)]
    pub input: PathBuf,
}

#[derive(clap::Args)]
pub struct AuditArgs {
    #[command(subcommand)]
    pub cmd: AuditSub,
}

#[derive(Subcommand)]
pub enum AuditSub {
    /// Print the current Merkle root and event count
    Root,
    /// Print one audit event by sequence index
    Event {
        #[arg(long)]
        index: u64,
    },
    /// Produce an inclusion proof for one event
    Prove {
        #[arg(long)]
        index: u64,

        /// Write the proof JSON here instead of stdout
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Check an inclusion proof against a trusted root
    Verify {
        /// Proof JSON produced by `audit prove`
        #[arg(long)]
        proof: PathBuf,

        /// Trusted root hex (default: the current root of the log)
        #[arg(long)]
        root: Option<String>,
    },
}

#[derive(clap::Args, Debug, Clone)]
pub struct SweepArgs {
    /// Keep sweeping at the configured poll interval instead of exiting
    #[arg(long)]
    pub follow: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_debug_assert() {
        Cli::command().debug_assert();
    }

    #[test]
    fn consent_create_splits_scope_on_commas() {
        let cli = Cli::try_parse_from([
            "custodia", "consent", "create", "--principal", "p1", "--purpose", "research",
            "--scope", "name,email",
        ])
        .expect("parse should succeed");

        match cli.cmd {
            Command::Consent(consent) => match consent.cmd {
                ConsentSub::Create(args) => {
                    assert_eq!(args.principal, "p1");
                    assert_eq!(args.purpose, "research");
                    assert_eq!(args.scope, vec!["name", "email"]);
                    assert_eq!(args.expires_at, None);
                }
                _ => panic!("expected ConsentSub::Create"),
            },
            _ => panic!("expected Command::Consent"),
        }
    }

    #[test]
    fn consent_update_accepts_partial_fields() {
        let cli = Cli::try_parse_from([
            "custodia", "consent", "update", "--id", "7", "--active", "false",
        ])
        .expect("parse should succeed");

        match cli.cmd {
            Command::Consent(consent) => match consent.cmd {
                ConsentSub::Update(args) => {
                    assert_eq!(args.id, 7);
                    assert_eq!(args.active, Some(false));
                    assert_eq!(args.purpose, None);
                    assert_eq!(args.scope, None);
                }
                _ => panic!("expected ConsentSub::Update"),
            },
            _ => panic!("expected Command::Consent"),
        }
    }

    #[test]
    fn expires_at_parses_rfc3339() {
        let cli = Cli::try_parse_from([
            "custodia", "consent", "create", "--principal", "p1", "--purpose", "research",
            "--scope", "name", "--expires-at", "2027-01-01T00:00:00Z",
        ])
        .expect("parse should succeed");

        match cli.cmd {
            Command::Consent(consent) => match consent.cmd {
                ConsentSub::Create(args) => {
                    let expiry = args.expires_at.expect("expiry should be set");
                    assert_eq!(expiry.to_rfc3339(), "2027-01-01T00:00:00+00:00");
                }
                _ => panic!("expected ConsentSub::Create"),
            },
            _ => panic!("expected Command::Consent"),
        }
    }

    #[test]
    fn audit_verify_takes_optional_root() {
        let cli = Cli::try_parse_from([
            "custodia", "audit", "verify", "--proof", "proof.json", "--root", "abc123",
        ])
        .expect("parse should succeed");

        match cli.cmd {
            Command::Audit(audit) => match audit.cmd {
                AuditSub::Verify { proof, root } => {
                    assert_eq!(proof, PathBuf::from("proof.json"));
                    assert_eq!(root.as_deref(), Some("abc123"));
                }
                _ => panic!("expected AuditSub::Verify"),
            },
            _ => panic!("expected Command::Audit"),
        }
    }

    #[test]
    fn db_flag_is_accepted_after_subcommand() {
        let cli = Cli::try_parse_from(["custodia", "audit", "root", "--db", "/tmp/gov.db"])
            .expect("parse should succeed");
        assert_eq!(cli.db, Some(PathBuf::from("/tmp/gov.db")));
    }
}
