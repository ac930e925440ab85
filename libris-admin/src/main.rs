//! libris-admin - operator CLI for a Libris catalog database
//!
//! Runs lifecycle operations that have no place on the request path:
//! database setup, reclamation and reconciliation sweeps (once or on a
//! schedule), moderation, tombstone/restore and audit history lookups.
//!
//! Command results are printed to stdout as JSON; logs go to stderr.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use libris_common::config::LibrisConfig;
use libris_core::models::EntityKind;
use libris_core::privileges::{Capability, Role};
use libris_core::search::MemorySearchIndex;
use libris_core::Catalog;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

mod commands;

const VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    " (",
    env!("GIT_HASH"),
    ", ",
    env!("BUILD_PROFILE"),
    ", built ",
    env!("BUILD_TIMESTAMP"),
    ")"
);

/// Command-line arguments for libris-admin
#[derive(Parser, Debug)]
#[command(name = "libris-admin")]
#[command(about = "Operator commands for the Libris catalog lifecycle engine")]
#[command(version = VERSION)]
struct Args {
    /// Config file (defaults to LIBRIS_CONFIG, then the platform config dir)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Root folder holding libris.db
    #[arg(short, long, global = true)]
    root_folder: Option<String>,

    /// Username the command acts as
    #[arg(short, long, global = true, env = "LIBRIS_ACTOR")]
    actor: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create the database (if missing) and optionally a first admin user
    Init {
        #[arg(long)]
        admin: Option<String>,
    },

    /// Add a user with a role and optional custom grants
    AddUser {
        username: String,
        #[arg(long, default_value = "default")]
        role: Role,
        #[arg(long = "grant")]
        grants: Vec<Capability>,
    },

    /// Tombstone vocabulary entries no live work references
    SweepUnused {
        /// List what would be retired without writing
        #[arg(long)]
        dry_run: bool,
    },

    /// Tombstone live segments and images whose owner is tombstoned
    ReconcileOrphans,

    /// Run both sweeps on an interval until interrupted
    Schedule {
        /// Seconds between passes (defaults to sweeps.interval_secs)
        #[arg(long)]
        interval_secs: Option<u64>,
    },

    /// Soft-delete a work with its segments and images
    Tombstone { work_id: Uuid },

    /// Soft-delete a segment, its images and its child segments
    TombstoneSegment { segment_id: Uuid },

    /// Restore a tombstoned work and what its tombstone retired
    Restore { work_id: Uuid },

    /// Restore a tombstoned segment under a live work
    RestoreSegment { segment_id: Uuid },

    /// Approve a work awaiting moderation
    Approve { work_id: Uuid },

    /// Reject a work awaiting moderation
    Reject { work_id: Uuid },

    /// Flag a pending work as a likely duplicate and issue a confirmation link
    FlagDuplicate { work_id: Uuid },

    /// Follow a creation-confirmation token
    Confirm { token: String },

    /// Issue a login link for a user
    LoginLink { username: String },

    /// Print the moderation history of a record
    History {
        #[arg(value_parser = parse_entity_kind)]
        kind: EntityKind,
        id: Uuid,
    },
}

fn parse_entity_kind(s: &str) -> Result<EntityKind, String> {
    EntityKind::parse(s).ok_or_else(|| format!("unknown record kind '{}'", s))
}

fn init_logging(default_level: &str) {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("libris_admin={0},libris_core={0},libris_common={0}", default_level).into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = LibrisConfig::discover(args.config.as_deref()).context("Failed to load configuration")?;
    init_logging(&config.logging.level);

    info!(version = VERSION, "Starting libris-admin");

    let db_path = config.database_path(args.root_folder.as_deref());
    // No external search service from the CLI; index updates land in memory
    let catalog = Catalog::open(&config, &db_path, Arc::new(MemorySearchIndex::new()))
        .await
        .with_context(|| format!("Failed to open catalog at {}", db_path.display()))?;

    commands::run(&catalog, &config, args.actor.as_deref(), args.command).await
}
