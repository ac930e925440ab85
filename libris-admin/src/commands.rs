//! Command implementations

use std::time::Duration;

use anyhow::{Context, Result};
use libris_common::config::LibrisConfig;
use libris_core::audit::AuditTarget;
use libris_core::privileges::{Actor, Capability, Role};
use libris_core::scheduler::SweepScheduler;
use libris_core::{store, Catalog};
use serde::Serialize;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::Command;

pub async fn run(catalog: &Catalog, config: &LibrisConfig, actor: Option<&str>, command: Command) -> Result<()> {
    match command {
        Command::Init { admin } => init(catalog, admin.as_deref()).await,
        Command::AddUser { username, role, grants } => {
            let actor = resolve_actor(catalog, actor).await?;
            actor.require(Capability::Admin)?;
            let mut conn = catalog.db().acquire().await?;
            let user = store::actors::insert_user(&mut conn, &username, role, &grants)
                .await
                .with_context(|| format!("Failed to add user '{}'", username))?;
            print_json(&json!({ "username": username, "user": user }))
        }
        Command::SweepUnused { dry_run } => {
            let actor = resolve_actor(catalog, actor).await?;
            if dry_run {
                print_json(&catalog.sweeper().preview_unused(&actor).await?)
            } else {
                print_json(&catalog.sweeper().sweep_unused(&actor).await?)
            }
        }
        Command::ReconcileOrphans => {
            let actor = resolve_actor(catalog, actor).await?;
            print_json(&catalog.cascade().reconcile_orphans(&actor).await?)
        }
        Command::Schedule { interval_secs } => {
            let actor = resolve_actor(catalog, actor).await?;
            let interval = Duration::from_secs(interval_secs.unwrap_or(config.sweeps.interval_secs).max(1));
            schedule(catalog, actor, interval).await
        }
        Command::Tombstone { work_id } => {
            let actor = resolve_actor(catalog, actor).await?;
            print_json(&catalog.cascade().tombstone_work(work_id, &actor).await?)
        }
        Command::TombstoneSegment { segment_id } => {
            let actor = resolve_actor(catalog, actor).await?;
            print_json(&catalog.cascade().tombstone_segment(segment_id, &actor).await?)
        }
        Command::Restore { work_id } => {
            let actor = resolve_actor(catalog, actor).await?;
            print_json(&catalog.cascade().restore_work(work_id, &actor).await?)
        }
        Command::RestoreSegment { segment_id } => {
            let actor = resolve_actor(catalog, actor).await?;
            print_json(&catalog.cascade().restore_segment(segment_id, &actor).await?)
        }
        Command::Approve { work_id } => {
            let actor = resolve_actor(catalog, actor).await?;
            print_json(&catalog.moderator_approve(work_id, &actor).await?)
        }
        Command::Reject { work_id } => {
            let actor = resolve_actor(catalog, actor).await?;
            print_json(&catalog.moderator_reject(work_id, &actor).await?)
        }
        Command::FlagDuplicate { work_id } => {
            let actor = resolve_actor(catalog, actor).await?;
            print_json(&catalog.moderator_flag_duplicate(work_id, &actor).await?)
        }
        Command::Confirm { token } => {
            let confirmation = catalog.confirm(&token).await?;
            print_json(&json!({
                "message": confirmation.message(),
                "work": confirmation.work(),
            }))
        }
        Command::LoginLink { username } => {
            let actor = resolve_actor(catalog, actor).await?;
            actor.require(Capability::Admin)?;
            let user = find_user(catalog, &username).await?;
            print_json(&catalog.tokens().issue_login_link(user.id))
        }
        Command::History { kind, id } => print_json(&catalog.history(AuditTarget::new(kind, id)).await?),
    }
}

async fn init(catalog: &Catalog, admin: Option<&str>) -> Result<()> {
    let admin = match admin {
        Some(username) => {
            let mut conn = catalog.db().acquire().await?;
            let user = match store::actors::find_by_username(&mut conn, username).await? {
                Some(existing) => {
                    info!(username = username, "Admin user already exists");
                    existing
                }
                None => store::actors::insert_user(&mut conn, username, Role::Admin, &[]).await?,
            };
            Some(user)
        }
        None => None,
    };

    print_json(&json!({ "initialized": true, "admin": admin }))
}

async fn schedule(catalog: &Catalog, actor: Actor, interval: Duration) -> Result<()> {
    actor.require(Capability::Admin)?;

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Received Ctrl+C, stopping sweep scheduler");
                on_signal.cancel();
            }
            Err(e) => warn!(error = %e, "Ctrl+C handler unavailable; scheduler runs until killed"),
        }
    });

    let passes = SweepScheduler::new(catalog, actor, interval).run(cancel).await;
    print_json(&json!({ "passes": passes }))
}

async fn find_user(catalog: &Catalog, username: &str) -> Result<Actor> {
    let mut conn = catalog.db().acquire().await?;
    store::actors::find_by_username(&mut conn, username)
        .await?
        .with_context(|| format!("No user named '{}'", username))
}

async fn resolve_actor(catalog: &Catalog, username: Option<&str>) -> Result<Actor> {
    let username = username.context("This command needs --actor (or LIBRIS_ACTOR)")?;
    find_user(catalog, username).await
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
