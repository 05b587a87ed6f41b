use lexa_core::models::{ConflictChoice, ConflictSnapshot};
use lexa_core::sync::{BatchSummary, SyncAction, SyncReport};
use lexa_core::SyncStatus;
use serde::Serialize;

use crate::cli::KeepSide;
use crate::commands::common::{format_timestamp, resolve_session_id, short_id, AppContext};
use crate::error::CliError;

pub async fn run_sync(context: &AppContext) -> Result<BatchSummary, CliError> {
    let user_id = context.user_id()?;
    let orchestrator = context.orchestrator().await?;

    let summary = orchestrator
        .sync_all_pending(user_id, |current, total, session_id| {
            println!(
                "[{current}/{total}] Syncing {}",
                short_id(&session_id.to_string())
            );
        })
        .await?;

    for report in &summary.reports {
        println!("{}", format_report(report));
    }
    println!(
        "Sync completed: {} synced, {} conflict(s), {} failed",
        summary.synced, summary.conflicts, summary.failed
    );
    Ok(summary)
}

pub async fn run_sync_session(id: &str, context: &AppContext) -> Result<SyncReport, CliError> {
    let user_id = context.user_id()?;
    let orchestrator = context.orchestrator().await?;
    let sessions = orchestrator.local().list_sessions().await?;
    let session_id = resolve_session_id(id, &sessions)?;

    let report = orchestrator.sync_one(user_id, &session_id).await?;
    println!("{}", format_report(&report));
    Ok(report)
}

pub async fn run_sync_retry(context: &AppContext) -> Result<usize, CliError> {
    let moved = context.local_store().retry_failed().await?;
    println!("Re-queued {moved} failed session(s)");
    Ok(moved)
}

pub async fn run_sync_resolve(
    id: &str,
    keep: KeepSide,
    context: &AppContext,
) -> Result<SyncReport, CliError> {
    let user_id = context.user_id()?;
    let orchestrator = context.orchestrator().await?;
    let sessions = orchestrator.local().list_sessions().await?;
    let session_id = resolve_session_id(id, &sessions)?;

    let choice = match keep {
        KeepSide::Local => ConflictChoice::KeepLocal,
        KeepSide::Remote => ConflictChoice::KeepRemote,
    };
    let report = orchestrator
        .resolve_conflict(user_id, &session_id, choice)
        .await?;
    println!("{}", format_report(&report));
    Ok(report)
}

#[derive(Debug, Serialize)]
pub struct ConflictItem {
    pub session_id: String,
    pub local_words: usize,
    pub remote_words: usize,
    pub local_timestamp: i64,
    pub remote_timestamp: i64,
    pub time_delta_ms: i64,
    pub detected_at: i64,
    pub detected_at_iso: String,
}

pub fn conflict_to_item(snapshot: &ConflictSnapshot) -> ConflictItem {
    ConflictItem {
        session_id: snapshot.local.id.to_string(),
        local_words: snapshot.local_words.len(),
        remote_words: snapshot.remote_words.len(),
        local_timestamp: snapshot.local.timestamp,
        remote_timestamp: snapshot.remote.timestamp,
        time_delta_ms: snapshot.time_delta_ms(),
        detected_at: snapshot.detected_at,
        detected_at_iso: format_timestamp(snapshot.detected_at),
    }
}

pub async fn run_sync_conflicts(as_json: bool, context: &AppContext) -> Result<(), CliError> {
    let sessions = context.local_store().list_sessions().await?;
    let items: Vec<ConflictItem> = sessions
        .iter()
        .filter(|entry| entry.sync_status == SyncStatus::Conflict)
        .filter_map(|entry| entry.conflict.as_ref())
        .map(conflict_to_item)
        .collect();

    if as_json {
        println!("{}", serde_json::to_string_pretty(&items)?);
        return Ok(());
    }

    if items.is_empty() {
        println!("No sessions waiting for a conflict decision.");
        return Ok(());
    }

    for item in &items {
        println!(
            "{:<13}  local {} word(s) vs remote {} word(s)  delta {}ms  detected {}",
            short_id(&item.session_id),
            item.local_words,
            item.remote_words,
            item.time_delta_ms,
            item.detected_at_iso
        );
    }
    println!();
    println!("Resolve with `lexa sync resolve <ID> --keep local|remote`.");
    Ok(())
}

pub fn format_report(report: &SyncReport) -> String {
    let marker = if report.success { "ok" } else { "!!" };
    let detail = match &report.action {
        SyncAction::Downloaded { words, .. } => format!("{} ({} word(s))", report.message, words.len()),
        _ => report.message.clone(),
    };
    format!(
        "{marker} {:<13}  {:<11}  {detail}",
        short_id(&report.session_id.to_string()),
        report.action.label()
    )
}
