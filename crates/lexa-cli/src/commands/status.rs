use chrono::Utc;
use lexa_core::models::QueueDocument;
use lexa_core::SessionWithSync;
use serde::Serialize;

use crate::commands::common::{
    format_session_lines, session_to_list_item, AppContext, SessionListItem,
};
use crate::error::CliError;

#[derive(Debug, Serialize)]
pub struct StatusReport {
    pub sessions: Vec<SessionListItem>,
    pub unsynced: usize,
    pub queued_stats: usize,
    pub dead_letters: usize,
}

pub async fn run_status(as_json: bool, context: &AppContext) -> Result<(), CliError> {
    let sessions = context.local_store().list_sessions().await?;
    let queue = context.queue_document().await?;
    let now_ms = Utc::now().timestamp_millis();
    let report = build_status(&sessions, &queue, now_ms);

    if as_json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    if sessions.is_empty() {
        println!("No sessions yet.");
    } else {
        for line in format_session_lines(&sessions, now_ms) {
            println!("{line}");
        }
    }
    println!();
    println!(
        "{} session(s) waiting for sync, {} stats delta(s) queued, {} discarded",
        report.unsynced, report.queued_stats, report.dead_letters
    );
    Ok(())
}

pub fn build_status(
    sessions: &[SessionWithSync],
    queue: &QueueDocument,
    now_ms: i64,
) -> StatusReport {
    StatusReport {
        sessions: sessions
            .iter()
            .map(|entry| session_to_list_item(entry, now_ms))
            .collect(),
        unsynced: sessions
            .iter()
            .filter(|entry| entry.sync_status.needs_sync())
            .count(),
        queued_stats: queue.items.len(),
        dead_letters: queue.dead_letters.len(),
    }
}
