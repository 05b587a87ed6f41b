use chrono::Utc;
use lexa_core::models::{DeadLetter, PendingSyncItem};
use lexa_core::sync::ProcessSummary;
use serde::Serialize;

use crate::commands::common::{format_relative_time, format_timestamp, AppContext};
use crate::error::CliError;

pub async fn run_queue_process(context: &AppContext) -> Result<ProcessSummary, CliError> {
    let queue = context.queue().await?;
    let summary = queue.process().await?;
    println!(
        "Queue processed: {} committed, {} failed, {} waiting for backoff, {} discarded",
        summary.success, summary.failed, summary.deferred, summary.discarded
    );
    Ok(summary)
}

#[derive(Debug, Serialize)]
pub struct QueueItemView {
    pub id: String,
    pub date: String,
    pub test_count: u32,
    pub correct_count: u32,
    pub points: i64,
    pub expected_version: Option<i64>,
    pub retry_count: u32,
    pub last_error: Option<String>,
    pub next_attempt_at: i64,
    pub next_attempt_at_iso: String,
}

pub fn queue_item_view(item: &PendingSyncItem) -> QueueItemView {
    QueueItemView {
        id: item.id.to_string(),
        date: item.delta.date.to_string(),
        test_count: item.delta.test_count,
        correct_count: item.delta.correct_count,
        points: item.delta.points,
        expected_version: item.expected_version,
        retry_count: item.retry_count,
        last_error: item.last_error.clone(),
        next_attempt_at: item.next_attempt_at,
        next_attempt_at_iso: format_timestamp(item.next_attempt_at),
    }
}

pub async fn run_queue_list(as_json: bool, context: &AppContext) -> Result<(), CliError> {
    let document = context.queue_document().await?;
    let items: Vec<QueueItemView> = document.items.iter().map(queue_item_view).collect();

    if as_json {
        println!("{}", serde_json::to_string_pretty(&items)?);
        return Ok(());
    }

    if items.is_empty() {
        println!("No statistics waiting for sync.");
        return Ok(());
    }

    for item in &items {
        let error = item.last_error.as_deref().unwrap_or("-");
        println!(
            "{}  {} tested / {} correct / {} pts  retries {}  next {}  {error}",
            item.date,
            item.test_count,
            item.correct_count,
            item.points,
            item.retry_count,
            item.next_attempt_at_iso
        );
    }
    Ok(())
}

pub async fn run_queue_dead_letters(
    clear: bool,
    as_json: bool,
    context: &AppContext,
) -> Result<Vec<DeadLetter>, CliError> {
    let queue = context.detached_queue()?;
    let dead_letters = queue.dead_letters().await?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&dead_letters)?);
    } else if dead_letters.is_empty() {
        println!("No discarded statistics.");
    } else {
        let now_ms = Utc::now().timestamp_millis();
        for letter in &dead_letters {
            println!(
                "{}  {} tested / {} correct / {} pts  discarded {}  {}",
                letter.item.delta.date,
                letter.item.delta.test_count,
                letter.item.delta.correct_count,
                letter.item.delta.points,
                format_relative_time(letter.discarded_at, now_ms),
                letter.reason
            );
        }
    }

    if clear {
        let dropped = queue.clear_dead_letters().await?;
        if !as_json && dropped > 0 {
            println!("Cleared {dropped} discarded delta(s)");
        }
    }
    Ok(dead_letters)
}
