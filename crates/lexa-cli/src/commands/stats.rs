use chrono::NaiveDate;
use lexa_core::models::{LedgerReceipt, StatsDelta};
use lexa_core::remote::StatsLedger;
use lexa_core::sync::RecordOutcome;

use crate::commands::common::{format_timestamp, AppContext};
use crate::error::CliError;

pub struct RecordArgs {
    pub tests: u32,
    pub correct: u32,
    pub points: i64,
    pub date: Option<NaiveDate>,
    pub expected_version: Option<i64>,
}

pub fn build_delta(args: &RecordArgs, today: NaiveDate) -> Result<StatsDelta, CliError> {
    if args.correct > args.tests {
        return Err(CliError::Config(format!(
            "--correct ({}) cannot exceed --tests ({})",
            args.correct, args.tests
        )));
    }
    Ok(StatsDelta {
        date: args.date.unwrap_or(today),
        test_count: args.tests,
        correct_count: args.correct,
        points: args.points,
    })
}

pub async fn run_stats_record(
    args: &RecordArgs,
    context: &AppContext,
) -> Result<RecordOutcome, CliError> {
    let delta = build_delta(args, context.today())?;
    let queue = context.queue().await?;

    let outcome = queue.record(delta, args.expected_version).await?;
    match &outcome {
        RecordOutcome::Committed(receipt) => println!("{}", format_receipt(receipt)),
        RecordOutcome::Queued(item) => println!(
            "Remote unavailable; queued delta for {} ({})",
            item.delta.date,
            item.last_error.as_deref().unwrap_or("will retry on `lexa queue process`")
        ),
    }
    Ok(outcome)
}

pub async fn run_stats_show(
    date: Option<NaiveDate>,
    as_json: bool,
    context: &AppContext,
) -> Result<(), CliError> {
    let user_id = context.user_id()?;
    let date = date.unwrap_or_else(|| context.today());
    let stats = context.remote().await?.daily_stats(user_id, date).await?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
        return Ok(());
    }

    match stats {
        Some(stats) => {
            let frozen = if stats.is_frozen { "  [frozen]" } else { "" };
            println!(
                "{}: {} tested, {} correct, {} point(s), version {}{frozen}",
                stats.date, stats.total_count, stats.correct_count, stats.total_points, stats.version
            );
            println!("Last updated {}", format_timestamp(stats.updated_at));
        }
        None => println!("No statistics recorded for {date}."),
    }
    Ok(())
}

pub fn format_receipt(receipt: &LedgerReceipt) -> String {
    let mut line = format!(
        "Recorded for {}: {} tested, {} correct, {} point(s), {} unique word(s), version {}",
        receipt.date,
        receipt.total_count,
        receipt.correct_count,
        receipt.total_points,
        receipt.unique_words,
        receipt.version
    );
    if receipt.conflict_detected {
        line.push_str(" (merged with a concurrent update)");
    }
    line
}
