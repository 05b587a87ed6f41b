use lexa_core::{Session, SessionId, SyncStatus, WordRecord};

use crate::commands::common::{normalize_words, resolve_session_id, short_id, AppContext};
use crate::error::CliError;

pub async fn run_session_add(
    tag: &str,
    target: Option<u32>,
    words: &[String],
    context: &AppContext,
) -> Result<SessionId, CliError> {
    let words = normalize_words(words)?;
    let word_count = u32::try_from(words.len())
        .map_err(|_| CliError::Config("too many words for one session".to_string()))?;

    let mut session = Session::new(tag.trim(), target.unwrap_or(word_count));
    session.word_count = word_count;
    let records: Vec<WordRecord> = words
        .iter()
        .map(|text| WordRecord::new(session.id, text.as_str()))
        .collect();
    let id = session.id;

    context
        .local_store()
        .upsert_session(session, records, SyncStatus::Pending)
        .await?;
    println!("Created session {} with {} word(s)", short_id(&id.to_string()), word_count);
    Ok(id)
}

pub async fn run_session_delete(id: &str, context: &AppContext) -> Result<(), CliError> {
    let local = context.local_store();
    let sessions = local.list_sessions().await?;
    let session_id = resolve_session_id(id, &sessions)?;

    local.delete_session(&session_id).await?;
    println!(
        "Deleted session {} (syncs on next pass)",
        short_id(&session_id.to_string())
    );
    Ok(())
}
