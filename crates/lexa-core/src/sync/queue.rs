//! Durable queue of statistics deltas waiting for the remote ledger

use serde::Serialize;
use tokio::sync::Mutex;

use crate::clock::Clock;
use crate::config::SyncSettings;
use crate::models::{
    DeadLetter, LedgerReceipt, PendingSyncItem, QueueDocument, StatsDelta, StatsSubmission,
};
use crate::remote::StatsLedger;
use crate::store::DocumentStore;
use crate::{Error, Result};

/// Counts for one `process` pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ProcessSummary {
    /// Deltas committed to the ledger
    pub success: usize,
    /// Attempts that failed plus items discarded this pass
    pub failed: usize,
    /// Items still inside their backoff window
    pub deferred: usize,
    /// Items moved to the dead-letter list this pass
    pub discarded: usize,
}

/// Result of [`PendingSyncQueue::record`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordOutcome {
    /// The ledger accepted the delta right away
    Committed(LedgerReceipt),
    /// The ledger was unreachable; the delta waits in the queue
    Queued(PendingSyncItem),
}

/// At-least-once, bounded-retry delivery of statistics deltas.
///
/// Items are committed in insertion order by explicit `process` calls; the
/// queue never schedules itself. Exactly-once accounting is left to the
/// ledger's version check.
pub struct PendingSyncQueue<L, S> {
    ledger: L,
    store: S,
    user_id: String,
    settings: SyncSettings,
    clock: Clock,
    lock: Mutex<()>,
}

impl<L, S: DocumentStore<QueueDocument>> PendingSyncQueue<L, S> {
    pub fn new(ledger: L, store: S, user_id: impl Into<String>) -> Self {
        Self {
            ledger,
            store,
            user_id: user_id.into(),
            settings: SyncSettings::default(),
            clock: Clock::system(),
            lock: Mutex::new(()),
        }
    }

    #[must_use]
    pub fn with_settings(mut self, settings: SyncSettings) -> Self {
        self.settings = settings;
        self
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub const fn ledger(&self) -> &L {
        &self.ledger
    }

    /// Append a delta for a later `process` call.
    pub async fn enqueue(
        &self,
        delta: StatsDelta,
        expected_version: Option<i64>,
    ) -> Result<PendingSyncItem> {
        let _guard = self.lock.lock().await;
        let item = PendingSyncItem::new(delta, expected_version, self.clock.now_millis());
        let mut document = self.load().await?;
        document.items.push(item.clone());
        self.store.save(&document).await?;
        tracing::debug!("Queued stats delta {} for {}", item.id, item.delta.date);
        Ok(item)
    }

    /// Items still waiting, in insertion order
    pub async fn pending(&self) -> Result<Vec<PendingSyncItem>> {
        Ok(self.load().await?.items)
    }

    pub async fn dead_letters(&self) -> Result<Vec<DeadLetter>> {
        Ok(self.load().await?.dead_letters)
    }

    /// Forget discarded deltas; returns how many were dropped.
    pub async fn clear_dead_letters(&self) -> Result<usize> {
        let _guard = self.lock.lock().await;
        let mut document = self.load().await?;
        let dropped = document.dead_letters.len();
        if dropped > 0 {
            document.dead_letters.clear();
            self.store.save(&document).await?;
        }
        Ok(dropped)
    }

    async fn load(&self) -> Result<QueueDocument> {
        match self.store.load().await {
            Ok(document) => Ok(document.unwrap_or_default()),
            Err(Error::Corrupted(reason)) => {
                tracing::warn!("Discarding corrupted sync queue: {}", reason);
                Ok(QueueDocument::default())
            }
            Err(error) => Err(error),
        }
    }
}

impl<S: DocumentStore<QueueDocument>> PendingSyncQueue<(), S> {
    /// Queue that can only inspect and edit its document, for callers
    /// without a ledger connection.
    pub fn detached(store: S, user_id: impl Into<String>) -> Self {
        Self::new((), store, user_id)
    }
}

impl<L: StatsLedger, S: DocumentStore<QueueDocument>> PendingSyncQueue<L, S> {
    /// Commit a delta now, queueing it when the ledger is unreachable.
    ///
    /// Frozen-date and other permanent errors are returned, not queued.
    pub async fn record(
        &self,
        delta: StatsDelta,
        expected_version: Option<i64>,
    ) -> Result<RecordOutcome> {
        match self.commit(&delta, expected_version).await {
            Ok(receipt) => Ok(RecordOutcome::Committed(receipt)),
            Err(error) if error.is_transient() => {
                tracing::warn!("Ledger unavailable ({}); queueing stats delta", error);
                let item = self.enqueue(delta, expected_version).await?;
                Ok(RecordOutcome::Queued(item))
            }
            Err(error) => Err(error),
        }
    }

    /// Process the queue at the current time.
    pub async fn process(&self) -> Result<ProcessSummary> {
        self.process_at(self.clock.now_millis()).await
    }

    /// Try every due item once, in insertion order.
    ///
    /// A frozen-date rejection drops the offending item, persists the queue
    /// and is returned as an error; items after it stay untouched.
    pub async fn process_at(&self, now: i64) -> Result<ProcessSummary> {
        let _guard = self.lock.lock().await;
        let mut document = self.load().await?;
        let mut summary = ProcessSummary::default();
        let mut kept = Vec::with_capacity(document.items.len());
        let mut items = std::mem::take(&mut document.items).into_iter();

        while let Some(mut item) = items.next() {
            if item.retry_count >= self.settings.max_retries {
                tracing::warn!(
                    "Discarding stats delta {} for {} after {} attempts",
                    item.id,
                    item.delta.date,
                    item.retry_count
                );
                let reason = item
                    .last_error
                    .clone()
                    .unwrap_or_else(|| "retries exhausted".to_string());
                document.dead_letters.push(DeadLetter {
                    item,
                    discarded_at: now,
                    reason,
                });
                summary.failed += 1;
                summary.discarded += 1;
                continue;
            }

            if !item.is_due(now) {
                summary.deferred += 1;
                kept.push(item);
                continue;
            }

            match self.commit(&item.delta, item.expected_version).await {
                Ok(receipt) => {
                    if receipt.conflict_detected {
                        tracing::info!(
                            "Stats delta {} merged additively into {} (version {})",
                            item.id,
                            receipt.date,
                            receipt.version
                        );
                    }
                    summary.success += 1;
                }
                Err(error) if error.is_frozen_date() => {
                    tracing::error!("Dropping stats delta {}: {}", item.id, error);
                    kept.extend(items);
                    document.items = kept;
                    self.store.save(&document).await?;
                    return Err(error);
                }
                Err(error) if error.is_transient() => {
                    item.retry_count += 1;
                    item.last_error = Some(error.to_string());
                    let delay = self.settings.backoff_for(item.retry_count);
                    item.next_attempt_at =
                        now.saturating_add(i64::try_from(delay.as_millis()).unwrap_or(i64::MAX));
                    tracing::warn!(
                        "Stats delta {} failed (attempt {}): {}; next try in {:?}",
                        item.id,
                        item.retry_count,
                        error,
                        delay
                    );
                    summary.failed += 1;
                    kept.push(item);
                }
                Err(error) => {
                    tracing::warn!("Stats delta {} rejected: {}", item.id, error);
                    document.dead_letters.push(DeadLetter {
                        item,
                        discarded_at: now,
                        reason: error.to_string(),
                    });
                    summary.failed += 1;
                    summary.discarded += 1;
                }
            }
        }

        document.items = kept;
        self.store.save(&document).await?;
        tracing::debug!(
            "Queue pass: {} committed, {} failed, {} deferred",
            summary.success,
            summary.failed,
            summary.deferred
        );
        Ok(summary)
    }

    async fn commit(
        &self,
        delta: &StatsDelta,
        expected_version: Option<i64>,
    ) -> Result<LedgerReceipt> {
        let submission = StatsSubmission {
            test_date: Some(delta.date),
            test_count: delta.test_count,
            correct_count: delta.correct_count,
            points: delta.points,
            timezone_offset: Some(self.settings.reference_offset_hours),
            expected_version,
        };
        self.ledger.record_and_sync(&self.user_id, &submission).await
    }
}
