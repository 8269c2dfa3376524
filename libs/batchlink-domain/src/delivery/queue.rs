//! One-shot batched delivery for publish and acknowledge calls
//!
//! `BatchQueue` is the caller-driven counterpart of `DeliveryStream`: the
//! caller hands over a complete set of entries and waits for the result.
//! Batches of one call are dispatched concurrently, and the limiter is shared
//! by every call made on the same queue.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::task::{self, JoinSet};
use tracing::{error, info, instrument};

use super::batcher::partition_by;
use super::config::DeliveryConfig;
use super::dispatcher::{DispatchOutcome, Dispatcher};
use super::entry::{AckEntry, BatchEntry, PublishEntry};
use super::error::{DeliveryError, Result};
use super::limiter::ConcurrencyLimiter;
use crate::ports::BatchTransport;

/// Batched, concurrent, retried delivery of caller-built entries
pub struct BatchQueue<T> {
    transport: Arc<T>,
    config: DeliveryConfig,
    limiter: ConcurrencyLimiter,
}

impl<T: Send + Sync + 'static> BatchQueue<T> {
    /// Create a queue for `config.target`
    ///
    /// # Errors
    ///
    /// Returns `DeliveryError::Config` if the configuration is invalid.
    pub fn new(config: DeliveryConfig, transport: T) -> Result<Self> {
        Self::from_shared(config, Arc::new(transport))
    }

    /// Create a queue over a transport shared with other components
    pub fn from_shared(config: DeliveryConfig, transport: Arc<T>) -> Result<Self> {
        config.validate()?;
        let limiter = ConcurrencyLimiter::new(config.max_in_flight);

        Ok(Self {
            transport,
            config,
            limiter,
        })
    }

    pub fn config(&self) -> &DeliveryConfig {
        &self.config
    }

    /// Publish `entries`, returning whatever could not be delivered
    ///
    /// The outcome's `error` is set whenever `failed` is not empty. It is
    /// `RetryBudgetExceeded` unless a batch failed for a non-retryable reason.
    pub async fn send_messages(&self, entries: Vec<PublishEntry>) -> DispatchOutcome<PublishEntry>
    where
        T: BatchTransport<PublishEntry>,
    {
        self.deliver(entries).await
    }

    /// Acknowledge (delete) consumed messages, returning the ones still pending
    pub async fn delete_messages(&self, entries: Vec<AckEntry>) -> DispatchOutcome<AckEntry>
    where
        T: BatchTransport<AckEntry>,
    {
        self.deliver(entries).await
    }

    #[instrument(skip(self, entries), fields(target_name = %self.config.target, entries = entries.len()))]
    async fn deliver<E>(&self, entries: Vec<E>) -> DispatchOutcome<E>
    where
        T: BatchTransport<E>,
        E: BatchEntry,
    {
        let mut outcome = DispatchOutcome {
            delivered: 0,
            failed: Vec::new(),
            attempts: 0,
            error: None,
        };
        if entries.is_empty() {
            return outcome;
        }

        let dispatcher = Dispatcher::new(
            Arc::clone(&self.transport),
            self.config.target.as_str(),
            self.config.retry,
        );
        let batches = partition_by(
            entries,
            self.config.max_batch_records,
            self.config.max_batch_bytes,
            |entry: &E| entry.byte_size(),
        );

        let mut tasks = JoinSet::new();
        let mut spawned: HashMap<task::Id, Vec<E>> = HashMap::new();
        for batch in batches {
            let slot = self.limiter.acquire().await;
            let dispatcher = dispatcher.clone();
            let copy = batch.clone();
            let handle = tasks.spawn(async move {
                let batch_outcome = dispatcher.submit(batch).await;
                slot.release();
                batch_outcome
            });
            spawned.insert(handle.id(), copy);
        }

        while let Some(joined) = tasks.join_next_with_id().await {
            match joined {
                Ok((id, batch_outcome)) => {
                    spawned.remove(&id);
                    outcome.delivered += batch_outcome.delivered;
                    outcome.attempts += batch_outcome.attempts;
                    outcome.failed.extend(batch_outcome.failed);
                    // Budget errors are summed up once every batch is in
                    if let Some(err) = batch_outcome
                        .error
                        .filter(|e| !matches!(e, DeliveryError::RetryBudgetExceeded { .. }))
                    {
                        outcome.error.get_or_insert(err);
                    }
                }
                Err(err) => {
                    let lost = spawned.remove(&err.id()).unwrap_or_default();
                    error!(records = lost.len(), error = %err, "Dispatch task failed");
                    outcome.error.get_or_insert(DeliveryError::internal(format!(
                        "dispatch task failed with {} entries: {err}",
                        lost.len()
                    )));
                    outcome.failed.extend(lost);
                }
            }
        }

        if !outcome.failed.is_empty() && outcome.error.is_none() {
            outcome.error = Some(DeliveryError::retry_budget_exceeded(
                self.config.retry.max_attempts,
                outcome.failed.len(),
            ));
        }

        info!(
            delivered = outcome.delivered,
            failed = outcome.failed.len(),
            attempts = outcome.attempts,
            "Batched delivery finished"
        );

        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delivery::testing::{
        eventually, FakeTransport, GatedTransport, PoisonedTransport, Reply,
    };
    use crate::delivery::{EntryId, RetryPolicy};
    use std::time::Duration;

    fn config(max_in_flight: usize) -> DeliveryConfig {
        DeliveryConfig::queue("orders")
            .with_max_in_flight(max_in_flight)
            .with_retry(RetryPolicy {
                max_attempts: 3,
                backoff: Duration::from_millis(10),
            })
    }

    fn messages(n: usize) -> Vec<PublishEntry> {
        (0..n)
            .map(|i| PublishEntry::new(format!("message-{i}"), "").with_id(format!("{i}")))
            .collect()
    }

    #[test]
    fn test_missing_target_fails_construction() {
        let result = BatchQueue::new(DeliveryConfig::queue(""), FakeTransport::new());
        assert!(matches!(result, Err(DeliveryError::Config(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_input_returns_immediately() {
        let transport = FakeTransport::new();
        let queue = BatchQueue::new(config(1), transport.clone()).unwrap();

        let outcome = queue.send_messages(Vec::new()).await;

        assert!(outcome.is_success());
        assert_eq!(transport.call_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_messages_splits_into_batches_of_ten() {
        let transport = FakeTransport::new();
        let queue = BatchQueue::new(config(1), transport.clone()).unwrap();

        let outcome = queue.send_messages(messages(25)).await;

        assert!(outcome.is_success());
        assert_eq!(outcome.delivered, 25);
        let mut sizes: Vec<usize> = transport.calls().iter().map(Vec::len).collect();
        sizes.sort_unstable();
        assert_eq!(sizes, vec![5, 10, 10]);
        assert!(transport.targets().iter().all(|t| t == "orders"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_messages_reports_undeliverable_entries() {
        let transport = FakeTransport::failing();
        let queue = BatchQueue::new(config(2), transport.clone()).unwrap();

        let outcome = queue.send_messages(messages(12)).await;

        assert_eq!(outcome.failed.len(), 12);
        assert_eq!(transport.call_count(), 6); // 2 batches x 3 attempts
        assert!(matches!(
            outcome.error,
            Some(DeliveryError::RetryBudgetExceeded { failed: 12, .. })
        ));
    }

    #[tokio::test]
    async fn test_panicked_batch_is_returned_as_failed() {
        let queue = BatchQueue::new(config(2), PoisonedTransport::new("11")).unwrap();

        let outcome = queue.send_messages(messages(12)).await;

        assert_eq!(outcome.delivered, 10);
        let mut failed: Vec<&str> = outcome.failed.iter().map(|e| e.id.as_str()).collect();
        failed.sort_unstable();
        assert_eq!(failed, vec!["10", "11"]);
        assert!(matches!(outcome.error, Some(DeliveryError::Internal(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_malformed_batch_error_is_surfaced() {
        let transport = FakeTransport::with_script(vec![Reply::Malformed]);
        let queue = BatchQueue::new(config(1), transport.clone()).unwrap();

        let outcome = queue.send_messages(messages(3)).await;

        assert_eq!(transport.call_count(), 1);
        assert_eq!(outcome.failed.len(), 3);
        assert!(matches!(outcome.error, Some(DeliveryError::Internal(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_delete_messages_retries_rejected_acks() {
        let transport = FakeTransport::with_script(vec![Reply::Reject(vec![1])]);
        let queue = BatchQueue::new(config(1), transport.clone()).unwrap();

        let acks = vec![
            AckEntry::new("a", "receipt-a"),
            AckEntry::new("b", "receipt-b"),
            AckEntry::new("c", "receipt-c"),
        ];
        let outcome = queue.delete_messages(acks).await;

        assert!(outcome.is_success());
        assert_eq!(outcome.delivered, 3);
        assert_eq!(transport.calls()[1], vec![EntryId::from("b")]);
    }

    #[tokio::test]
    async fn test_in_flight_batches_never_exceed_limit() {
        let transport = GatedTransport::new();
        let mut config = config(2);
        config.max_batch_records = 1;
        let queue = Arc::new(BatchQueue::new(config, transport.clone()).unwrap());

        let running = tokio::spawn({
            let queue = Arc::clone(&queue);
            async move { queue.send_messages(messages(5)).await }
        });

        eventually(|| transport.calls() == 2).await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(transport.calls(), 2, "a third batch started before a slot was freed");

        transport.release(5);
        let outcome = running.await.unwrap();

        assert!(outcome.is_success());
        assert_eq!(transport.calls(), 5);
        assert_eq!(transport.max_in_flight(), 2);
    }
}
