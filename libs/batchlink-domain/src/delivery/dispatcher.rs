//! Single-batch dispatch with per-record retries
//!
//! A batch is sent once; whatever the remote service rejects is sent again,
//! and only that, until nothing is left or the attempt budget runs out.
//! Attempts for one batch always run sequentially.

use std::collections::HashSet;
use std::marker::PhantomData;
use std::sync::Arc;

use tracing::{debug, error, info, warn};

use super::config::RetryPolicy;
use super::entry::{BatchEntry, FailedEntry};
use super::error::DeliveryError;
use super::ids::EntryId;
use crate::ports::BatchTransport;

/// Result of dispatching one batch
#[derive(Debug)]
pub struct DispatchOutcome<E> {
    /// Entries the remote service accepted
    pub delivered: usize,
    /// Entries still rejected when dispatch gave up
    pub failed: Vec<E>,
    /// Remote calls made
    pub attempts: u32,
    /// Why `failed` is non-empty
    pub error: Option<DeliveryError>,
}

impl<E> DispatchOutcome<E> {
    fn empty() -> Self {
        Self {
            delivered: 0,
            failed: Vec::new(),
            attempts: 0,
            error: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }

    /// Split into the failed subset and the terminal error, if any
    pub fn into_parts(self) -> (Vec<E>, Option<DeliveryError>) {
        (self.failed, self.error)
    }
}

/// Sends batches of `E` to one target through a `BatchTransport`
pub struct Dispatcher<T, E> {
    transport: Arc<T>,
    target: Arc<str>,
    retry: RetryPolicy,
    _entries: PhantomData<fn() -> E>,
}

impl<T, E> Clone for Dispatcher<T, E> {
    fn clone(&self) -> Self {
        Self {
            transport: Arc::clone(&self.transport),
            target: Arc::clone(&self.target),
            retry: self.retry,
            _entries: PhantomData,
        }
    }
}

impl<T, E> Dispatcher<T, E>
where
    T: BatchTransport<E>,
    E: BatchEntry,
{
    pub fn new(transport: Arc<T>, target: impl Into<Arc<str>>, retry: RetryPolicy) -> Self {
        Self {
            transport,
            target: target.into(),
            retry,
            _entries: PhantomData,
        }
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    /// Dispatch `batch` with the configured attempt budget
    pub async fn submit(&self, batch: Vec<E>) -> DispatchOutcome<E> {
        self.submit_with_budget(batch, self.retry.max_attempts).await
    }

    /// Dispatch `batch`, making at most `budget` remote calls
    ///
    /// Retryable transport errors retry the whole pending set, any other error
    /// ends dispatch at once with every pending entry failed. Partial failures
    /// retry exactly the rejected entries, matched by id. A fixed backoff
    /// separates two attempts. With a budget of 0 the transport is never called.
    pub async fn submit_with_budget(&self, batch: Vec<E>, budget: u32) -> DispatchOutcome<E> {
        if batch.is_empty() {
            return DispatchOutcome::empty();
        }

        let total = batch.len();
        let mut pending = batch;
        let mut attempts = 0u32;

        while !pending.is_empty() {
            if attempts >= budget {
                error!(
                    target_name = %self.target,
                    failed = pending.len(),
                    attempts,
                    "Retry budget exceeded"
                );
                let failed = pending.len();
                return DispatchOutcome {
                    delivered: total - failed,
                    failed: pending,
                    attempts,
                    error: Some(DeliveryError::retry_budget_exceeded(attempts, failed)),
                };
            }

            if attempts > 0 {
                debug!(
                    target_name = %self.target,
                    records = pending.len(),
                    backoff_ms = self.retry.backoff.as_millis() as u64,
                    "Retrying records"
                );
                tokio::time::sleep(self.retry.backoff).await;
            }
            attempts += 1;

            debug!(
                target_name = %self.target,
                records = pending.len(),
                attempt = attempts,
                "Sending batch"
            );

            match self.transport.submit_batch(&self.target, &pending).await {
                Ok(rejected) if rejected.is_empty() => {
                    info!(
                        target_name = %self.target,
                        records = pending.len(),
                        attempt = attempts,
                        "Sent batch"
                    );
                    pending.clear();
                }
                Ok(rejected) => {
                    warn!(
                        target_name = %self.target,
                        rejected = rejected.len(),
                        records = pending.len(),
                        attempt = attempts,
                        codes = ?distinct_codes(&rejected),
                        "Remote service rejected part of the batch"
                    );
                    pending = retain_rejected(pending, &rejected);
                }
                Err(err) if !err.is_retryable() => {
                    error!(
                        target_name = %self.target,
                        records = pending.len(),
                        attempt = attempts,
                        error = %err,
                        "Failed to send batch, giving up"
                    );
                    let failed = pending.len();
                    return DispatchOutcome {
                        delivered: total - failed,
                        failed: pending,
                        attempts,
                        error: Some(err),
                    };
                }
                Err(err) => {
                    warn!(
                        target_name = %self.target,
                        records = pending.len(),
                        attempt = attempts,
                        error = %err,
                        "Failed to send batch"
                    );
                }
            }
        }

        DispatchOutcome {
            delivered: total,
            failed: Vec::new(),
            attempts,
            error: None,
        }
    }
}

/// Keep the entries whose id appears in `rejected`, in their original order
fn retain_rejected<E: BatchEntry>(mut pending: Vec<E>, rejected: &[FailedEntry]) -> Vec<E> {
    let ids: HashSet<&EntryId> = rejected.iter().map(|f| &f.id).collect();
    pending.retain(|entry| ids.contains(entry.id()));

    if pending.len() < ids.len() {
        warn!(
            reported = ids.len(),
            matched = pending.len(),
            "Remote service reported failures for unknown entry ids"
        );
    }

    pending
}

fn distinct_codes(rejected: &[FailedEntry]) -> Vec<&str> {
    let mut codes: Vec<&str> = rejected.iter().map(|f| f.code.as_str()).collect();
    codes.sort_unstable();
    codes.dedup();
    codes
}
