//! Ports (trait definitions) for external dependencies
//!
//! This module defines the contract the remote stream/queue adapters must
//! implement. Following hexagonal architecture, the domain defines what it
//! needs, and the infrastructure provides implementations.
//!
//! ## Static Dispatch
//!
//! We use native Rust async traits with `impl Future` return types instead of
//! `async_trait` to ensure zero-cost abstractions and static dispatch.

use std::future::Future;

use crate::delivery::{BatchEntry, DeliveryError, FailedEntry};

/// Port for batch calls against a remote stream or queue
///
/// One adapter may implement this port for several entry kinds. The SQS
/// adapter, for example, publishes `PublishEntry` batches with
/// `SendMessageBatch` and acknowledges `AckEntry` batches with
/// `DeleteMessageBatch`.
///
/// Implementations must:
/// - Issue exactly one remote batch call per invocation
/// - Report every rejected entry by its id, in any order
/// - Convert infrastructure errors to `DeliveryError::Transport`
pub trait BatchTransport<E: BatchEntry>: Send + Sync + 'static {
    /// Submit one batch to `target` (stream or queue name)
    ///
    /// # Returns
    ///
    /// The entries the service rejected. An empty vector means the whole batch
    /// was accepted.
    ///
    /// # Errors
    ///
    /// Returns `DeliveryError::Transport` when the call itself failed, in which
    /// case no entry of the batch is considered delivered.
    fn submit_batch(
        &self,
        target: &str,
        entries: &[E],
    ) -> impl Future<Output = Result<Vec<FailedEntry>, DeliveryError>> + Send;
}
