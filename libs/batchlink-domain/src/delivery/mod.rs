//! Delivery domain module
//!
//! This module contains the core business logic for record delivery: how records
//! become wire entries, how entries are grouped into batches, how a batch is sent
//! and retried, and how the ingestion stream is drained on shutdown.

mod batcher;
mod config;
mod dispatcher;
mod entry;
mod error;
mod ids;
mod limiter;
mod partitioner;
mod queue;
mod stream;

pub use batcher::{partition, partition_by};
pub use config::{DeliveryConfig, RetryPolicy, StreamConfig};
pub use dispatcher::{DispatchOutcome, Dispatcher};
pub use entry::{AckEntry, BatchEntry, FailedEntry, PublishEntry};
pub use error::{DeliveryError, Result};
pub use ids::EntryId;
pub use limiter::{ConcurrencyLimiter, Slot};
pub use partitioner::{Partitioner, UuidPartitioner};
pub use queue::BatchQueue;
pub use stream::{DeliveryReport, DeliveryStream, StreamHandle};

#[cfg(test)]
pub(crate) mod testing;
