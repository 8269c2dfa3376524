//! Configuration for the delivery pipeline

use std::time::Duration;

use super::error::{DeliveryError, Result};

/// Retry behaviour applied to every batch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts per batch, the first one included (default: 3)
    pub max_attempts: u32,
    /// Fixed delay between two attempts (default: 100ms)
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: Duration::from_millis(100),
        }
    }
}

/// Limits shared by every batched delivery to one target
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryConfig {
    /// Name of the stream or queue to deliver to (required)
    pub target: String,
    /// Maximum number of records per batch
    pub max_batch_records: usize,
    /// Maximum cumulative payload bytes per batch
    pub max_batch_bytes: usize,
    /// Maximum number of batches in flight at once (default: 1)
    pub max_in_flight: usize,
    /// Per-batch retry behaviour
    pub retry: RetryPolicy,
}

impl DeliveryConfig {
    /// Limits suited to data streams: 100 records, 256 KiB per batch
    pub fn stream(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            max_batch_records: 100,
            max_batch_bytes: 256 * 1024,
            max_in_flight: 1,
            retry: RetryPolicy::default(),
        }
    }

    /// Limits suited to message queues: 10 records, 64 KiB per batch
    pub fn queue(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            max_batch_records: 10,
            max_batch_bytes: 64 * 1024,
            ..Self::stream(String::new())
        }
    }

    pub fn with_max_in_flight(mut self, max_in_flight: usize) -> Self {
        self.max_in_flight = max_in_flight;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Check the configuration before anything is started
    ///
    /// # Errors
    ///
    /// Returns `DeliveryError::Config` if the target is empty or a limit is zero.
    pub fn validate(&self) -> Result<()> {
        if self.target.trim().is_empty() {
            return Err(DeliveryError::config("target name is required"));
        }
        if self.max_batch_records == 0 {
            return Err(DeliveryError::config("max_batch_records must be greater than 0"));
        }
        if self.max_batch_bytes == 0 {
            return Err(DeliveryError::config("max_batch_bytes must be greater than 0"));
        }
        if self.max_in_flight == 0 {
            return Err(DeliveryError::config("max_in_flight must be greater than 0"));
        }
        if self.retry.max_attempts == 0 {
            return Err(DeliveryError::config("retry.max_attempts must be greater than 0"));
        }
        Ok(())
    }
}

/// Configuration of a `DeliveryStream`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamConfig {
    /// Batch limits, concurrency and retries
    pub delivery: DeliveryConfig,
    /// Buffered records that trigger a batch-and-dispatch cycle (default: 500)
    pub buffer_threshold: usize,
    /// Capacity of the ingestion channel before `put` waits (default: 1000)
    pub ingest_capacity: usize,
    /// Byte appended to every serialized record (default: `\n`)
    pub record_delimiter: Option<u8>,
}

impl StreamConfig {
    /// Stream defaults for `target`
    pub fn new(target: impl Into<String>) -> Self {
        Self::with_delivery(DeliveryConfig::stream(target))
    }

    /// Queue defaults for `target`, records are sent without a delimiter
    pub fn for_queue(target: impl Into<String>) -> Self {
        Self {
            record_delimiter: None,
            ..Self::with_delivery(DeliveryConfig::queue(target))
        }
    }

    pub fn with_delivery(delivery: DeliveryConfig) -> Self {
        Self {
            delivery,
            buffer_threshold: 500,
            ingest_capacity: 1000,
            record_delimiter: Some(b'\n'),
        }
    }

    pub fn target(&self) -> &str {
        &self.delivery.target
    }

    /// Check the configuration before the stream starts
    ///
    /// # Errors
    ///
    /// Returns `DeliveryError::Config` for any invalid delivery limit, or if the
    /// buffer threshold or ingestion capacity is zero.
    pub fn validate(&self) -> Result<()> {
        self.delivery.validate()?;
        if self.buffer_threshold == 0 {
            return Err(DeliveryError::config("buffer_threshold must be greater than 0"));
        }
        if self.ingest_capacity == 0 {
            return Err(DeliveryError::config("ingest_capacity must be greater than 0"));
        }
        Ok(())
    }
}
