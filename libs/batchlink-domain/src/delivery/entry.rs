//! Wire entries exchanged with the remote service
//!
//! A record handed to the pipeline is serialized once and wrapped in a
//! `PublishEntry`. Acknowledge-style calls use `AckEntry`. Both share the same
//! batching and retry machinery through the `BatchEntry` trait.

use bytes::Bytes;

use crate::delivery::ids::EntryId;

/// Common shape of every entry the pipeline can batch and retry
pub trait BatchEntry: Clone + Send + Sync + 'static {
    /// Identifier used to correlate partial failures
    fn id(&self) -> &EntryId;

    /// Size counted against the batch byte limit
    fn byte_size(&self) -> usize;
}

/// A serialized record on its way to a stream or queue
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishEntry {
    /// Unique identifier within the batch
    pub id: EntryId,

    /// Serialized record bytes
    pub payload: Bytes,

    /// Routing key derived from the payload
    pub partition_key: String,

    /// Ordering group (FIFO queues)
    pub group_id: Option<String>,

    /// Deduplication token (FIFO queues)
    pub deduplication_id: Option<String>,

    /// Delivery delay in seconds
    pub delay_seconds: Option<i32>,
}

impl PublishEntry {
    /// Create an entry with a generated id and no scheduling metadata
    pub fn new(payload: impl Into<Bytes>, partition_key: impl Into<String>) -> Self {
        Self {
            id: EntryId::generate(),
            payload: payload.into(),
            partition_key: partition_key.into(),
            group_id: None,
            deduplication_id: None,
            delay_seconds: None,
        }
    }

    pub fn with_id(mut self, id: impl Into<EntryId>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_group_id(mut self, group_id: impl Into<String>) -> Self {
        self.group_id = Some(group_id.into());
        self
    }

    pub fn with_deduplication_id(mut self, deduplication_id: impl Into<String>) -> Self {
        self.deduplication_id = Some(deduplication_id.into());
        self
    }

    pub fn with_delay_seconds(mut self, delay_seconds: i32) -> Self {
        self.delay_seconds = Some(delay_seconds);
        self
    }
}

impl BatchEntry for PublishEntry {
    fn id(&self) -> &EntryId {
        &self.id
    }

    fn byte_size(&self) -> usize {
        self.payload.len()
    }
}

/// Acknowledgement of a consumed message (delete-style call)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AckEntry {
    /// Unique identifier within the batch
    pub id: EntryId,

    /// Receipt token handed out when the message was received
    pub receipt_handle: String,
}

impl AckEntry {
    pub fn new(id: impl Into<EntryId>, receipt_handle: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            receipt_handle: receipt_handle.into(),
        }
    }
}

impl BatchEntry for AckEntry {
    fn id(&self) -> &EntryId {
        &self.id
    }

    fn byte_size(&self) -> usize {
        self.receipt_handle.len()
    }
}

/// An entry the remote service rejected, as reported in a batch response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedEntry {
    /// Id of the rejected entry
    pub id: EntryId,

    /// Service error code (e.g. "ProvisionedThroughputExceededException")
    pub code: String,

    /// Human-readable reason, when the service provides one
    pub message: Option<String>,
}

impl FailedEntry {
    pub fn new(id: impl Into<EntryId>, code: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            code: code.into(),
            message: None,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}
