//! # BatchLink Domain Layer
//!
//! This crate contains the delivery pipeline that forwards application records,
//! as size/count-bounded batches, to a remote append-only stream or queue.
//! It follows hexagonal architecture principles:
//!
//! - **Entities**: Wire entries (`PublishEntry`, `AckEntry`) and their ids
//! - **Ports**: Trait definitions for the remote service (`BatchTransport`)
//! - **Services**: Batching, dispatch with per-record retries, the ingestion
//!   stream and the one-shot batch queue
//!
//! ## Architecture
//!
//! This layer has NO dependencies on infrastructure concerns (AWS, HTTP, etc.).
//! The remote service is expressed as a trait (port) implemented by the
//! `batchlink-kinesis` and `batchlink-sqs` adapter crates.
//!
//! ## Example
//!
//! ```rust,no_run
//! use batchlink_domain::delivery::{DeliveryStream, PublishEntry, StreamConfig};
//! use batchlink_domain::ports::BatchTransport;
//!
//! async fn example<T: BatchTransport<PublishEntry>>(transport: T) {
//!     let config = StreamConfig::new("clickstream");
//!     let stream = DeliveryStream::new(config, transport).unwrap();
//!
//!     stream.put(serde_json::json!({ "event": "page_view" })).await.unwrap();
//!
//!     let report = stream.flush_and_stop().await.unwrap();
//!     println!("{report}");
//! }
//! ```

pub mod delivery;
pub mod ports;

// Re-export commonly used types
pub use delivery::{
    AckEntry, BatchQueue, DeliveryConfig, DeliveryError, DeliveryReport, DeliveryStream, EntryId,
    FailedEntry, PublishEntry, StreamConfig, StreamHandle,
};
pub use ports::BatchTransport;
