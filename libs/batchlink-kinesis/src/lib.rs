//! # BatchLink Kinesis Adapter
//!
//! Implements the `BatchTransport` port for `PublishEntry` on top of the
//! Kinesis `PutRecords` API.

pub mod infrastructure;

pub use infrastructure::KinesisTransport;
