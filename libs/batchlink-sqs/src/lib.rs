//! # BatchLink SQS Adapter
//!
//! Implements the `BatchTransport` port on top of SQS batch APIs:
//! `SendMessageBatch` for `PublishEntry` and `DeleteMessageBatch` for `AckEntry`.

pub mod infrastructure;

pub use infrastructure::SqsTransport;
