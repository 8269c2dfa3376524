mod sqs_transport;

pub use sqs_transport::SqsTransport;
