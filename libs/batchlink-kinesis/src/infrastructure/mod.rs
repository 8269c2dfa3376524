mod kinesis_transport;

pub use kinesis_transport::KinesisTransport;
