//! Partition key derivation

use uuid::Uuid;

/// Maps a serialized record to the routing key the remote service shards on
#[cfg_attr(test, mockall::automock)]
pub trait Partitioner: Send + Sync {
    fn partition_key(&self, payload: &[u8]) -> String;
}

/// Random unique key per record, spreading records evenly across shards
#[derive(Debug, Clone, Copy, Default)]
pub struct UuidPartitioner;

impl Partitioner for UuidPartitioner {
    fn partition_key(&self, _payload: &[u8]) -> String {
        Uuid::new_v4().to_string()
    }
}

impl<F> Partitioner for F
where
    F: Fn(&[u8]) -> String + Send + Sync,
{
    fn partition_key(&self, payload: &[u8]) -> String {
        self(payload)
    }
}
