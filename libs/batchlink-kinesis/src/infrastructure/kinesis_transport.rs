//! Kinesis Transport Implementation
//!
//! This module implements the `BatchTransport` port using the Kinesis
//! `PutRecords` API. Kinesis reports per-record results positionally, so the
//! adapter maps every failed result back to the id of the entry at the same
//! position.

use std::future::Future;

use aws_config::SdkConfig;
use aws_sdk_kinesis::{
    error::DisplayErrorContext, operation::put_records::builders::PutRecordsFluentBuilder,
    primitives::Blob, types::PutRecordsRequestEntry, Client,
};
use batchlink_domain::{BatchTransport, DeliveryError, EntryId, FailedEntry, PublishEntry};
use tracing::{debug, error, instrument, warn};

/// Kinesis-based implementation of the BatchTransport port
///
/// The target is a stream name, or a stream ARN when it starts with `arn:`.
///
/// ## Error Handling
///
/// SDK and service errors fail the whole call with `DeliveryError::Transport`.
/// Per-record errors (throttling, internal failures) are returned as
/// `FailedEntry` values carrying the Kinesis error code.
#[derive(Clone)]
pub struct KinesisTransport {
    client: Client,
}

impl KinesisTransport {
    /// Create a transport over a configured Kinesis client
    ///
    /// # Example
    ///
    /// ```rust,no_run
    /// use batchlink_kinesis::KinesisTransport;
    ///
    /// # async fn example() {
    /// let config = aws_config::load_from_env().await;
    /// let transport = KinesisTransport::new(aws_sdk_kinesis::Client::new(&config));
    /// # }
    /// ```
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Create a transport from a shared AWS configuration
    pub fn from_sdk_config(config: &SdkConfig) -> Self {
        Self::new(Client::new(config))
    }

    fn request_entries(
        entries: &[PublishEntry],
    ) -> Result<Vec<PutRecordsRequestEntry>, DeliveryError> {
        entries
            .iter()
            .map(|entry| {
                PutRecordsRequestEntry::builder()
                    .data(Blob::new(entry.payload.to_vec()))
                    .partition_key(&entry.partition_key)
                    .build()
                    .map_err(|err| {
                        DeliveryError::internal(format!(
                            "Failed to build Kinesis record '{}': {}",
                            entry.id, err
                        ))
                    })
            })
            .collect()
    }

    fn with_target(request: PutRecordsFluentBuilder, target: &str) -> PutRecordsFluentBuilder {
        if target.starts_with("arn:") {
            request.stream_arn(target)
        } else {
            request.stream_name(target)
        }
    }
}

impl BatchTransport<PublishEntry> for KinesisTransport {
    #[instrument(skip(self, target, entries), fields(stream = %target, records = entries.len()))]
    fn submit_batch(
        &self,
        target: &str,
        entries: &[PublishEntry],
    ) -> impl Future<Output = Result<Vec<FailedEntry>, DeliveryError>> + Send {
        let request = Self::request_entries(entries).map(|records| {
            Self::with_target(self.client.put_records(), target).set_records(Some(records))
        });
        let ids: Vec<EntryId> = entries.iter().map(|entry| entry.id.clone()).collect();
        let stream = target.to_string();

        async move {
            debug!(stream = %stream, records = ids.len(), "Putting records to Kinesis");

            let output = match request?.send().await {
                Ok(output) => output,
                Err(err) => {
                    error!(stream = %stream, error = %DisplayErrorContext(&err), "Kinesis put_records failed");
                    return Err(DeliveryError::transport(format!(
                        "Kinesis put_records failed for stream '{}': {}",
                        stream,
                        DisplayErrorContext(&err)
                    )));
                }
            };

            if output.failed_record_count().unwrap_or(0) == 0 {
                debug!(stream = %stream, records = ids.len(), "Kinesis accepted all records");
                return Ok(Vec::new());
            }

            let results = output.records();
            if results.len() != ids.len() {
                warn!(
                    stream = %stream,
                    sent = ids.len(),
                    received = results.len(),
                    "Kinesis returned a result count that does not match the request"
                );
                return Err(DeliveryError::transport(format!(
                    "Kinesis returned {} results for {} records",
                    results.len(),
                    ids.len()
                )));
            }

            let failed: Vec<FailedEntry> = results
                .iter()
                .zip(ids)
                .filter_map(|(result, id)| {
                    let code = result.error_code()?;
                    let failed = FailedEntry::new(id, code);
                    Some(match result.error_message() {
                        Some(message) => failed.with_message(message),
                        None => failed,
                    })
                })
                .collect();

            warn!(stream = %stream, failed = failed.len(), "Kinesis rejected records");
            Ok(failed)
        }
    }
}
