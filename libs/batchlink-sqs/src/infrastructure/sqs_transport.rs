//! SQS Transport Implementation
//!
//! This module implements the `BatchTransport` port for both publish and
//! acknowledge calls. SQS batch entries carry batch-local ids (`msg_<index>`),
//! which are mapped back to the caller's entry ids when SQS reports failures.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use aws_config::SdkConfig;
use aws_sdk_sqs::{
    error::DisplayErrorContext,
    types::{BatchResultErrorEntry, DeleteMessageBatchRequestEntry, SendMessageBatchRequestEntry},
    Client,
};
use batchlink_domain::{AckEntry, BatchTransport, DeliveryError, EntryId, FailedEntry, PublishEntry};
use tokio::sync::RwLock;
use tracing::{debug, error, info, instrument, warn};

/// SQS-based implementation of the BatchTransport port
///
/// The target is a queue URL, or a queue name resolved once with
/// `GetQueueUrl` and cached for the lifetime of the transport.
#[derive(Clone)]
pub struct SqsTransport {
    client: Client,
    queue_urls: Arc<RwLock<HashMap<String, String>>>,
}

impl SqsTransport {
    /// Create a transport over a configured SQS client
    ///
    /// # Example
    ///
    /// ```rust,no_run
    /// use batchlink_sqs::SqsTransport;
    ///
    /// # async fn example() {
    /// let config = aws_config::load_from_env().await;
    /// let transport = SqsTransport::new(aws_sdk_sqs::Client::new(&config));
    /// # }
    /// ```
    pub fn new(client: Client) -> Self {
        Self {
            client,
            queue_urls: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Create a transport from a shared AWS configuration
    pub fn from_sdk_config(config: &SdkConfig) -> Self {
        Self::new(Client::new(config))
    }

    /// Resolve `target` to a queue URL
    async fn queue_url(&self, target: &str) -> Result<String, DeliveryError> {
        if target.starts_with("https://") || target.starts_with("http://") {
            return Ok(target.to_string());
        }
        if let Some(url) = self.queue_urls.read().await.get(target) {
            return Ok(url.clone());
        }

        let output = self
            .client
            .get_queue_url()
            .queue_name(target)
            .send()
            .await
            .map_err(|err| {
                error!(queue = %target, error = %DisplayErrorContext(&err), "Failed to resolve SQS queue URL");
                DeliveryError::transport(format!(
                    "SQS get_queue_url failed for queue '{}': {}",
                    target,
                    DisplayErrorContext(&err)
                ))
            })?;

        let url = output
            .queue_url()
            .ok_or_else(|| DeliveryError::transport(format!("SQS returned no URL for queue '{target}'")))?
            .to_string();

        info!(queue = %target, queue_url = %url, "Resolved SQS queue URL");
        self.queue_urls
            .write()
            .await
            .insert(target.to_string(), url.clone());

        Ok(url)
    }
}

fn batch_id(index: usize) -> String {
    format!("msg_{index}")
}

/// Map SQS batch errors back to the ids of the submitted entries
fn correlate(ids: &[EntryId], errors: &[BatchResultErrorEntry]) -> Vec<FailedEntry> {
    errors
        .iter()
        .filter_map(|err| {
            let id = err
                .id()
                .strip_prefix("msg_")
                .and_then(|index| index.parse::<usize>().ok())
                .and_then(|index| ids.get(index));

            let Some(id) = id else {
                warn!(batch_id = err.id(), "SQS reported a failure for an unknown batch id");
                return None;
            };

            if err.sender_fault() {
                debug!(id = %id, code = err.code(), "SQS rejected entry as a sender fault");
            }

            let failed = FailedEntry::new(id.clone(), err.code());
            Some(match err.message() {
                Some(message) => failed.with_message(message),
                None => failed,
            })
        })
        .collect()
}

impl BatchTransport<PublishEntry> for SqsTransport {
    #[instrument(skip(self, target, entries), fields(queue = %target, messages = entries.len()))]
    fn submit_batch(
        &self,
        target: &str,
        entries: &[PublishEntry],
    ) -> impl Future<Output = Result<Vec<FailedEntry>, DeliveryError>> + Send {
        let this = self.clone();
        let queue = target.to_string();
        let ids: Vec<EntryId> = entries.iter().map(|entry| entry.id.clone()).collect();
        let request: Result<Vec<SendMessageBatchRequestEntry>, DeliveryError> = entries
            .iter()
            .enumerate()
            .map(|(index, entry)| {
                SendMessageBatchRequestEntry::builder()
                    .id(batch_id(index))
                    .message_body(String::from_utf8_lossy(&entry.payload))
                    .set_delay_seconds(entry.delay_seconds)
                    .set_message_group_id(entry.group_id.clone())
                    .set_message_deduplication_id(entry.deduplication_id.clone())
                    .build()
                    .map_err(|err| {
                        DeliveryError::internal(format!(
                            "Failed to build SQS message '{}': {}",
                            entry.id, err
                        ))
                    })
            })
            .collect();

        async move {
            let request = request?;
            let queue_url = this.queue_url(&queue).await?;

            debug!(queue_url = %queue_url, messages = ids.len(), "Sending message batch to SQS");

            let output = this
                .client
                .send_message_batch()
                .queue_url(&queue_url)
                .set_entries(Some(request))
                .send()
                .await
                .map_err(|err| {
                    error!(queue_url = %queue_url, error = %DisplayErrorContext(&err), "SQS send_message_batch failed");
                    DeliveryError::transport(format!(
                        "SQS send_message_batch failed for queue '{}': {}",
                        queue,
                        DisplayErrorContext(&err)
                    ))
                })?;

            let failed = correlate(&ids, output.failed());
            if !failed.is_empty() {
                warn!(queue_url = %queue_url, failed = failed.len(), "SQS rejected messages");
            }
            Ok(failed)
        }
    }
}

impl BatchTransport<AckEntry> for SqsTransport {
    #[instrument(skip(self, target, entries), fields(queue = %target, messages = entries.len()))]
    fn submit_batch(
        &self,
        target: &str,
        entries: &[AckEntry],
    ) -> impl Future<Output = Result<Vec<FailedEntry>, DeliveryError>> + Send {
        let this = self.clone();
        let queue = target.to_string();
        let ids: Vec<EntryId> = entries.iter().map(|entry| entry.id.clone()).collect();
        let request: Result<Vec<DeleteMessageBatchRequestEntry>, DeliveryError> = entries
            .iter()
            .enumerate()
            .map(|(index, entry)| {
                DeleteMessageBatchRequestEntry::builder()
                    .id(batch_id(index))
                    .receipt_handle(&entry.receipt_handle)
                    .build()
                    .map_err(|err| {
                        DeliveryError::internal(format!(
                            "Failed to build SQS delete entry '{}': {}",
                            entry.id, err
                        ))
                    })
            })
            .collect();

        async move {
            let request = request?;
            let queue_url = this.queue_url(&queue).await?;

            debug!(queue_url = %queue_url, messages = ids.len(), "Deleting message batch from SQS");

            let output = this
                .client
                .delete_message_batch()
                .queue_url(&queue_url)
                .set_entries(Some(request))
                .send()
                .await
                .map_err(|err| {
                    error!(queue_url = %queue_url, error = %DisplayErrorContext(&err), "SQS delete_message_batch failed");
                    DeliveryError::transport(format!(
                        "SQS delete_message_batch failed for queue '{}': {}",
                        queue,
                        DisplayErrorContext(&err)
                    ))
                })?;

            let failed = correlate(&ids, output.failed());
            if !failed.is_empty() {
                warn!(queue_url = %queue_url, failed = failed.len(), "SQS failed to delete messages");
            }
            Ok(failed)
        }
    }
}
