//! Ingestion stream and drain coordination
//!
//! A `DeliveryStream` owns a bounded ingestion channel and a long-lived
//! consumer task. The consumer buffers records, and whenever accepting one
//! more record would push the buffer past its threshold it swaps the buffer
//! out, serializes it, splits it into batches and hands every batch to a
//! dispatch task admitted by the concurrency limiter.
//!
//! ## Lifecycle
//!
//! `Running` → `Draining` (on `flush_and_stop`) → `Stopped`. Draining stops
//! ingestion, forces the buffered remainder out, waits for every in-flight
//! dispatch including its retries, and closes the error channel.
//! `flush_and_stop` takes the stream by value, so it runs exactly once.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use tokio::task::{self, JoinError, JoinHandle, JoinSet};
use tracing::{debug, error, info, warn};

use super::batcher::partition_by;
use super::config::StreamConfig;
use super::dispatcher::Dispatcher;
use super::entry::{BatchEntry, PublishEntry};
use super::error::{DeliveryError, Result};
use super::limiter::ConcurrencyLimiter;
use super::partitioner::{Partitioner, UuidPartitioner};
use crate::ports::BatchTransport;

/// Final totals of a drained stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryReport {
    /// Stream or queue the records were sent to
    pub target: String,
    /// Records taken out of the buffer for delivery
    pub submitted: usize,
    /// Records that could not be serialized or delivered
    pub failed: usize,
    /// When the drain completed
    pub finished_at: DateTime<Utc>,
}

impl DeliveryReport {
    pub fn delivered(&self) -> usize {
        self.submitted.saturating_sub(self.failed)
    }
}

impl fmt::Display for DeliveryReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{} records delivered to {}",
            self.delivered(),
            self.submitted,
            self.target
        )
    }
}

/// Cloneable producer side of a `DeliveryStream`
pub struct StreamHandle<R> {
    records: mpsc::Sender<R>,
}

impl<R> Clone for StreamHandle<R> {
    fn clone(&self) -> Self {
        Self {
            records: self.records.clone(),
        }
    }
}

impl<R> StreamHandle<R> {
    /// Hand one record over to the pipeline
    ///
    /// Waits only while the ingestion channel is full.
    ///
    /// # Errors
    ///
    /// Returns `DeliveryError::Stopped` once the stream is draining or stopped.
    pub async fn put(&self, record: R) -> Result<()> {
        self.records
            .send(record)
            .await
            .map_err(|_| DeliveryError::Stopped)
    }

    pub fn is_stopped(&self) -> bool {
        self.records.is_closed()
    }
}

/// Where failures go once someone listens; dropped otherwise
#[derive(Clone, Default)]
struct ErrorSink {
    sender: Arc<OnceLock<mpsc::UnboundedSender<DeliveryError>>>,
}

impl ErrorSink {
    fn subscribe(&self) -> Option<mpsc::UnboundedReceiver<DeliveryError>> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.sender.set(tx).ok().map(|()| rx)
    }

    fn report(&self, error: DeliveryError) {
        if let Some(sender) = self.sender.get() {
            // A receiver dropped early is fine, the failure is counted either way.
            let _ = sender.send(error);
        }
    }
}

/// Batched, concurrent delivery of a stream of records to one target
pub struct DeliveryStream<R> {
    handle: StreamHandle<R>,
    stop: oneshot::Sender<()>,
    consumer: JoinHandle<DeliveryReport>,
    errors: ErrorSink,
    target: String,
}

impl<R> DeliveryStream<R>
where
    R: Serialize + Send + 'static,
{
    /// Validate `config` and start consuming immediately
    ///
    /// Partition keys are random (`UuidPartitioner`). Must be called from
    /// within a Tokio runtime. Failures are only counted and logged until
    /// `take_errors` is called.
    ///
    /// # Errors
    ///
    /// Returns `DeliveryError::Config` if the configuration is invalid. Nothing
    /// is started in that case.
    pub fn new<T>(config: StreamConfig, transport: T) -> Result<Self>
    where
        T: BatchTransport<PublishEntry>,
    {
        Self::with_partitioner(config, Arc::new(transport), Arc::new(UuidPartitioner))
    }

    /// Like `new`, with a shared transport and a custom partitioner
    pub fn with_partitioner<T>(
        config: StreamConfig,
        transport: Arc<T>,
        partitioner: Arc<dyn Partitioner>,
    ) -> Result<Self>
    where
        T: BatchTransport<PublishEntry>,
    {
        config.validate()?;

        let target = config.target().to_string();
        let (records_tx, records_rx) = mpsc::channel(config.ingest_capacity);
        let (stop_tx, stop_rx) = oneshot::channel();
        let errors = ErrorSink::default();

        let ingestor = Ingestor {
            dispatcher: Dispatcher::new(transport, target.as_str(), config.delivery.retry),
            limiter: ConcurrencyLimiter::new(config.delivery.max_in_flight),
            partitioner,
            counters: Arc::new(Counters::default()),
            errors: errors.clone(),
            buffer: Vec::with_capacity(config.buffer_threshold),
            in_flight: JoinSet::new(),
            batch_sizes: HashMap::new(),
            config,
        };

        info!(
            target_name = %target,
            buffer_threshold = ingestor.config.buffer_threshold,
            max_in_flight = ingestor.config.delivery.max_in_flight,
            "Starting delivery stream"
        );

        let consumer = tokio::spawn(ingestor.run(records_rx, stop_rx));

        Ok(Self {
            handle: StreamHandle {
                records: records_tx,
            },
            stop: stop_tx,
            consumer,
            errors,
            target,
        })
    }
}

impl<R> DeliveryStream<R> {
    /// Hand one record over to the pipeline
    ///
    /// # Errors
    ///
    /// Returns `DeliveryError::Stopped` if the consumer is no longer running.
    pub async fn put(&self, record: R) -> Result<()> {
        self.handle.put(record).await
    }

    /// A producer handle that can be cloned into other tasks
    pub fn handle(&self) -> StreamHandle<R> {
        self.handle.clone()
    }

    /// Take the receiving end of the error channel
    ///
    /// Terminal delivery failures and serialization failures raised from now
    /// on are reported here. The channel closes when the drain completes.
    /// Returns `None` if it was already taken.
    pub fn take_errors(&mut self) -> Option<mpsc::UnboundedReceiver<DeliveryError>> {
        self.errors.subscribe()
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    /// Drain the stream and report totals
    ///
    /// Stops accepting records, flushes the buffered remainder, waits for every
    /// dispatch (retries included) and closes the error channel. Records put
    /// concurrently with this call may or may not be delivered.
    ///
    /// # Errors
    ///
    /// Returns `DeliveryError::Internal` if the consumer task panicked.
    pub async fn flush_and_stop(self) -> Result<DeliveryReport> {
        info!(target_name = %self.target, "Draining delivery stream");

        // The consumer also stops when the sender is dropped, so a failed send
        // only means it is already gone and the join below reports why.
        let _ = self.stop.send(());
        drop(self.handle);

        let report = self.consumer.await.map_err(|err| {
            error!(target_name = %self.target, error = %err, "Delivery stream consumer failed");
            DeliveryError::internal(format!("delivery stream consumer failed: {err}"))
        })?;

        info!(
            target_name = %report.target,
            submitted = report.submitted,
            failed = report.failed,
            "{report}"
        );

        Ok(report)
    }
}

#[derive(Debug, Default)]
struct Counters {
    submitted: AtomicUsize,
    failed: AtomicUsize,
}

/// Consumer side: owns the buffer and tracks in-flight dispatches
struct Ingestor<R, T> {
    config: StreamConfig,
    dispatcher: Dispatcher<T, PublishEntry>,
    limiter: ConcurrencyLimiter,
    partitioner: Arc<dyn Partitioner>,
    counters: Arc<Counters>,
    errors: ErrorSink,
    buffer: Vec<R>,
    in_flight: JoinSet<()>,
    /// Records carried by each dispatch task, so a crashed task is accounted for
    batch_sizes: HashMap<task::Id, usize>,
}

impl<R, T> Ingestor<R, T>
where
    R: Serialize + Send + 'static,
    T: BatchTransport<PublishEntry>,
{
    async fn run(
        mut self,
        mut records: mpsc::Receiver<R>,
        mut stop: oneshot::Receiver<()>,
    ) -> DeliveryReport {
        loop {
            tokio::select! {
                received = records.recv() => match received {
                    Some(record) => self.accept(record).await,
                    None => break,
                },
                _ = &mut stop => break,
            }
        }

        // Draining: everything already queued was accepted and must go out.
        records.close();
        while let Ok(record) = records.try_recv() {
            self.accept(record).await;
        }
        self.flush().await;

        while let Some(joined) = self.in_flight.join_next_with_id().await {
            self.settle(joined);
        }

        DeliveryReport {
            target: self.dispatcher.target().to_string(),
            submitted: self.counters.submitted.load(Ordering::SeqCst),
            failed: self.counters.failed.load(Ordering::SeqCst),
            finished_at: Utc::now(),
        }
    }

    async fn accept(&mut self, record: R) {
        if self.buffer.len() >= self.config.buffer_threshold {
            self.flush().await;
        }
        self.buffer.push(record);
    }

    /// Swap the buffer out and dispatch its content
    async fn flush(&mut self) {
        if self.buffer.is_empty() {
            return;
        }

        let records = std::mem::replace(
            &mut self.buffer,
            Vec::with_capacity(self.config.buffer_threshold),
        );
        self.counters
            .submitted
            .fetch_add(records.len(), Ordering::SeqCst);

        let entries = self.encode(records);
        let batches = partition_by(
            entries,
            self.config.delivery.max_batch_records,
            self.config.delivery.max_batch_bytes,
            |entry: &PublishEntry| entry.byte_size(),
        );

        debug!(
            target_name = %self.dispatcher.target(),
            batches = batches.len(),
            "Flushing buffer"
        );

        for batch in batches {
            self.reap_finished();

            let slot = self.limiter.acquire().await;
            let records = batch.len();
            let dispatcher = self.dispatcher.clone();
            let counters = Arc::clone(&self.counters);
            let errors = self.errors.clone();

            let task = self.in_flight.spawn(async move {
                let outcome = dispatcher.submit(batch).await;
                slot.release();

                let (failed, error) = outcome.into_parts();
                if !failed.is_empty() {
                    counters.failed.fetch_add(failed.len(), Ordering::SeqCst);
                    let error = error.unwrap_or_else(|| {
                        DeliveryError::internal(format!("{} record(s) undelivered", failed.len()))
                    });
                    errors.report(error);
                }
            });
            self.batch_sizes.insert(task.id(), records);
        }
    }

    /// Serialize records into entries; failures are counted and reported
    fn encode(&self, records: Vec<R>) -> Vec<PublishEntry> {
        let mut entries = Vec::with_capacity(records.len());
        let mut failed = 0usize;

        for record in records {
            match serde_json::to_vec(&record) {
                Ok(mut payload) => {
                    let partition_key = self.partitioner.partition_key(&payload);
                    if let Some(delimiter) = self.config.record_delimiter {
                        payload.push(delimiter);
                    }
                    entries.push(PublishEntry::new(payload, partition_key));
                }
                Err(err) => {
                    failed += 1;
                    self.errors.report(DeliveryError::from(err));
                }
            }
        }

        if failed > 0 {
            warn!(
                target_name = %self.dispatcher.target(),
                failed,
                "Failed to serialize records"
            );
            self.counters.failed.fetch_add(failed, Ordering::SeqCst);
        }

        entries
    }

    fn reap_finished(&mut self) {
        while let Some(joined) = self.in_flight.try_join_next_with_id() {
            self.settle(joined);
        }
    }

    /// Forget a finished dispatch; a crashed one fails its whole batch
    fn settle(&mut self, joined: std::result::Result<(task::Id, ()), JoinError>) {
        match joined {
            Ok((id, ())) => {
                self.batch_sizes.remove(&id);
            }
            Err(err) => {
                let lost = self.batch_sizes.remove(&err.id()).unwrap_or_default();
                error!(
                    target_name = %self.dispatcher.target(),
                    records = lost,
                    error = %err,
                    "Dispatch task failed"
                );
                self.counters.failed.fetch_add(lost, Ordering::SeqCst);
                self.errors.report(DeliveryError::internal(format!(
                    "dispatch task failed with {lost} record(s): {err}"
                )));
            }
        }
    }
}
