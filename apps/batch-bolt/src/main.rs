//! BatchBolt - HTTP Ingestion Front-End
//!
//! Accepts JSON records over HTTP and forwards them to Kinesis or SQS through
//! a BatchLink delivery stream. On Ctrl-C the server stops accepting requests,
//! then the stream is drained before the process exits.

mod aws;
mod config;
mod dto;
mod handlers;
mod routes;

use anyhow::{Context, Result};
use batchlink_domain::{BatchTransport, DeliveryStream, PublishEntry, StreamHandle};
use batchlink_kinesis::KinesisTransport;
use batchlink_sqs::SqsTransport;
use serde_json::Value;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::{BoltConfig, SinkKind};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub records: StreamHandle<Value>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("Starting BatchBolt ingestion service");

    let config = BoltConfig::from_env()?;
    let sdk_config = aws::load_sdk_config(&config.aws).await;

    info!(
        sink = ?config.sink,
        target_name = %config.stream.target(),
        "Initializing delivery stream"
    );

    match config.sink {
        SinkKind::Kinesis => serve(config, KinesisTransport::from_sdk_config(&sdk_config)).await,
        SinkKind::Sqs => serve(config, SqsTransport::from_sdk_config(&sdk_config)).await,
    }
}

async fn serve<T>(config: BoltConfig, transport: T) -> Result<()>
where
    T: BatchTransport<PublishEntry>,
{
    let mut stream = DeliveryStream::new(config.stream.clone(), transport)
        .context("failed to start delivery stream")?;

    if let Some(mut errors) = stream.take_errors() {
        tokio::spawn(async move {
            while let Some(err) = errors.recv().await {
                error!(error = %err, "Record delivery failed");
            }
        });
    }

    let app = routes::create_router(AppState {
        records: stream.handle(),
    });

    let addr = config.addr();
    info!(addr = %addr, "Starting HTTP server");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("HTTP server stopped, draining delivery stream");
    let report = stream.flush_and_stop().await?;
    if report.failed > 0 {
        warn!(failed = report.failed, "Some records were not delivered");
    }
    info!(%report, "BatchBolt stopped");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!(error = %err, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
