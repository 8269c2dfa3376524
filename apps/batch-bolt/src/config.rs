//! Service configuration read from the environment

use std::str::FromStr;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use batchlink_domain::delivery::RetryPolicy;
use batchlink_domain::{DeliveryConfig, StreamConfig};

/// Remote service the records are forwarded to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkKind {
    Kinesis,
    Sqs,
}

impl FromStr for SinkKind {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.to_ascii_lowercase().as_str() {
            "kinesis" => Ok(Self::Kinesis),
            "sqs" => Ok(Self::Sqs),
            other => bail!("unknown sink '{other}', expected 'kinesis' or 'sqs'"),
        }
    }
}

/// AWS client settings shared by both sinks
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AwsSettings {
    pub region: Option<String>,
    /// Override for LocalStack-style endpoints
    pub endpoint_url: Option<String>,
    /// SDK-level attempts for connection errors and throttled calls
    pub max_attempts: u32,
}

#[derive(Debug, Clone)]
pub struct BoltConfig {
    pub host: String,
    pub port: u16,
    pub sink: SinkKind,
    pub aws: AwsSettings,
    pub stream: StreamConfig,
}

impl BoltConfig {
    /// Load `.env` if present, then read the process environment
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let sink: SinkKind = parse_or(&lookup, "BOLT_SINK", SinkKind::Kinesis)?;
        let target = lookup("BOLT_TARGET").context("BOLT_TARGET must name the stream or queue")?;

        let defaults = match sink {
            SinkKind::Kinesis => StreamConfig::new(target),
            SinkKind::Sqs => StreamConfig::for_queue(target),
        };

        let delivery = DeliveryConfig {
            max_batch_records: parse_or(
                &lookup,
                "BOLT_MAX_BATCH_RECORDS",
                defaults.delivery.max_batch_records,
            )?,
            max_batch_bytes: parse_or(
                &lookup,
                "BOLT_MAX_BATCH_BYTES",
                defaults.delivery.max_batch_bytes,
            )?,
            max_in_flight: parse_or(&lookup, "BOLT_MAX_IN_FLIGHT", defaults.delivery.max_in_flight)?,
            retry: RetryPolicy {
                max_attempts: parse_or(
                    &lookup,
                    "BOLT_RETRY_ATTEMPTS",
                    defaults.delivery.retry.max_attempts,
                )?,
                backoff: Duration::from_millis(parse_or(
                    &lookup,
                    "BOLT_RETRY_BACKOFF_MS",
                    defaults.delivery.retry.backoff.as_millis() as u64,
                )?),
            },
            ..defaults.delivery.clone()
        };

        let stream = StreamConfig {
            buffer_threshold: parse_or(&lookup, "BOLT_BUFFER_THRESHOLD", defaults.buffer_threshold)?,
            delivery,
            ..defaults
        };
        stream
            .validate()
            .context("invalid delivery configuration")?;

        Ok(Self {
            host: lookup("BOLT_HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            port: parse_or(&lookup, "BOLT_PORT", 3000)?,
            sink,
            aws: AwsSettings {
                region: lookup("AWS_REGION"),
                endpoint_url: lookup("BOLT_ENDPOINT_URL"),
                max_attempts: parse_or(&lookup, "BOLT_AWS_MAX_ATTEMPTS", 3)?,
            },
            stream,
        })
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|err| anyhow::anyhow!("{err}"))
            .with_context(|| format!("invalid value for {key}: '{raw}'")),
    }
}
