//! Shared AWS SDK configuration

use aws_config::{retry::RetryConfig, BehaviorVersion, Region, SdkConfig};
use tracing::info;

use crate::config::AwsSettings;

/// Load the default AWS configuration chain with the service overrides applied
///
/// SDK retries are adaptive and only cover whole-call failures; per-record
/// retries are handled by the delivery pipeline.
pub async fn load_sdk_config(settings: &AwsSettings) -> SdkConfig {
    let mut loader = aws_config::defaults(BehaviorVersion::latest())
        .retry_config(RetryConfig::adaptive().with_max_attempts(settings.max_attempts));

    if let Some(region) = &settings.region {
        loader = loader.region(Region::new(region.clone()));
    }
    if let Some(endpoint_url) = &settings.endpoint_url {
        info!(endpoint_url = %endpoint_url, "Using custom AWS endpoint");
        loader = loader.endpoint_url(endpoint_url);
    }

    loader.load().await
}
