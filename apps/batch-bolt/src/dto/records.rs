//! DTOs for record ingestion endpoints

use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;

/// Request body for the records endpoint
#[derive(Debug, Deserialize, ToSchema)]
pub struct IngestRecordsRequest {
    /// JSON records to forward, in order
    #[schema(value_type = Vec<Object>, example = json!([{ "user": 42, "action": "click" }]))]
    pub records: Vec<Value>,
}

/// Response body for accepted records
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct IngestRecordsResponse {
    /// Number of records handed over to the delivery pipeline
    #[schema(example = 1)]
    pub accepted: usize,
}

/// Error response body
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    /// Error description
    #[schema(example = "Records cannot be empty")]
    pub error: String,
}
