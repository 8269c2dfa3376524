//! Record ingestion handler

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use batchlink_domain::DeliveryError;
use tracing::{debug, warn};

use crate::{
    dto::records::{ErrorResponse, IngestRecordsRequest, IngestRecordsResponse},
    AppState,
};

/// Hand records over to the delivery stream
///
/// Records are accepted once they are queued; delivery happens in the
/// background.
#[utoipa::path(
    post,
    path = "/records",
    request_body = IngestRecordsRequest,
    responses(
        (status = 202, description = "Records accepted for delivery", body = IngestRecordsResponse),
        (status = 400, description = "Bad request - no records", body = ErrorResponse),
        (status = 503, description = "Service is shutting down", body = ErrorResponse)
    ),
    tag = "records"
)]
pub async fn ingest_records_handler(
    State(state): State<AppState>,
    Json(payload): Json<IngestRecordsRequest>,
) -> impl IntoResponse {
    if payload.records.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse {
                error: "Records cannot be empty".to_string(),
            }),
        )
            .into_response();
    }

    let total = payload.records.len();
    debug!(records = total, "Received records");

    for (accepted, record) in payload.records.into_iter().enumerate() {
        if let Err(err) = state.records.put(record).await {
            warn!(accepted, total, error = %err, "Delivery stream refused records");
            let status = match err {
                DeliveryError::Stopped => StatusCode::SERVICE_UNAVAILABLE,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            };
            return (
                status,
                Json(ErrorResponse {
                    error: format!("{err} ({accepted} of {total} records accepted)"),
                }),
            )
                .into_response();
        }
    }

    (
        StatusCode::ACCEPTED,
        Json(IngestRecordsResponse { accepted: total }),
    )
        .into_response()
}
