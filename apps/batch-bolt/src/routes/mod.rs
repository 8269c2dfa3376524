//! API routes

pub mod records;

use axum::Router;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::{
    dto::records::{ErrorResponse, IngestRecordsRequest, IngestRecordsResponse},
    handlers, AppState,
};

/// OpenAPI documentation structure
#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::records::ingest_records_handler,
        health_handler
    ),
    components(
        schemas(IngestRecordsRequest, IngestRecordsResponse, ErrorResponse)
    ),
    tags(
        (name = "records", description = "Record ingestion endpoints"),
        (name = "health", description = "Health check endpoints")
    ),
    info(
        title = "BatchBolt API",
        version = "0.1.0",
        description = "HTTP ingestion front-end for BatchLink batched record delivery",
        contact(
            name = "BatchLink Team"
        )
    )
)]
pub struct ApiDoc;

/// Create the main application router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .merge(records::routes())
        .route("/health", axum::routing::get(health_handler))
        .with_state(state)
}

/// Health check endpoint
#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service is healthy", body = String)
    ),
    tag = "health"
)]
async fn health_handler() -> &'static str {
    "OK"
}
