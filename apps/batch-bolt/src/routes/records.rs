//! Record ingestion routes

use axum::{routing::post, Router};

use crate::{handlers::records::ingest_records_handler, AppState};

/// Create record ingestion routes
pub fn routes() -> Router<AppState> {
    Router::new().route("/records", post(ingest_records_handler))
}
