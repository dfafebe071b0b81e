//! Health check endpoint for load balancers and orchestrators.

use axum::http::StatusCode;

/// Returns 200 OK with the text "OK".
pub async fn health_handler() -> (StatusCode, &'static str) {
    (StatusCode::OK, "OK")
}
