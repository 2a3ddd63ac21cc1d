//! Health check endpoint

use axum::{routing::get, Json, Router};
use serde::Serialize;

use crate::state::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub ok: bool,
}

pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse { ok: true })
}

pub fn router() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}
