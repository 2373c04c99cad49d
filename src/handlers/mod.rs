pub mod admin;
pub mod applications;
pub mod auth;
pub mod files;

use axum::{http::StatusCode, response::IntoResponse, Json};
use serde_json::{json, Value};

pub fn message(text: &str) -> Json<Value> {
    Json(json!({ "message": text }))
}

pub async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

pub async fn not_found() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, message("Resource not found"))
}
