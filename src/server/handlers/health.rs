use axum::Json;
use serde_json::{json, Value};

/// Liveness probe: returns 200 OK while the process is serving.
pub async fn health_check() -> Json<Value> {
    Json(json!({"status": "ok", "message": "Server is running"}))
}
