//! Application status endpoint.

use axum::extract::State;
use axum::Json;
use serde_json::json;

use crate::http::server::AppState;

pub async fn status(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "available",
        "system_info": {
            "environment": state.config.server.env,
            "version": env!("CARGO_PKG_VERSION"),
        },
    }))
}
