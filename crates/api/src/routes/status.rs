use axum::{extract::State, routing::get, Json, Router};
use serde_json::{json, Value};

use crate::AppState;

pub fn status_router() -> Router<AppState> {
    Router::new()
        .route("/", get(home))
        .route("/ping", get(ping))
}

async fn home(State(state): State<AppState>) -> Json<Value> {
    let running = state.engine_state.read().await.is_running();
    Json(json!({
        "status": if running { "Bot is running" } else { "Bot is not running" },
    }))
}

async fn ping() -> &'static str {
    "pong"
}
