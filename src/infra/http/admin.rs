use axum::{Json, extract::State};
use serde::Serialize;
use serde_json::{Value, json};
use tracing::info;

use super::HttpState;

#[derive(Debug, Serialize)]
pub struct ClearCacheResponse {
    pub removed: usize,
}

pub(super) async fn admin_health(State(state): State<HttpState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "cache_backend": state.chat.cache().backend_name(),
    }))
}

pub(super) async fn clear_cache(State(state): State<HttpState>) -> Json<ClearCacheResponse> {
    let removed = state.chat.clear_cache().await;
    info!(
        target = "infra::http::admin::clear_cache",
        removed, "Cleared response cache"
    );
    Json(ClearCacheResponse { removed })
}
