use axum::{Json, extract::State, extract::rejection::JsonRejection};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::domain::entities::ChatResult;

use super::{HttpState, error::ApiError};

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub query: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatResponse {
    pub query: String,
    pub response: String,
    pub cached: bool,
    /// Seconds, rounded to milliseconds.
    pub response_time: f64,
}

impl From<ChatResult> for ChatResponse {
    fn from(result: ChatResult) -> Self {
        Self {
            query: result.query,
            response: result.response,
            cached: result.served_from_cache,
            response_time: result.elapsed_seconds,
        }
    }
}

pub(super) async fn chat(
    State(state): State<HttpState>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Json<ChatResponse>, ApiError> {
    let Json(request) = payload?;
    let result = state.chat.handle(&request.query).await;
    Ok(Json(result.into()))
}

pub(super) async fn health() -> Json<Value> {
    Json(json!({ "status": "healthy", "service": "AI Chatbot" }))
}

pub(super) async fn root() -> Json<Value> {
    Json(json!({
        "message": "AI Chatbot API",
        "endpoints": {
            "/chat": "POST - Send a chat query",
            "/health": "GET - Health check",
        }
    }))
}

pub(super) async fn not_found() -> ApiError {
    ApiError::not_found("No such endpoint")
}
