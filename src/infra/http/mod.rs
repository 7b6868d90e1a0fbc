mod admin;
mod chat;
pub mod error;
mod middleware;

pub use chat::{ChatRequest, ChatResponse};
pub use middleware::{PROCESS_TIME_HEADER, REQUEST_ID_HEADER};

use axum::{
    Router, middleware as mw,
    routing::{delete, get, post},
};

use crate::application::chat::ChatService;

use self::middleware::{log_responses, process_time, set_request_context};

#[derive(Clone)]
pub struct HttpState {
    pub chat: ChatService,
}

/// Public router: chat, health and the service descriptor.
pub fn build_router(state: HttpState) -> Router {
    Router::new()
        .route("/", get(chat::root))
        .route("/chat", post(chat::chat))
        .route("/health", get(chat::health))
        .fallback(chat::not_found)
        .with_state(state)
        .layer(mw::from_fn(process_time))
        .layer(mw::from_fn(log_responses))
        .layer(mw::from_fn(set_request_context))
}

/// Administrative router, bound to a separate (by default loopback) listener.
pub fn build_admin_router(state: HttpState) -> Router {
    Router::new()
        .route("/_health", get(admin::admin_health))
        .route("/cache", delete(admin::clear_cache))
        .with_state(state)
        .layer(mw::from_fn(log_responses))
        .layer(mw::from_fn(set_request_context))
}
