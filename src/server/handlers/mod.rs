use axum::{Router, routing::post};
use std::sync::Arc;

use crate::server::AppState;
use crate::server::request_logging::{ROUTE_CHAT, ROUTE_ENHANCED_CHAT};

mod chat;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route(ROUTE_CHAT, post(chat::chat_completions))
        .route(ROUTE_ENHANCED_CHAT, post(chat::enhanced_chat_completions))
}
