pub mod chat;
pub mod core;
pub mod learn;
pub mod llm;
pub mod media;

use axum::{middleware, routing::get, Router};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::core::cors::create_cors_layer;
use crate::core::health::health_check;
use crate::core::rate_limit::api_rate_limit;
use crate::core::shared::state::AppState;

/// Full HTTP surface: every module's routes behind the general API limiter,
/// CORS and request tracing
pub fn build_router(state: Arc<AppState>) -> Router {
    let rate_limits = state.rate_limits.clone();

    Router::new()
        .route("/api/health", get(health_check))
        .merge(learn::configure_learn_routes(rate_limits.clone()))
        .merge(chat::configure_chat_routes(rate_limits.clone()))
        .merge(media::configure_media_routes(rate_limits.clone()))
        .layer(middleware::from_fn_with_state(rate_limits, api_rate_limit))
        .layer(create_cors_layer(&state.config.server))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
