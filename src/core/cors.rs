use axum::http::{header, HeaderName, HeaderValue, Method};
use log::{info, warn};
use std::time::Duration;
use tower_http::cors::{AllowOrigin, CorsLayer};

use crate::core::config::ServerConfig;
use crate::learn::auth::USER_ID_HEADER;

/// CORS for the JSON API. An empty origin list allows any origin, which is
/// only meant for local development.
pub fn create_cors_layer(config: &ServerConfig) -> CorsLayer {
    let origins: Vec<HeaderValue> = config
        .cors_origins
        .iter()
        .filter_map(|o| match o.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!("Ignoring invalid CORS origin: {}", o);
                None
            }
        })
        .collect();

    let allow_origin = if origins.is_empty() {
        info!("No CORS origins configured, allowing any origin");
        AllowOrigin::any()
    } else {
        AllowOrigin::list(origins)
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            HeaderName::from_static(USER_ID_HEADER),
        ])
        .expose_headers([header::RETRY_AFTER])
        .max_age(Duration::from_secs(3600))
}
