//! Signed image uploads.
//!
//! Clients upload images straight to the CDN; this route only hands out the
//! signature for a `{folder, timestamp}` parameter set so the API secret
//! never leaves the server.

use axum::{extract::State, middleware, routing::post, Json, Router};
use chrono::Utc;
use log::{error, info};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sha1::{Digest, Sha1};
use std::sync::Arc;

use crate::core::config::MediaConfig;
use crate::core::rate_limit::{upload_rate_limit, RateLimitState};
use crate::core::shared::state::AppState;
use crate::learn::auth::Identity;
use crate::learn::extract::JsonOrDefault;
use crate::learn::{LearnError, LearnResult};

const MAX_FOLDER_CHARS: usize = 100;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SignatureRequest {
    pub folder: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UploadSignature {
    pub signature: String,
    pub timestamp: i64,
    pub api_key: String,
    pub cloud_name: String,
    pub folder: String,
}

/// Lowercase hex SHA-1 of `k1=v1&k2=v2...` (keys sorted) followed by the secret
pub fn sign_params(params: &[(&str, String)], api_secret: &str) -> String {
    let mut sorted: Vec<&(&str, String)> = params.iter().collect();
    sorted.sort_by(|a, b| a.0.cmp(b.0));

    let to_sign = sorted
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&");

    let mut hasher = Sha1::new();
    hasher.update(to_sign.as_bytes());
    hasher.update(api_secret.as_bytes());
    hex::encode(hasher.finalize())
}

pub fn validate_folder(folder: &str) -> LearnResult<String> {
    let folder = folder.trim().trim_matches('/');
    let valid_chars = folder
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '/'));
    if folder.is_empty() || folder.len() > MAX_FOLDER_CHARS || !valid_chars || folder.contains("//") {
        return Err(LearnError::validation(
            "Folder may only contain letters, digits, '_', '-' and '/'",
        ));
    }
    Ok(folder.to_string())
}

pub fn create_signature(
    config: &MediaConfig,
    folder: Option<&str>,
    timestamp: i64,
) -> LearnResult<UploadSignature> {
    if !config.is_configured() {
        error!("Upload signature requested but media credentials are not configured");
        return Err(LearnError::Internal("Media uploads are not configured".to_string()));
    }

    let folder = validate_folder(folder.unwrap_or(&config.upload_folder))?;
    let signature = sign_params(
        &[("folder", folder.clone()), ("timestamp", timestamp.to_string())],
        &config.api_secret,
    );

    Ok(UploadSignature {
        signature,
        timestamp,
        api_key: config.api_key.clone(),
        cloud_name: config.cloud_name.clone(),
        folder,
    })
}

pub async fn upload_signature(
    State(state): State<Arc<AppState>>,
    Identity(user_id): Identity,
    JsonOrDefault(req): JsonOrDefault<SignatureRequest>,
) -> Result<Json<serde_json::Value>, LearnError> {
    let signed = create_signature(
        &state.config.media,
        req.folder.as_deref(),
        Utc::now().timestamp(),
    )?;

    info!("Issued upload signature to {} for folder {}", user_id, signed.folder);
    Ok(Json(json!({ "success": true, "data": signed })))
}

pub fn configure_media_routes(rate_limits: Arc<RateLimitState>) -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/upload/signature", post(upload_signature))
        .route_layer(middleware::from_fn_with_state(rate_limits, upload_rate_limit))
}
