//! Rate Limiting Module
//!
//! Fixed-window request counting keyed by caller identifier. Each key owns a
//! window `{count, reset_at}`; a request that finds no window (or an expired
//! one) opens a fresh window, otherwise it is rejected once `count` reaches
//! the configured maximum. Expired windows are swept periodically.

use axum::{
    extract::{ConnectInfo, Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
};
use log::{debug, warn};
use std::{
    collections::HashMap,
    net::SocketAddr,
    sync::Arc,
    time::{Duration, Instant},
};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::core::config::{RateLimitConfig, WindowLimit};

#[derive(Debug, Clone, Copy)]
struct Window {
    count: u32,
    reset_at: Instant,
}

/// Outcome of a single rate limit check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub remaining: u32,
    pub retry_after: Duration,
}

/// Per-key fixed-window limiter
#[derive(Debug)]
pub struct FixedWindowLimiter {
    windows: RwLock<HashMap<String, Window>>,
    limit: WindowLimit,
}

impl FixedWindowLimiter {
    pub fn new(limit: WindowLimit) -> Self {
        Self {
            windows: RwLock::new(HashMap::new()),
            limit,
        }
    }

    /// Check and count a request for `key`
    pub async fn check(&self, key: &str) -> RateLimitDecision {
        self.check_at(key, Instant::now()).await
    }

    pub async fn check_at(&self, key: &str, now: Instant) -> RateLimitDecision {
        let mut windows = self.windows.write().await;
        let max = self.limit.max_requests;

        match windows.get_mut(key) {
            Some(window) if now < window.reset_at => {
                if window.count >= max {
                    return RateLimitDecision {
                        allowed: false,
                        remaining: 0,
                        retry_after: window.reset_at.saturating_duration_since(now),
                    };
                }
                window.count += 1;
                RateLimitDecision {
                    allowed: true,
                    remaining: max - window.count,
                    retry_after: Duration::ZERO,
                }
            }
            _ => {
                windows.insert(
                    key.to_string(),
                    Window {
                        count: 1,
                        reset_at: now + self.limit.window,
                    },
                );
                RateLimitDecision {
                    allowed: true,
                    remaining: max.saturating_sub(1),
                    retry_after: Duration::ZERO,
                }
            }
        }
    }

    /// Drop every window that has expired; returns how many were removed
    pub async fn sweep(&self) -> usize {
        self.sweep_at(Instant::now()).await
    }

    pub async fn sweep_at(&self, now: Instant) -> usize {
        let mut windows = self.windows.write().await;
        let before = windows.len();
        windows.retain(|_, w| now < w.reset_at);
        before - windows.len()
    }

    pub async fn tracked_keys(&self) -> usize {
        self.windows.read().await.len()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimiterKind {
    Api,
    Ai,
    Upload,
}

/// Rate limit state shared across requests
#[derive(Debug)]
pub struct RateLimitState {
    pub config: RateLimitConfig,
    pub api_limiter: FixedWindowLimiter,
    pub ai_limiter: FixedWindowLimiter,
    pub upload_limiter: FixedWindowLimiter,
}

impl RateLimitState {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            api_limiter: FixedWindowLimiter::new(config.api),
            ai_limiter: FixedWindowLimiter::new(config.ai),
            upload_limiter: FixedWindowLimiter::new(config.upload),
            config,
        }
    }

    pub fn limiter(&self, kind: LimiterKind) -> &FixedWindowLimiter {
        match kind {
            LimiterKind::Api => &self.api_limiter,
            LimiterKind::Ai => &self.ai_limiter,
            LimiterKind::Upload => &self.upload_limiter,
        }
    }

    pub async fn check(&self, kind: LimiterKind, key: &str) -> RateLimitDecision {
        if !self.config.enabled {
            return RateLimitDecision {
                allowed: true,
                remaining: u32::MAX,
                retry_after: Duration::ZERO,
            };
        }
        self.limiter(kind).check(key).await
    }

    pub async fn sweep(&self) -> usize {
        self.api_limiter.sweep().await
            + self.ai_limiter.sweep().await
            + self.upload_limiter.sweep().await
    }
}

/// Spawn the periodic sweeper. The task stops once the state is dropped.
pub fn spawn_sweeper(state: &Arc<RateLimitState>) -> tokio::task::JoinHandle<()> {
    let weak = Arc::downgrade(state);
    let every = state.config.sweep_interval;

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let Some(state) = weak.upgrade() else {
                break;
            };
            let removed = state.sweep().await;
            if removed > 0 {
                debug!("Rate limiter sweep removed {} expired windows", removed);
            }
        }
    })
}

/// Caller identifier: authenticated user id if present, else client IP.
/// A header that is not a UUID is ignored so callers cannot mint fresh keys.
pub fn client_key(req: &Request) -> String {
    if let Some(user_id) = req
        .headers()
        .get("x-user-id")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| Uuid::parse_str(v.trim()).ok())
    {
        return format!("user:{user_id}");
    }

    if let Some(forwarded) = req.headers().get("x-forwarded-for") {
        if let Ok(value) = forwarded.to_str() {
            if let Some(ip) = value.split(',').next() {
                return format!("ip:{}", ip.trim());
            }
        }
    }

    if let Some(real_ip) = req.headers().get("x-real-ip") {
        if let Ok(value) = real_ip.to_str() {
            return format!("ip:{value}");
        }
    }

    req.extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ci| format!("ip:{}", ci.0.ip()))
        .unwrap_or_else(|| "ip:unknown".to_string())
}

async fn limit_with(state: &RateLimitState, kind: LimiterKind, req: Request, next: Next) -> Response {
    let key = client_key(&req);
    let decision = state.check(kind, &key).await;

    if decision.allowed {
        next.run(req).await
    } else {
        warn!("Rate limit exceeded ({:?}) for {}", kind, key);
        rate_limit_response(kind, decision.retry_after)
    }
}

pub async fn api_rate_limit(
    State(state): State<Arc<RateLimitState>>,
    req: Request,
    next: Next,
) -> Response {
    limit_with(&state, LimiterKind::Api, req, next).await
}

pub async fn ai_rate_limit(
    State(state): State<Arc<RateLimitState>>,
    req: Request,
    next: Next,
) -> Response {
    limit_with(&state, LimiterKind::Ai, req, next).await
}

pub async fn upload_rate_limit(
    State(state): State<Arc<RateLimitState>>,
    req: Request,
    next: Next,
) -> Response {
    limit_with(&state, LimiterKind::Upload, req, next).await
}

fn rate_limit_response(kind: LimiterKind, retry_after: Duration) -> Response {
    let retry_secs = retry_after.as_secs().max(1);
    let message = match kind {
        LimiterKind::Api => "Too many requests. Please slow down.",
        LimiterKind::Ai => "AI request limit reached. Please wait before trying again.",
        LimiterKind::Upload => "Upload limit reached. Please wait before uploading again.",
    };

    let body = serde_json::json!({
        "success": false,
        "error": message,
        "retry_after": retry_secs
    });

    (
        StatusCode::TOO_MANY_REQUESTS,
        [
            ("Retry-After", retry_secs.to_string()),
            ("Content-Type", "application/json".to_string()),
        ],
        body.to_string(),
    )
        .into_response()
}
