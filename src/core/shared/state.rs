use std::sync::Arc;

use crate::core::config::AppConfig;
use crate::core::rate_limit::RateLimitState;
use crate::core::shared::utils::DbPool;
use crate::llm::LLMProvider;

/// Shared application state handed to every handler
#[derive(Clone)]
pub struct AppState {
    pub conn: DbPool,
    pub config: Arc<AppConfig>,
    pub llm_provider: Arc<dyn LLMProvider>,
    pub rate_limits: Arc<RateLimitState>,
}

impl AppState {
    pub fn new(conn: DbPool, config: AppConfig, llm_provider: Arc<dyn LLMProvider>) -> Self {
        let rate_limits = Arc::new(RateLimitState::new(config.rate_limit.clone()));
        Self {
            conn,
            config: Arc::new(config),
            llm_provider,
            rate_limits,
        }
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("server", &self.config.server)
            .field("rate_limits", &self.rate_limits)
            .finish_non_exhaustive()
    }
}
