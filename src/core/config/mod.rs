use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),
}

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub llm: LlmConfig,
    pub media: MediaConfig,
    pub rate_limit: RateLimitConfig,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Empty means permissive CORS (development)
    pub cors_origins: Vec<String>,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Clone, Debug)]
pub struct LlmConfig {
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout_secs: u64,
}

/// Image CDN credentials used for signed uploads
#[derive(Clone, Debug, Default)]
pub struct MediaConfig {
    pub cloud_name: String,
    pub api_key: String,
    pub api_secret: String,
    pub upload_folder: String,
}

impl MediaConfig {
    pub fn is_configured(&self) -> bool {
        !self.cloud_name.is_empty() && !self.api_key.is_empty() && !self.api_secret.is_empty()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WindowLimit {
    pub max_requests: u32,
    pub window: Duration,
}

#[derive(Clone, Debug)]
pub struct RateLimitConfig {
    pub enabled: bool,
    /// General API traffic
    pub api: WindowLimit,
    /// Quiz generation, remediation and chat
    pub ai: WindowLimit,
    pub upload: WindowLimit,
    pub sweep_interval: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            api: WindowLimit {
                max_requests: 300,
                window: Duration::from_secs(60),
            },
            ai: WindowLimit {
                max_requests: 10,
                window: Duration::from_secs(60),
            },
            upload: WindowLimit {
                max_requests: 20,
                window: Duration::from_secs(60),
            },
            sweep_interval: Duration::from_secs(60),
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            api_key: String::new(),
            model: "gpt-4o-mini".to_string(),
            temperature: 0.7,
            max_tokens: 2000,
            timeout_secs: 60,
        }
    }
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn env_string(key: &str, default: &str) -> String {
    std::env::var(key)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn env_flag(key: &str, default: bool) -> bool {
    std::env::var(key)
        .map(|v| v != "false" && v != "0")
        .unwrap_or(default)
}

fn window_from_env(prefix: &str, default: WindowLimit) -> WindowLimit {
    WindowLimit {
        max_requests: env_or(&format!("{prefix}_MAX"), default.max_requests).max(1),
        window: Duration::from_secs(
            env_or(&format!("{prefix}_WINDOW_SECS"), default.window.as_secs()).max(1),
        ),
    }
}

pub fn parse_origins(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|o| !o.is_empty())
        .map(ToString::to_string)
        .collect()
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let url = std::env::var("DATABASE_URL").map_err(|_| ConfigError::Missing("DATABASE_URL"))?;

        let llm_defaults = LlmConfig::default();
        let rl_defaults = RateLimitConfig::default();

        Ok(Self {
            server: ServerConfig {
                host: env_string("SERVER_HOST", "0.0.0.0"),
                port: env_or("SERVER_PORT", 8080),
                cors_origins: parse_origins(&env_string("CORS_ALLOWED_ORIGINS", "")),
            },
            database: DatabaseConfig {
                url,
                max_connections: env_or("DATABASE_MAX_CONNECTIONS", 10),
            },
            llm: LlmConfig {
                base_url: env_string("LLM_BASE_URL", &llm_defaults.base_url),
                api_key: env_string("LLM_API_KEY", ""),
                model: env_string("LLM_MODEL", &llm_defaults.model),
                temperature: env_or("LLM_TEMPERATURE", llm_defaults.temperature),
                max_tokens: env_or("LLM_MAX_TOKENS", llm_defaults.max_tokens),
                timeout_secs: env_or("LLM_TIMEOUT_SECS", llm_defaults.timeout_secs),
            },
            media: MediaConfig {
                cloud_name: env_string("MEDIA_CLOUD_NAME", ""),
                api_key: env_string("MEDIA_API_KEY", ""),
                api_secret: env_string("MEDIA_API_SECRET", ""),
                upload_folder: env_string("MEDIA_UPLOAD_FOLDER", "learnserver"),
            },
            rate_limit: RateLimitConfig {
                enabled: env_flag("RATE_LIMIT_ENABLED", rl_defaults.enabled),
                api: window_from_env("RATE_LIMIT_API", rl_defaults.api),
                ai: window_from_env("RATE_LIMIT_AI", rl_defaults.ai),
                upload: window_from_env("RATE_LIMIT_UPLOAD", rl_defaults.upload),
                sweep_interval: Duration::from_secs(
                    env_or("RATE_LIMIT_SWEEP_SECS", rl_defaults.sweep_interval.as_secs()).max(1),
                ),
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_origins_skips_blanks() {
        let origins = parse_origins("https://a.example, ,https://b.example,");
        assert_eq!(origins, vec!["https://a.example", "https://b.example"]);
        assert!(parse_origins("").is_empty());
    }

    #[test]
    fn test_media_config_requires_all_credentials() {
        let mut media = MediaConfig {
            cloud_name: "demo".into(),
            api_key: "key".into(),
            api_secret: String::new(),
            upload_folder: "x".into(),
        };
        assert!(!media.is_configured());
        media.api_secret = "secret".into();
        assert!(media.is_configured());
    }

    #[test]
    fn test_rate_limit_defaults_are_stricter_for_ai() {
        let config = RateLimitConfig::default();
        assert!(config.ai.max_requests < config.api.max_requests);
        assert_eq!(config.ai.window, Duration::from_secs(60));
    }

    #[test]
    fn test_env_or_falls_back_on_garbage() {
        std::env::set_var("LEARNSERVER_TEST_GARBAGE_PORT", "not-a-port");
        let port: u16 = env_or("LEARNSERVER_TEST_GARBAGE_PORT", 8080);
        assert_eq!(port, 8080);
        std::env::remove_var("LEARNSERVER_TEST_GARBAGE_PORT");
    }
}
