//! Configuration management.
//!
//! Everything is read once from the environment at startup (after `.env` is loaded
//! by the binary) and injected into the clients. Nothing reads the environment later.
//!
//! - `KIE_API_KEY` - Required. Bearer token for the job-queue generation API.
//! - `KIE_BASE_URL` - Optional. Defaults to `https://api.kie.ai/api/v1/`.
//! - `VIDGEN_IMAGE_MODEL` / `VIDGEN_TEXT_MODEL` / `VIDGEN_FALLBACK_MODEL` - Optional model ids.
//! - `VIDGEN_POLL_ATTEMPTS` / `VIDGEN_POLL_INTERVAL_SECS` - Bounded-synchronous polling.
//! - `VIDGEN_FALLBACK_BACKOFF_SECS` - Wait before the fallback submission.
//! - `VISION_*`, `VISION_FALLBACK_*`, `REWRITE_*`, `IMAGE_*` - `API_KEY`, `BASE_URL`
//!   and `MODEL` of the describer, its secondary provider, the rewriter and the
//!   synchronous image API.
//! - `HOST` / `PORT` - Server bind address. Defaults to `127.0.0.1:3000`.

use std::env;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;
use url::Url;

pub const DEFAULT_KIE_BASE_URL: &str = "https://api.kie.ai/api/v1/";
pub const DEFAULT_IMAGE_MODEL: &str = "kling/v2-1-master-image-to-video";
pub const DEFAULT_TEXT_MODEL: &str = "kling/v2-1-master-text-to-video";
pub const DEFAULT_FALLBACK_MODEL: &str = "kling/v2-1-standard";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

/// The two primary model identifiers plus the fallback used after a transient
/// submission failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelSet {
    pub image_to_video: String,
    pub text_to_video: String,
    pub fallback: String,
}

impl Default for ModelSet {
    fn default() -> Self {
        Self {
            image_to_video: DEFAULT_IMAGE_MODEL.to_string(),
            text_to_video: DEFAULT_TEXT_MODEL.to_string(),
            fallback: DEFAULT_FALLBACK_MODEL.to_string(),
        }
    }
}

/// Connection settings for the job-queue provider.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub api_key: String,
    pub base_url: Url,
}

impl ProviderConfig {
    /// Builds a provider config, rejecting blank keys up front.
    pub fn new(api_key: impl Into<String>, base_url: &str) -> Result<Self, ConfigError> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(ConfigError::MissingEnvVar("KIE_API_KEY".to_string()));
        }
        Ok(Self {
            api_key,
            base_url: parse_base_url("KIE_BASE_URL", base_url)?,
        })
    }
}

/// An OpenAI-compatible endpoint used by one of the collaborators.
///
/// The key is optional because callers may pass a per-request override.
#[derive(Debug, Clone)]
pub struct EndpointConfig {
    pub api_key: Option<String>,
    pub base_url: Url,
    pub model: String,
}

impl EndpointConfig {
    pub fn new(api_key: Option<String>, base_url: &str, model: &str) -> Result<Self, ConfigError> {
        Ok(Self {
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            base_url: parse_base_url("BASE_URL", base_url)?,
            model: model.to_string(),
        })
    }

    fn from_env(prefix: &str, default_url: &str, default_model: &str) -> Result<Self, ConfigError> {
        let url_var = format!("{prefix}_BASE_URL");
        let base_url = env::var(&url_var).unwrap_or_else(|_| default_url.to_string());
        Ok(Self {
            api_key: env::var(format!("{prefix}_API_KEY"))
                .ok()
                .filter(|k| !k.trim().is_empty()),
            base_url: parse_base_url(&url_var, &base_url)?,
            model: env::var(format!("{prefix}_MODEL")).unwrap_or_else(|_| default_model.to_string()),
        })
    }
}

/// Service configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub provider: ProviderConfig,
    pub models: ModelSet,
    pub vision: EndpointConfig,
    pub vision_fallback: EndpointConfig,
    pub rewrite: EndpointConfig,
    pub image: EndpointConfig,
    pub poll_attempts: u32,
    pub poll_interval: Duration,
    pub fallback_backoff: Duration,
    pub host: String,
    pub port: u16,
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// # Errors
    ///
    /// - `ConfigError::MissingEnvVar` if `KIE_API_KEY` is absent or blank.
    /// - `ConfigError::InvalidValue` if a URL or number does not parse.
    pub fn from_env() -> Result<Self, ConfigError> {
        let api_key = env::var("KIE_API_KEY")
            .map_err(|_| ConfigError::MissingEnvVar("KIE_API_KEY".to_string()))?;
        let base_url = env::var("KIE_BASE_URL").unwrap_or_else(|_| DEFAULT_KIE_BASE_URL.to_string());
        let provider = ProviderConfig::new(api_key, &base_url)?;

        let defaults = ModelSet::default();
        let models = ModelSet {
            image_to_video: env::var("VIDGEN_IMAGE_MODEL").unwrap_or(defaults.image_to_video),
            text_to_video: env::var("VIDGEN_TEXT_MODEL").unwrap_or(defaults.text_to_video),
            fallback: env::var("VIDGEN_FALLBACK_MODEL").unwrap_or(defaults.fallback),
        };

        Ok(Self {
            provider,
            models,
            vision: EndpointConfig::from_env("VISION", "https://api.openai.com/v1/", "gpt-4o-mini")?,
            vision_fallback: EndpointConfig::from_env(
                "VISION_FALLBACK",
                "https://openrouter.ai/api/v1/",
                "google/gemini-2.0-flash-001",
            )?,
            rewrite: EndpointConfig::from_env(
                "REWRITE",
                "https://api.groq.com/openai/v1/",
                "llama-3.3-70b-versatile",
            )?,
            image: EndpointConfig::from_env("IMAGE", "https://api.openai.com/v1/", "dall-e-3")?,
            poll_attempts: parse_env("VIDGEN_POLL_ATTEMPTS", 30)?,
            poll_interval: Duration::from_secs(parse_env("VIDGEN_POLL_INTERVAL_SECS", 2)?),
            fallback_backoff: Duration::from_secs(parse_env("VIDGEN_FALLBACK_BACKOFF_SECS", 3)?),
            host: env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
            port: parse_env("PORT", 3000)?,
        })
    }
}

fn parse_env<T: FromStr>(name: &str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue(name.to_string(), raw)),
        Err(_) => Ok(default),
    }
}

/// Parses a base URL and guarantees a trailing slash so `Url::join` appends
/// instead of replacing the last path segment.
pub(crate) fn parse_base_url(name: &str, raw: &str) -> Result<Url, ConfigError> {
    let with_slash = if raw.ends_with('/') {
        raw.to_string()
    } else {
        format!("{raw}/")
    };
    Url::parse(&with_slash).map_err(|e| ConfigError::InvalidValue(name.to_string(), e.to_string()))
}
