use std::time::Duration;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{UpstreamErrorKind, VidgenError};

/// Wait before the single fallback submission.
pub const DEFAULT_FALLBACK_BACKOFF: Duration = Duration::from_secs(3);

static OVERLOAD_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)unavailable|overloaded").expect("static regex"));

/// Classifies a non-2xx upstream response.
pub fn classify_status(status: u16, body: &str) -> UpstreamErrorKind {
    match status {
        502 | 503 | 504 | 529 => UpstreamErrorKind::Overloaded,
        429 => UpstreamErrorKind::RateLimited,
        401 | 403 => UpstreamErrorKind::Auth,
        500..=599 if OVERLOAD_RE.is_match(body) => UpstreamErrorKind::Overloaded,
        400..=499 => UpstreamErrorKind::Rejected,
        _ => UpstreamErrorKind::Server,
    }
}

/// What to do after a failed submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FallbackDecision {
    /// Sleep `after`, then submit once more against `model`.
    RetryWith { model: String, after: Duration },
    Fatal,
}

/// Decides whether a failed submission gets its one retry on the fallback model.
#[derive(Debug, Clone)]
pub struct FallbackPolicy {
    pub fallback_model: String,
    pub backoff: Duration,
}

impl FallbackPolicy {
    pub fn new(fallback_model: impl Into<String>) -> Self {
        Self {
            fallback_model: fallback_model.into(),
            backoff: DEFAULT_FALLBACK_BACKOFF,
        }
    }

    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn classify(&self, error: &VidgenError) -> FallbackDecision {
        if error.is_retryable() {
            FallbackDecision::RetryWith {
                model: self.fallback_model.clone(),
                after: self.backoff,
            }
        } else {
            FallbackDecision::Fatal
        }
    }
}
