use crate::config::ConfigError;

/// Localized fallback shown to users when nothing more specific is safe to return.
pub const GENERIC_ERROR_MESSAGE: &str = "生成服务暂时不可用，请稍后再试";

/// How an upstream call failed, decided by the provider client at the point the
/// HTTP status is known.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpstreamErrorKind {
    /// 503/502/504/529 or an "unavailable"/"overloaded" body.
    Overloaded,
    /// 429.
    RateLimited,
    /// 401/403.
    Auth,
    /// Any other 4xx.
    Rejected,
    /// Any other 5xx.
    Server,
}

impl UpstreamErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Overloaded => "overloaded",
            Self::RateLimited => "rate_limited",
            Self::Auth => "auth",
            Self::Rejected => "rejected",
            Self::Server => "server",
        }
    }
}

impl std::fmt::Display for UpstreamErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum VidgenError {
    /// Missing or malformed input. User-correctable, never retried.
    #[error("{0}")]
    Validation(String),
    #[error("configuration error: {0}")]
    Configuration(#[from] ConfigError),
    /// The upstream answered with a non-2xx status.
    #[error("upstream {kind} error (status {status:?}): {message}")]
    Upstream {
        kind: UpstreamErrorKind,
        status: Option<u16>,
        message: String,
        retryable: bool,
    },
    /// The upstream answered 2xx but violated its contract.
    #[error("upstream protocol violation: {message}; raw response: {snapshot}")]
    UpstreamProtocol { message: String, snapshot: String },
    #[error("network request failed: {0}")]
    Network(#[from] reqwest::Error),
    #[error("failed to parse response: {0}")]
    Json(#[from] serde_json::Error),
    #[error("URL parsing failed: {0}")]
    Url(#[from] url::ParseError),
    #[error("task lifecycle violation: {0}")]
    Lifecycle(#[from] crate::orchestrator::InvalidTransition),
    /// A prompt-composition collaborator (describer, rewriter, image store) failed.
    #[error("{name} failed: {message}")]
    Collaborator { name: &'static str, message: String },
}

impl VidgenError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Builds an upstream error, deriving kind and retryability from the status
    /// code and response body.
    pub fn from_status(status: u16, body: &str) -> Self {
        let kind = crate::fallback::classify_status(status, body);
        Self::Upstream {
            kind,
            status: Some(status),
            message: format!("{status}: {body}"),
            retryable: matches!(
                kind,
                UpstreamErrorKind::Overloaded | UpstreamErrorKind::RateLimited
            ),
        }
    }

    /// Returns true for transient errors that may succeed against another model.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Upstream { retryable, .. } => *retryable,
            _ => false,
        }
    }

    pub fn upstream_kind(&self) -> Option<UpstreamErrorKind> {
        match self {
            Self::Upstream { kind, .. } => Some(*kind),
            _ => None,
        }
    }

    /// HTTP status the server surfaces for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Validation(_) => 400,
            _ => 500,
        }
    }

    /// A localized, human-readable message that never leaks upstream bodies.
    pub fn user_message(&self) -> String {
        match self {
            Self::Validation(msg) => msg.clone(),
            Self::Upstream { kind, .. } => match kind {
                UpstreamErrorKind::Overloaded | UpstreamErrorKind::RateLimited => {
                    "生成服务繁忙，请稍后再试".to_string()
                }
                UpstreamErrorKind::Auth => "生成服务鉴权失败，请联系管理员".to_string(),
                UpstreamErrorKind::Rejected => "生成请求被拒绝，请检查输入内容".to_string(),
                UpstreamErrorKind::Server => GENERIC_ERROR_MESSAGE.to_string(),
            },
            Self::Collaborator { name, .. } => format!("{name} 暂时不可用，请稍后再试"),
            _ => GENERIC_ERROR_MESSAGE.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overload_statuses_are_retryable() {
        for status in [502, 503, 504, 529, 429] {
            assert!(VidgenError::from_status(status, "").is_retryable(), "{status}");
        }
    }

    #[test]
    fn unavailable_body_marks_server_error_retryable() {
        let err = VidgenError::from_status(500, "Service Unavailable, try later");
        assert_eq!(err.upstream_kind(), Some(UpstreamErrorKind::Overloaded));
        assert!(err.is_retryable());
    }

    #[test]
    fn client_errors_are_fatal() {
        assert!(!VidgenError::from_status(400, "bad input").is_retryable());
        assert!(!VidgenError::from_status(401, "").is_retryable());
        assert!(!VidgenError::from_status(500, "boom").is_retryable());
    }

    #[test]
    fn user_message_hides_upstream_body() {
        let err = VidgenError::from_status(500, "stack trace at internal.host:8080");
        assert!(!err.user_message().contains("internal.host"));
        assert_eq!(err.status_code(), 500);
        assert_eq!(VidgenError::validation("prompt or image required").status_code(), 400);
    }
}
