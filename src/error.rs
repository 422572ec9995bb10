use reqwest::StatusCode;
use thiserror::Error;

/// Failures surfaced by the Waterscope client.
#[derive(Debug, Error)]
pub enum WaterscopeError {
    /// Login rejected, a login step could not be completed, or the session expired.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// The dashboard was fetched but the expected values were not on it.
    #[error("data extraction failed: {0}")]
    Extraction(String),

    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("{context}: HTTP {status}")]
    Http { status: StatusCode, context: String },

    #[error("configuration error: {0}")]
    Config(String),
}

impl WaterscopeError {
    pub fn auth(msg: impl Into<String>) -> Self {
        Self::Auth(msg.into())
    }

    pub fn extraction(msg: impl Into<String>) -> Self {
        Self::Extraction(msg.into())
    }

    pub fn http(status: StatusCode, context: impl Into<String>) -> Self {
        Self::Http {
            status,
            context: context.into(),
        }
    }

    pub fn is_auth(&self) -> bool {
        matches!(self, Self::Auth(_))
    }

    /// Short machine-readable kind, used in status output.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Auth(_) => "auth",
            Self::Extraction(_) => "extraction",
            Self::Network(_) | Self::Http { .. } => "network",
            Self::Config(_) => "config",
        }
    }
}

impl From<url::ParseError> for WaterscopeError {
    fn from(e: url::ParseError) -> Self {
        Self::Config(format!("invalid URL: {e}"))
    }
}

pub type Result<T, E = WaterscopeError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        assert_eq!(WaterscopeError::auth("bad password").kind(), "auth");
        assert_eq!(WaterscopeError::extraction("no LCD read").kind(), "extraction");
        assert_eq!(
            WaterscopeError::http(StatusCode::BAD_GATEWAY, "dashboard").kind(),
            "network"
        );
        assert!(WaterscopeError::auth("x").is_auth());
        assert!(!WaterscopeError::extraction("x").is_auth());
    }

    #[test]
    fn test_error_display() {
        let err = WaterscopeError::http(StatusCode::NOT_FOUND, "login page");
        assert_eq!(err.to_string(), "login page: HTTP 404 Not Found");
    }
}
