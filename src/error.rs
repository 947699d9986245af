use std::time::Duration;
use thiserror::Error;

/// Failure categories for backend requests.
///
/// `Clone` because de-duplicated requests hand the same result to every waiter.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ApiError {
    #[error("network error: {0}")]
    Network(String),
    #[error("request timed out after {0:?}")]
    Timeout(Duration),
    #[error("HTTP error! status: {0}")]
    Status(u16),
    #[error("malformed response: {0}")]
    Malformed(String),
    #[error("authentication required, please log in again")]
    Unauthorized,
    #[error("request rejected: {0}")]
    Rejected(String),
    #[error("local state error: {0}")]
    Storage(String),
}

impl ApiError {
    /// Timeouts and auth failures end the retry loop immediately. A 401 has
    /// already cleared the stored token, so repeating it cannot succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ApiError::Network(_) | ApiError::Status(_) | ApiError::Malformed(_)
        )
    }

    #[allow(dead_code)]
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Status(code) => Some(*code),
            ApiError::Unauthorized => Some(401),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            ApiError::Malformed(e.to_string())
        } else if let Some(status) = e.status() {
            ApiError::Status(status.as_u16())
        } else {
            ApiError::Network(e.to_string())
        }
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(e: serde_json::Error) -> Self {
        ApiError::Malformed(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_categories() {
        assert!(ApiError::Network("refused".into()).is_retryable());
        assert!(ApiError::Status(503).is_retryable());
        assert!(ApiError::Malformed("eof".into()).is_retryable());
        assert!(!ApiError::Timeout(Duration::from_secs(10)).is_retryable());
        assert!(!ApiError::Unauthorized.is_retryable());
        assert!(!ApiError::Rejected("no".into()).is_retryable());
        assert!(!ApiError::Storage("disk full".into()).is_retryable());
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(ApiError::Unauthorized.status(), Some(401));
        assert_eq!(ApiError::Status(404).status(), Some(404));
        assert_eq!(ApiError::Network("x".into()).status(), None);
    }
}
