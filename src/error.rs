//! Error types for the digest bot
//!
//! Errors are classified by recoverability: rate-limit-class failures are
//! retried with backoff, everything else propagates immediately.

use thiserror::Error;

use crate::config::ConfigError;

#[derive(Debug, Error)]
pub enum BotError {
    // Retryable
    #[error("API rate limit exceeded")]
    RateLimited,

    // Non-retryable
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error {status}: {message}")]
    Api { status: u16, message: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Chat platform error: {0}")]
    ChatPlatform(String),

    // Fatal at startup, never retried
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl BotError {
    /// Returns true for rate-limit-class failures, the only errors
    /// external call sites retry.
    pub fn is_rate_limit(&self) -> bool {
        matches!(
            self,
            BotError::RateLimited | BotError::Api { status: 429, .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_limit_classification() {
        assert!(BotError::RateLimited.is_rate_limit());
        assert!(BotError::Api {
            status: 429,
            message: "slow down".to_string()
        }
        .is_rate_limit());
    }

    #[test]
    fn test_non_rate_limit_errors_not_retryable() {
        assert!(!BotError::Api {
            status: 500,
            message: "boom".to_string()
        }
        .is_rate_limit());
        assert!(!BotError::ChatPlatform("channel_not_found".to_string()).is_rate_limit());
    }
}
