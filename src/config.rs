//! Startup configuration, read once from the environment.
//!
//! Missing credentials are a fatal configuration error: reported once at
//! startup and the process exits. Nothing here is retried.

use std::env;

use thiserror::Error;

/// Default approver when APPROVER_USER_IDS is unset.
const DEFAULT_APPROVERS: &str = "U072X3EDC7Q";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable {0}")]
    MissingVar(&'static str),

    #[error("Invalid value for {name}: {value}")]
    InvalidVar { name: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub gong_access_key: String,
    pub gong_secret_key: String,
    pub gong_base_url: String,
    pub openai_api_key: String,
    pub openai_model: String,
    pub slack_bot_token: String,
    /// User ids allowed to approve digests and trigger manual runs.
    pub approver_user_ids: Vec<String>,
    /// Channel where review messages (with approval buttons) are posted.
    pub approval_channel: String,
    /// Channel where approved digests are published.
    pub target_channel: String,
    /// 5-field cron expression for the weekly generation tick.
    pub digest_cron: String,
    pub timezone: String,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            gong_access_key: require("GONG_ACCESS_KEY")?,
            gong_secret_key: require("GONG_SECRET_KEY")?,
            gong_base_url: optional("GONG_BASE_URL", "https://api.gong.io/v2"),
            openai_api_key: require("OPENAI_API_KEY")?,
            openai_model: optional("OPENAI_MODEL", "gpt-4o"),
            slack_bot_token: require("SLACK_BOT_TOKEN")?,
            approver_user_ids: parse_approvers(&optional("APPROVER_USER_IDS", DEFAULT_APPROVERS)),
            approval_channel: optional("APPROVAL_CHANNEL", "#competitor-digest"),
            target_channel: optional("TARGET_CHANNEL", "#competitors"),
            digest_cron: optional("DIGEST_CRON", "0 9 * * MON"),
            timezone: optional("DIGEST_TIMEZONE", "UTC"),
        })
    }

    pub fn is_approver(&self, user_id: &str) -> bool {
        self.approver_user_ids.iter().any(|id| id == user_id)
    }
}

fn require(name: &'static str) -> Result<String, ConfigError> {
    match env::var(name) {
        Ok(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(ConfigError::MissingVar(name)),
    }
}

fn optional(name: &str, default: &str) -> String {
    env::var(name)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn parse_approvers(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Fixed config for unit tests across the crate.
#[cfg(test)]
pub fn test_config() -> Config {
    Config {
        gong_access_key: "ak".to_string(),
        gong_secret_key: "sk".to_string(),
        gong_base_url: "https://gong.invalid/v2".to_string(),
        openai_api_key: "oa".to_string(),
        openai_model: "gpt-4o".to_string(),
        slack_bot_token: "xoxb-test".to_string(),
        approver_user_ids: vec!["U01".to_string(), "U02".to_string()],
        approval_channel: "#competitor-digest".to_string(),
        target_channel: "#competitors".to_string(),
        digest_cron: "0 9 * * MON".to_string(),
        timezone: "UTC".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_approvers_single() {
        assert_eq!(parse_approvers("U072X3EDC7Q"), vec!["U072X3EDC7Q"]);
    }

    #[test]
    fn test_parse_approvers_list_with_whitespace() {
        assert_eq!(
            parse_approvers("U01, U02 ,,U03"),
            vec!["U01", "U02", "U03"]
        );
    }

    #[test]
    fn test_is_approver() {
        let config = test_config();
        assert!(config.is_approver("U01"));
        assert!(!config.is_approver("U99"));
    }
}
