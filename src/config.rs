use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::SPARK_API_BASE;
use crate::error::ConfigError;

/// Default config file path.
pub const CONFIG_PATH: &str = "config.toml";

/// Top-level application config deserialized from `config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub spark: SparkConfig,
    #[serde(default)]
    pub notifications: NotificationsConfig,
    #[serde(default)]
    pub settings: SettingsConfig,
}

/// Spark API access.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SparkConfig {
    /// Bearer access token for the replication API.
    pub access_token: String,
    #[serde(default = "default_api_base")]
    pub api_base: String,
    /// Page size for listing fetches (`$top`).
    #[serde(default = "default_page_size")]
    pub page_size: usize,
}

/// Outbound notification channels. Each channel is optional, but at least
/// one must be configured.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NotificationsConfig {
    pub slack: Option<SlackConfig>,
    pub twilio: Option<TwilioConfig>,
}

/// Slack incoming-webhook channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlackConfig {
    pub webhook_url: String,
}

/// Twilio SMS channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TwilioConfig {
    pub account_sid: String,
    pub auth_token: String,
    /// Sending number, E.164.
    pub from_number: String,
    /// Recipient number, E.164.
    pub to_number: String,
}

/// Runtime settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettingsConfig {
    /// Polling interval in seconds.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
    /// Whether the interval loop runs at all (the manual trigger works
    /// either way).
    #[serde(default = "default_enable_polling")]
    pub enable_polling: bool,
    /// Port for the trigger/status HTTP server.
    #[serde(default = "default_listen_port")]
    pub listen_port: u16,
    /// Optional durable-cursor file; when set, the newest observed
    /// modification timestamp survives restarts.
    #[serde(default)]
    pub cursor_path: Option<String>,
}

fn default_api_base() -> String {
    SPARK_API_BASE.to_string()
}

fn default_page_size() -> usize {
    100
}

fn default_poll_interval() -> u64 {
    120
}

fn default_enable_polling() -> bool {
    true
}

fn default_listen_port() -> u16 {
    3000
}

impl Default for SettingsConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval(),
            enable_polling: default_enable_polling(),
            listen_port: default_listen_port(),
            cursor_path: None,
        }
    }
}

impl AppConfig {
    /// Load config from the given TOML file path.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let config: Self = toml::from_str(&contents)
            .with_context(|| format!("failed to parse {}", path.display()))?;
        Ok(config)
    }

    /// Validate required fields. Called once at startup; any error here is
    /// fatal.
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        if self.spark.access_token.trim().is_empty() {
            return Err(ConfigError::MissingAccessToken);
        }
        Url::parse(&self.spark.api_base).map_err(|source| ConfigError::InvalidUrl {
            field: "spark.api_base",
            source,
        })?;

        let slack = self.notifications.slack.as_ref();
        let twilio = self.notifications.twilio.as_ref();
        if slack.is_none() && twilio.is_none() {
            return Err(ConfigError::NoChannels);
        }

        if let Some(slack) = slack {
            Url::parse(&slack.webhook_url).map_err(|source| ConfigError::InvalidUrl {
                field: "notifications.slack.webhook_url",
                source,
            })?;
        }
        if let Some(twilio) = twilio {
            for (field, value) in [
                ("notifications.twilio.account_sid", &twilio.account_sid),
                ("notifications.twilio.auth_token", &twilio.auth_token),
                ("notifications.twilio.from_number", &twilio.from_number),
                ("notifications.twilio.to_number", &twilio.to_number),
            ] {
                if value.trim().is_empty() {
                    return Err(ConfigError::MissingField { field });
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn full_config() -> AppConfig {
        toml::from_str(
            r#"
            [spark]
            access_token = "tok_123"

            [notifications.slack]
            webhook_url = "https://hooks.slack.com/services/T0/B0/xyz"

            [notifications.twilio]
            account_sid = "AC123"
            auth_token = "secret"
            from_number = "+15550001111"
            to_number = "+15550002222"

            [settings]
            poll_interval_secs = 300
            listen_port = 8080
            cursor_path = "cursor.json"
            "#,
        )
        .unwrap()
    }

    #[test]
    fn parses_full_config() {
        let config = full_config();
        assert_eq!(config.spark.access_token, "tok_123");
        assert_eq!(config.spark.api_base, SPARK_API_BASE);
        assert_eq!(config.spark.page_size, 100);
        assert_eq!(config.settings.poll_interval_secs, 300);
        assert_eq!(config.settings.listen_port, 8080);
        assert_eq!(config.settings.cursor_path.as_deref(), Some("cursor.json"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn settings_default_when_absent() {
        let config: AppConfig = toml::from_str(
            r#"
            [spark]
            access_token = "tok"

            [notifications.slack]
            webhook_url = "https://hooks.slack.com/services/T0/B0/xyz"
            "#,
        )
        .unwrap();
        assert_eq!(config.settings.poll_interval_secs, 120);
        assert!(config.settings.enable_polling);
        assert_eq!(config.settings.listen_port, 3000);
        assert!(config.settings.cursor_path.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn empty_token_rejected() {
        let mut config = full_config();
        config.spark.access_token = "  ".to_string();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::MissingAccessToken)
        ));
    }

    #[test]
    fn no_channels_rejected() {
        let mut config = full_config();
        config.notifications.slack = None;
        config.notifications.twilio = None;
        assert!(matches!(config.validate(), Err(ConfigError::NoChannels)));
    }

    #[test]
    fn bad_webhook_url_rejected() {
        let mut config = full_config();
        config.notifications.slack = Some(SlackConfig {
            webhook_url: "not a url".to_string(),
        });
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidUrl { field, .. }) if field == "notifications.slack.webhook_url"
        ));
    }

    #[test]
    fn blank_twilio_field_rejected() {
        let mut config = full_config();
        if let Some(twilio) = config.notifications.twilio.as_mut() {
            twilio.auth_token = String::new();
        }
        assert!(matches!(
            config.validate(),
            Err(ConfigError::MissingField { field }) if field == "notifications.twilio.auth_token"
        ));
    }
}
