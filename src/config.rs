//! Environment-driven configuration

use crate::conversation::{AuthFlow, DEFAULT_IDENTIFIER_LENGTH};
use crate::gateway::{WhatsAppConfig, DEFAULT_WHATSAPP_API_URL};
use crate::runtime::{DispatcherConfig, DEFAULT_ORACLE_TIMEOUT};
use crate::session::{DEFAULT_DEDUP_CAPACITY, DEFAULT_IDLE_TIMEOUT_MINUTES};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{var} must be {expected}, got {value:?}")]
    Invalid {
        var: &'static str,
        value: String,
        expected: &'static str,
    },
}

/// Webhook handshake and signature settings
#[derive(Debug, Clone, Default)]
pub struct WebhookConfig {
    /// Token expected in `hub.verify_token`; verification fails when unset
    pub verify_token: Option<String>,
    /// Key for `X-Hub-Signature-256`; unsigned deliveries are accepted when unset
    pub app_secret: Option<String>,
}

/// Service configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub idle_timeout: chrono::Duration,
    pub dedup_capacity: usize,
    pub dispatcher: DispatcherConfig,
    pub webhook: WebhookConfig,
    /// `None` logs outbound messages instead of sending them
    pub whatsapp: Option<WhatsAppConfig>,
    /// `None` serves the built-in demo accounts
    pub tracker_api_url: Option<String>,
    /// Channel address -> identifier pairs for silent login against the demo
    /// accounts
    pub fixture_channels: Vec<(String, String)>,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Build from any variable source; empty values count as unset
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |var: &str| {
            lookup(var)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let port = parse(&get, "TRACKER_CHAT_PORT", 8000, "a port number")?;
        let idle_minutes = parse(
            &get,
            "TRACKER_CHAT_SESSION_TIMEOUT_MINUTES",
            DEFAULT_IDLE_TIMEOUT_MINUTES,
            "a positive number of minutes",
        )?;
        let dedup_capacity = parse(
            &get,
            "TRACKER_CHAT_DEDUP_CAPACITY",
            DEFAULT_DEDUP_CAPACITY,
            "a positive integer",
        )?;
        let identifier_length = parse(
            &get,
            "TRACKER_CHAT_IDENTIFIER_LENGTH",
            DEFAULT_IDENTIFIER_LENGTH,
            "a positive integer",
        )?;
        let oracle_timeout_secs = parse(
            &get,
            "TRACKER_CHAT_ORACLE_TIMEOUT_SECS",
            DEFAULT_ORACLE_TIMEOUT.as_secs(),
            "a positive number of seconds",
        )?;
        let auth_flow = parse(
            &get,
            "TRACKER_CHAT_AUTH_FLOW",
            AuthFlow::Credentials,
            "`credentials` or `channel_address`",
        )?;

        positive("TRACKER_CHAT_SESSION_TIMEOUT_MINUTES", idle_minutes)?;
        positive("TRACKER_CHAT_DEDUP_CAPACITY", dedup_capacity)?;
        positive("TRACKER_CHAT_IDENTIFIER_LENGTH", identifier_length)?;
        positive("TRACKER_CHAT_ORACLE_TIMEOUT_SECS", oracle_timeout_secs)?;

        let whatsapp = match (get("WHATSAPP_TOKEN"), get("WHATSAPP_PHONE_NUMBER_ID")) {
            (Some(access_token), Some(phone_number_id)) => Some(WhatsAppConfig {
                api_url: get("WHATSAPP_API_URL")
                    .unwrap_or_else(|| DEFAULT_WHATSAPP_API_URL.to_string()),
                phone_number_id,
                access_token,
            }),
            _ => None,
        };

        Ok(Self {
            port,
            idle_timeout: chrono::Duration::minutes(idle_minutes),
            dedup_capacity,
            dispatcher: DispatcherConfig {
                auth_flow,
                identifier_length,
                oracle_timeout: Duration::from_secs(oracle_timeout_secs),
            },
            webhook: WebhookConfig {
                verify_token: get("WHATSAPP_VERIFY_TOKEN"),
                app_secret: get("WHATSAPP_APP_SECRET"),
            },
            whatsapp,
            tracker_api_url: get("TRACKER_CHAT_TRACKER_API_URL"),
            fixture_channels: get("TRACKER_CHAT_FIXTURE_CHANNELS")
                .map(|v| parse_pairs(&v))
                .transpose()?
                .unwrap_or_default(),
        })
    }
}

fn parse<T: FromStr>(
    get: &impl Fn(&str) -> Option<String>,
    var: &'static str,
    default: T,
    expected: &'static str,
) -> Result<T, ConfigError> {
    match get(var) {
        None => Ok(default),
        Some(value) => value.parse().map_err(|_| ConfigError::Invalid {
            var,
            value,
            expected,
        }),
    }
}

fn positive<T>(var: &'static str, value: T) -> Result<(), ConfigError>
where
    T: Default + PartialOrd + ToString,
{
    if value > T::default() {
        Ok(())
    } else {
        Err(ConfigError::Invalid {
            var,
            value: value.to_string(),
            expected: "greater than zero",
        })
    }
}

/// `address=identifier,address=identifier`
fn parse_pairs(value: &str) -> Result<Vec<(String, String)>, ConfigError> {
    value
        .split(',')
        .map(str::trim)
        .filter(|pair| !pair.is_empty())
        .map(|pair| match pair.split_once('=') {
            Some((address, identifier)) if !address.trim().is_empty() => {
                Ok((address.trim().to_string(), identifier.trim().to_string()))
            }
            _ => Err(ConfigError::Invalid {
                var: "TRACKER_CHAT_FIXTURE_CHANNELS",
                value: pair.to_string(),
                expected: "`address=identifier` pairs",
            }),
        })
        .collect()
}
