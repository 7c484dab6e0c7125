use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;
use tracing::warn;

pub const DEFAULT_API_BASE: &str = "http://localhost:8000";
const DEFAULT_POLL_INTERVAL_MS: u64 = 5_000;
const DEFAULT_CONVERSATION_POLL_ATTEMPTS: u32 = 24;
const DEFAULT_MESSAGE_POLL_ATTEMPTS: u32 = 30;

/// Spacing and budget of one poll loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    pub max_attempts: u32,
}

/// Runtime settings of the chat client.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Base URL of the backend gateway, without a trailing slash.
    pub api_base: String,
    pub poll_interval_ms: u64,
    pub conversation_poll_attempts: u32,
    pub message_poll_attempts: u32,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            conversation_poll_attempts: DEFAULT_CONVERSATION_POLL_ATTEMPTS,
            message_poll_attempts: DEFAULT_MESSAGE_POLL_ATTEMPTS,
        }
    }
}

impl ClientConfig {
    /// Builds a config from `POKE_*` variables resolved through `lookup`.
    /// Missing variables keep their defaults; unparseable ones are logged and ignored.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let api_base = lookup("POKE_API_BASE")
            .map(|base| base.trim().trim_end_matches('/').to_string())
            .filter(|base| !base.is_empty())
            .unwrap_or(defaults.api_base);

        Self {
            api_base,
            poll_interval_ms: parse_or(&lookup, "POKE_POLL_INTERVAL_MS", defaults.poll_interval_ms),
            conversation_poll_attempts: parse_or(
                &lookup,
                "POKE_CONVERSATION_POLL_ATTEMPTS",
                defaults.conversation_poll_attempts,
            ),
            message_poll_attempts: parse_or(
                &lookup,
                "POKE_MESSAGE_POLL_ATTEMPTS",
                defaults.message_poll_attempts,
            ),
        }
    }

    pub fn conversation_poll(&self) -> PollPolicy {
        PollPolicy {
            interval: Duration::from_millis(self.poll_interval_ms),
            max_attempts: self.conversation_poll_attempts,
        }
    }

    pub fn message_poll(&self) -> PollPolicy {
        PollPolicy {
            interval: Duration::from_millis(self.poll_interval_ms),
            max_attempts: self.message_poll_attempts,
        }
    }
}

fn parse_or<T: FromStr + Copy>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T {
    match lookup(key) {
        None => default,
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!("Ignoring {key}={raw:?}: not a valid number");
            default
        }),
    }
}
