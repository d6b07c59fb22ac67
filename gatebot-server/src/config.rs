use anyhow::{Context, Result};
use gatebot_core::UserId;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::broadcast::{DEFAULT_CONCURRENCY, DEFAULT_DELIVERY_TIMEOUT};

#[derive(Clone)]
pub struct Config {
    pub bot_token: String,
    pub root_admin: UserId,
    pub reward_link: String,
    /// Bot username without `@`. Looked up with `getMe` when unset.
    pub bot_username: Option<String>,
    pub port: u16,
    /// Directory for persistent state (SQLite database).
    /// Defaults to current working directory.
    pub state_dir: PathBuf,
    /// Optional secret Telegram must echo in `X-Telegram-Bot-Api-Secret-Token`.
    pub webhook_secret: Option<String>,
    /// Optional bearer token for /status endpoint authentication.
    /// If set, requests to /status must include `Authorization: Bearer <token>`.
    /// If not set, /status endpoint is disabled (returns 403 Forbidden).
    pub status_auth_token: Option<String>,
    pub broadcast_concurrency: usize,
    pub delivery_timeout: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let bot_token = env::var("BOT_TOKEN")
            .context("BOT_TOKEN environment variable is required")?;

        let root_admin = env::var("ROOT_ADMIN_ID")
            .context("ROOT_ADMIN_ID environment variable is required")?
            .trim()
            .parse::<UserId>()
            .context("ROOT_ADMIN_ID must be a valid Telegram user id")?;

        let reward_link = env::var("REWARD_LINK")
            .context("REWARD_LINK environment variable is required")?;

        let bot_username = parse_optional(env::var("BOT_USERNAME").ok())
            .map(|name| name.trim_start_matches('@').to_string());

        let port = env::var("PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse::<u16>()
            .context("PORT must be a valid number")?;

        let state_dir = env::var("STATE_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("."));

        let webhook_secret = parse_optional(env::var("WEBHOOK_SECRET").ok());
        let status_auth_token = parse_optional(env::var("STATUS_AUTH_TOKEN").ok());

        let broadcast_concurrency =
            parse_concurrency(env::var("BROADCAST_CONCURRENCY").ok())
                .context("BROADCAST_CONCURRENCY must be a valid number")?;

        let delivery_timeout = parse_timeout_secs(env::var("DELIVERY_TIMEOUT_SECS").ok())
            .context("DELIVERY_TIMEOUT_SECS must be a valid number of seconds")?;

        Ok(Config {
            bot_token,
            root_admin,
            reward_link,
            bot_username,
            port,
            state_dir,
            webhook_secret,
            status_auth_token,
            broadcast_concurrency,
            delivery_timeout,
        })
    }
}

/// Treat missing, empty and whitespace-only values alike as unset.
///
/// An empty secret or token would otherwise let unauthenticated requests in.
pub fn parse_optional(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.trim().is_empty())
}

/// Fan-out width for broadcasts. Never below 1.
pub fn parse_concurrency(value: Option<String>) -> Result<usize> {
    match parse_optional(value) {
        Some(raw) => Ok(raw.trim().parse::<usize>()?.max(1)),
        None => Ok(DEFAULT_CONCURRENCY),
    }
}

pub fn parse_timeout_secs(value: Option<String>) -> Result<Duration> {
    match parse_optional(value) {
        Some(raw) => Ok(Duration::from_secs(raw.trim().parse::<u64>()?)),
        None => Ok(DEFAULT_DELIVERY_TIMEOUT),
    }
}
