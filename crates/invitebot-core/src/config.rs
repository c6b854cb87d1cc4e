use std::{env, time::Duration};

use crate::{domain::StreamChannel, errors::Error, streaming::ReconnectPolicy, Result};

/// Postgres connection settings. `url` wins over the individual parts.
#[derive(Clone)]
pub struct DatabaseConfig {
    pub url: Option<String>,
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub database: String,
    pub max_connections: u32,
}

/// Typed configuration for the bot daemon.
#[derive(Clone)]
pub struct Config {
    // Mastodon
    pub access_token: String,
    /// Base URL with scheme and without trailing slash.
    pub instance_url: String,
    pub stream_channel: StreamChannel,
    pub reconnect: ReconnectPolicy,
    pub http_timeout: Duration,

    // Ledger
    pub database: DatabaseConfig,
    pub invite_creator: String,
}

impl Config {
    /// Read `.env` (existing variables win), then the process environment.
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_env()
    }

    fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Parse configuration from any key/value source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| lookup(key).and_then(non_empty);

        // Required
        let access_token = get("ACCESS_TOKEN").ok_or_else(|| {
            Error::Config("ACCESS_TOKEN environment variable is required".to_string())
        })?;
        let instance = get("MASTODON_INSTANCE").ok_or_else(|| {
            Error::Config("MASTODON_INSTANCE environment variable is required".to_string())
        })?;
        let instance_url = normalize_instance_url(&instance);

        let stream_channel = match get("STREAM_CHANNEL") {
            Some(raw) => StreamChannel::parse(&raw).ok_or_else(|| {
                Error::Config(format!(
                    "STREAM_CHANNEL must be `user` or `public`, got `{raw}`"
                ))
            })?,
            None => StreamChannel::User,
        };

        let defaults = ReconnectPolicy::default();
        let reconnect = ReconnectPolicy {
            min_delay: parse_u64(&get, "RECONNECT_MIN_DELAY_MS")?
                .map(Duration::from_millis)
                .unwrap_or(defaults.min_delay),
            max_delay: parse_u64(&get, "RECONNECT_MAX_DELAY_MS")?
                .map(Duration::from_millis)
                .unwrap_or(defaults.max_delay),
        };
        let http_timeout =
            Duration::from_millis(parse_u64(&get, "HTTP_TIMEOUT_MS")?.unwrap_or(10_000));

        let database = DatabaseConfig {
            url: get("DATABASE_URL"),
            host: get("POSTGRES_SERVICE_HOST").unwrap_or_else(|| "localhost".to_string()),
            port: match get("POSTGRES_SERVICE_PORT") {
                Some(raw) => raw.trim().parse::<u16>().map_err(|_| {
                    Error::Config(format!("POSTGRES_SERVICE_PORT is not a port: `{raw}`"))
                })?,
                None => 5432,
            },
            user: get("POSTGRES_USER").unwrap_or_else(|| "postgres".to_string()),
            password: get("POSTGRES_PASSWORD").unwrap_or_default(),
            database: get("POSTGRES_DB").unwrap_or_else(|| "postgres".to_string()),
            max_connections: parse_u64(&get, "POSTGRES_MAX_CONNECTIONS")?
                .map(|n| n.clamp(1, u32::MAX as u64) as u32)
                .unwrap_or(5),
        };

        let invite_creator = get("INVITE_CREATOR").unwrap_or_else(|| "invitebot".to_string());

        Ok(Self {
            access_token,
            instance_url,
            stream_channel,
            reconnect,
            http_timeout,
            database,
            invite_creator,
        })
    }
}

fn normalize_instance_url(raw: &str) -> String {
    let trimmed = raw.trim().trim_end_matches('/');
    if trimmed.starts_with("https://") || trimmed.starts_with("http://") {
        trimmed.to_string()
    } else {
        format!("https://{trimmed}")
    }
}

fn parse_u64(get: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<u64>> {
    get(key)
        .map(|raw| {
            raw.trim()
                .parse::<u64>()
                .map_err(|_| Error::Config(format!("{key} must be a number, got `{raw}`")))
        })
        .transpose()
}

fn non_empty(s: String) -> Option<String> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s)
    }
}
