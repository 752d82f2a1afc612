//! Process configuration, read once at startup.
//!
//! Values come from the environment after an optional `.env` file is loaded.
//! Empty variables count as unset.

use std::time::Duration;

use thiserror::Error;

use authreplica_auth::{LoginPolicy, TokenLifetimes};
use authreplica_events::USER_EVENTS_TOPIC;

pub const DEV_JWT_SECRET: &str = "dev-secret";

const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 8080;
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_millis(5000);
const DEFAULT_MAX_CONNECTIONS: u32 = 10;
const DEFAULT_CONSUMER_GROUP: &str = "auth-service";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value for {key}: '{value}'")]
    Invalid { key: &'static str, value: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub jwt_secret: String,
    /// `JWT_SECRET` was unset and the dev default is in use.
    pub jwt_secret_is_default: bool,
    pub token_lifetimes: TokenLifetimes,
    pub login_policy: LoginPolicy,
    pub request_timeout: Duration,
    /// Unset means the in-memory store.
    pub database: Option<DatabaseConfig>,
    /// Unset means the in-memory bus.
    pub redis_url: Option<String>,
    pub events_topic: String,
    pub consumer_group: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            jwt_secret: DEV_JWT_SECRET.to_string(),
            jwt_secret_is_default: true,
            token_lifetimes: TokenLifetimes::default(),
            login_policy: LoginPolicy::default(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            database: None,
            redis_url: None,
            events_topic: USER_EVENTS_TOPIC.to_string(),
            consumer_group: DEFAULT_CONSUMER_GROUP.to_string(),
        }
    }
}

impl AppConfig {
    /// Load `.env` (if present) and read the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let defaults = Self::default();

        let (jwt_secret, jwt_secret_is_default) = match get("JWT_SECRET") {
            Some(secret) => (secret, false),
            None => (defaults.jwt_secret.clone(), true),
        };

        let token_lifetimes = TokenLifetimes {
            access: secs(&get, "ACCESS_TOKEN_TTL_SECS")?.unwrap_or(defaults.token_lifetimes.access),
            refresh: secs(&get, "REFRESH_TOKEN_TTL_SECS")?.unwrap_or(defaults.token_lifetimes.refresh),
        };

        let request_timeout = match parse::<u64>(&get, "REQUEST_TIMEOUT_MS")? {
            Some(0) => return Err(invalid("REQUEST_TIMEOUT_MS", "0")),
            Some(ms) => Duration::from_millis(ms),
            None => defaults.request_timeout,
        };

        let database = match get("DATABASE_URL") {
            Some(url) => Some(DatabaseConfig {
                url,
                max_connections: parse(&get, "DATABASE_MAX_CONNECTIONS")?
                    .unwrap_or(DEFAULT_MAX_CONNECTIONS),
            }),
            None => None,
        };

        Ok(Self {
            host: get("SERVER_HOST").unwrap_or(defaults.host),
            port: parse(&get, "SERVER_PORT")?.unwrap_or(defaults.port),
            jwt_secret,
            jwt_secret_is_default,
            token_lifetimes,
            login_policy: LoginPolicy {
                reject_blocked: flag(&get, "AUTH_REJECT_BLOCKED")?.unwrap_or(false),
            },
            request_timeout,
            database,
            redis_url: get("REDIS_URL"),
            events_topic: get("USER_EVENTS_TOPIC").unwrap_or(defaults.events_topic),
            consumer_group: get("USER_AUTH_CONSUMER_GROUP").unwrap_or(defaults.consumer_group),
        })
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl core::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("AppConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("jwt_secret", &"<redacted>")
            .field("jwt_secret_is_default", &self.jwt_secret_is_default)
            .field("token_lifetimes", &self.token_lifetimes)
            .field("login_policy", &self.login_policy)
            .field("request_timeout", &self.request_timeout)
            .field("database", &self.database.as_ref().map(|_| "<configured>"))
            .field("redis_url", &self.redis_url.as_ref().map(|_| "<configured>"))
            .field("events_topic", &self.events_topic)
            .field("consumer_group", &self.consumer_group)
            .finish()
    }
}

fn invalid(key: &'static str, value: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        key,
        value: value.into(),
    }
}

fn parse<T>(get: &impl Fn(&str) -> Option<String>, key: &'static str) -> Result<Option<T>, ConfigError>
where
    T: core::str::FromStr,
{
    match get(key) {
        Some(raw) => raw.trim().parse().map(Some).map_err(|_| invalid(key, raw)),
        None => Ok(None),
    }
}

fn secs(get: &impl Fn(&str) -> Option<String>, key: &'static str) -> Result<Option<Duration>, ConfigError> {
    match parse::<u64>(get, key)? {
        Some(0) => Err(invalid(key, "0")),
        Some(s) => Ok(Some(Duration::from_secs(s))),
        None => Ok(None),
    }
}

fn flag(get: &impl Fn(&str) -> Option<String>, key: &'static str) -> Result<Option<bool>, ConfigError> {
    match get(key) {
        Some(raw) => match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(Some(true)),
            "0" | "false" | "no" | "off" => Ok(Some(false)),
            _ => Err(invalid(key, raw)),
        },
        None => Ok(None),
    }
}
