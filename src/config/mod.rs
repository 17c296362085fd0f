//! Typed configuration from environment variables.
//!
//! Loads once at startup, fails fast on malformed values.
//! Sensitive values wrapped in secrecy::SecretString to prevent log leaks.

use std::path::PathBuf;
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};

use crate::consumer::ConsumerConfig;
use crate::error::{Error, Result};

/// Default Redis port when `REDIS_PORT` is unset.
pub const DEFAULT_REDIS_PORT: u16 = 6379;

#[derive(Debug)]
pub struct Config {
    pub store: StoreConfig,
    /// `None` disables the queue consumer.
    pub queue: Option<QueueConfig>,
    pub consumer: ConsumerConfig,
    /// Model definition file. `None` uses the built-in default model.
    pub model_config: Option<PathBuf>,
    pub otel_endpoint: Option<String>,
    pub log_level: String,
}

/// Which status store backend to use.
#[derive(Debug)]
pub enum StoreConfig {
    /// Process-local store. Nothing survives a restart.
    Memory,
    Redis(RedisConfig),
}

#[derive(Debug)]
pub struct RedisConfig {
    /// Bare host name, or a full `redis://` / `rediss://` URL used verbatim.
    pub url: String,
    pub port: u16,
    /// Connect over TLS.
    pub secure: bool,
    pub password: Option<SecretString>,
    /// PEM bundle used as the TLS root instead of the webpki roots.
    pub ca_file: Option<PathBuf>,
}

impl RedisConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            port: DEFAULT_REDIS_PORT,
            secure: false,
            password: None,
            ca_file: None,
        }
    }

    /// Whether `url` is a complete `redis://` / `rediss://` URL.
    pub fn is_full_url(&self) -> bool {
        self.url.starts_with("redis://") || self.url.starts_with("rediss://")
    }

    /// Reject settings a full URL would silently override.
    pub fn validate(&self) -> Result<()> {
        if !self.is_full_url() {
            return Ok(());
        }
        if self.secure && self.url.starts_with("redis://") {
            return Err(Error::Config(
                "REDIS_SECURE is set but REDIS_URL uses plaintext redis://; use rediss://".to_string(),
            ));
        }
        if self.password.is_some() {
            return Err(Error::Config(
                "REDIS_PASSWORD cannot be combined with a full REDIS_URL; put it in the URL".to_string(),
            ));
        }
        Ok(())
    }

    /// Connection URL for the redis client. Contains the password, hence
    /// the secret wrapper.
    pub fn connection_url(&self) -> SecretString {
        if self.is_full_url() {
            return SecretString::from(self.url.clone());
        }

        let scheme = if self.secure { "rediss" } else { "redis" };
        let auth = match self.password {
            Some(ref password) => format!(":{}@", urlencoding::encode(password.expose_secret())),
            None => String::new(),
        };
        SecretString::from(format!("{scheme}://{auth}{}:{}", self.url, self.port))
    }
}

#[derive(Debug)]
pub struct QueueConfig {
    pub database_url: SecretString,
    pub queue_name: String,
    /// Seconds a read message stays invisible to other readers.
    pub visibility_timeout: i32,
    /// Sleep between reads while the queue is empty.
    pub poll_interval: Duration,
}

impl QueueConfig {
    pub fn new(database_url: impl Into<String>) -> Self {
        Self {
            database_url: SecretString::from(database_url.into()),
            queue_name: "tasks".to_string(),
            visibility_timeout: 60,
            poll_interval: Duration::from_millis(1000),
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// In local dev, call `dotenvy::dotenv().ok()` before this.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let store = match var("REDIS_URL") {
            Some(url) => {
                let port = parse_var(&var, "REDIS_PORT")?;
                let redis = RedisConfig {
                    url,
                    port: port.unwrap_or(DEFAULT_REDIS_PORT),
                    secure: parse_bool(&var, "REDIS_SECURE")?.unwrap_or(false),
                    password: var("REDIS_PASSWORD").map(SecretString::from),
                    ca_file: var("REDIS_CA_FILE").map(PathBuf::from),
                };
                if port.is_some() && redis.is_full_url() {
                    return Err(Error::Config(
                        "REDIS_PORT cannot be combined with a full REDIS_URL; put it in the URL"
                            .to_string(),
                    ));
                }
                redis.validate()?;
                StoreConfig::Redis(redis)
            }
            None => StoreConfig::Memory,
        };

        let queue = match var("DATABASE_URL") {
            Some(url) => {
                let mut queue = QueueConfig::new(url);
                if let Some(name) = var("QUEUE_NAME") {
                    queue.queue_name = name;
                }
                if let Some(vt) = parse_var(&var, "QUEUE_VISIBILITY_TIMEOUT")? {
                    queue.visibility_timeout = vt;
                }
                if let Some(ms) = parse_var::<u64, _>(&var, "QUEUE_POLL_INTERVAL_MS")? {
                    queue.poll_interval = Duration::from_millis(ms);
                }
                Some(queue)
            }
            None => None,
        };

        let mut consumer = ConsumerConfig::default();
        if let Some(n) = parse_var::<usize, _>(&var, "CONSUMER_MAX_CONCURRENT")? {
            if n == 0 {
                return Err(Error::Config(
                    "CONSUMER_MAX_CONCURRENT must be at least 1".to_string(),
                ));
            }
            consumer.max_concurrent = n;
        }
        consumer.process_timeout =
            parse_var::<u64, _>(&var, "PROCESS_TIMEOUT_SECS")?.map(Duration::from_secs);

        Ok(Self {
            store,
            queue,
            consumer,
            model_config: var("MODEL_CONFIG").map(PathBuf::from),
            otel_endpoint: var("OTEL_ENDPOINT"),
            log_level: var("LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
        })
    }
}

fn parse_var<T, F>(var: &F, name: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    var(name)
        .map(|raw| {
            raw.trim()
                .parse()
                .map_err(|e| Error::Config(format!("invalid value for {name}: {raw:?} ({e})")))
        })
        .transpose()
}

fn parse_bool<F>(var: &F, name: &str) -> Result<Option<bool>>
where
    F: Fn(&str) -> Option<String>,
{
    var(name)
        .map(|raw| match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" => Ok(true),
            "0" | "false" | "no" => Ok(false),
            _ => Err(Error::Config(format!(
                "invalid value for {name}: {raw:?} (expected true/false)"
            ))),
        })
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_host_builds_url_with_port_and_password() {
        let config = RedisConfig {
            url: "cache.internal".to_string(),
            port: 6380,
            secure: true,
            password: Some(SecretString::from("p@ss/word")),
            ca_file: None,
        };
        assert_eq!(
            config.connection_url().expose_secret(),
            "rediss://:p%40ss%2Fword@cache.internal:6380"
        );
    }

    #[test]
    fn full_url_rejects_settings_it_would_override() {
        let mut config = RedisConfig::new("redis://cache.internal:6379");
        config.secure = true;
        assert!(matches!(config.validate(), Err(Error::Config(_))));

        let mut config = RedisConfig::new("rediss://cache.internal:6379");
        config.secure = true;
        assert!(config.validate().is_ok());
        config.password = Some(SecretString::from("hunter2"));
        assert!(matches!(config.validate(), Err(Error::Config(_))));

        let mut config = RedisConfig::new("cache.internal");
        config.secure = true;
        config.password = Some(SecretString::from("hunter2"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn full_url_is_used_verbatim() {
        let mut config = RedisConfig::new("redis://localhost:6379/2");
        config.port = 1;
        assert_eq!(
            config.connection_url().expose_secret(),
            "redis://localhost:6379/2"
        );
    }
}
