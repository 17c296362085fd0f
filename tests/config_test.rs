use std::collections::HashMap;
use std::time::Duration;

use secrecy::ExposeSecret;
use taskpipe::config::{Config, StoreConfig};
use taskpipe::error::Error;

fn load(vars: &[(&str, &str)]) -> taskpipe::error::Result<Config> {
    let vars: HashMap<String, String> = vars
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    Config::from_lookup(|name| vars.get(name).cloned())
}

#[test]
fn empty_environment_uses_memory_store_without_queue() {
    let config = load(&[]).unwrap();
    assert!(matches!(config.store, StoreConfig::Memory));
    assert!(config.queue.is_none());
    assert_eq!(config.consumer.max_concurrent, 1);
    assert_eq!(config.consumer.process_timeout, None);
    assert_eq!(config.log_level, "info");
    assert!(config.model_config.is_none());
}

#[test]
fn redis_and_queue_settings_are_read() {
    let config = load(&[
        ("REDIS_URL", "cache.internal"),
        ("REDIS_PORT", "6380"),
        ("REDIS_SECURE", "true"),
        ("REDIS_PASSWORD", "hunter2"),
        ("DATABASE_URL", "postgres://u:p@localhost/db"),
        ("QUEUE_NAME", "incoming"),
        ("QUEUE_VISIBILITY_TIMEOUT", "30"),
        ("QUEUE_POLL_INTERVAL_MS", "250"),
        ("CONSUMER_MAX_CONCURRENT", "4"),
        ("PROCESS_TIMEOUT_SECS", "90"),
    ])
    .unwrap();

    let StoreConfig::Redis(redis) = &config.store else {
        panic!("expected redis store");
    };
    assert_eq!(redis.port, 6380);
    assert!(redis.secure);
    assert_eq!(
        redis.connection_url().expose_secret(),
        "rediss://:hunter2@cache.internal:6380"
    );

    let queue = config.queue.as_ref().unwrap();
    assert_eq!(queue.queue_name, "incoming");
    assert_eq!(queue.visibility_timeout, 30);
    assert_eq!(queue.poll_interval, Duration::from_millis(250));
    assert_eq!(config.consumer.max_concurrent, 4);
    assert_eq!(config.consumer.process_timeout, Some(Duration::from_secs(90)));
}

#[test]
fn blank_values_count_as_unset() {
    let config = load(&[("REDIS_URL", "  "), ("DATABASE_URL", "")]).unwrap();
    assert!(matches!(config.store, StoreConfig::Memory));
    assert!(config.queue.is_none());
}

#[test]
fn malformed_values_are_config_errors() {
    for vars in [
        [("REDIS_URL", "localhost"), ("REDIS_PORT", "sixty")],
        [("REDIS_URL", "localhost"), ("REDIS_SECURE", "maybe")],
        [("LOG_LEVEL", "debug"), ("CONSUMER_MAX_CONCURRENT", "0")],
        [("LOG_LEVEL", "debug"), ("PROCESS_TIMEOUT_SECS", "-1")],
    ] {
        assert!(matches!(load(&vars), Err(Error::Config(_))), "{vars:?}");
    }
}

#[test]
fn full_redis_url_conflicts_are_rejected() {
    for vars in [
        [("REDIS_URL", "redis://cache.internal:6379"), ("REDIS_SECURE", "true")],
        [("REDIS_URL", "redis://cache.internal:6379"), ("REDIS_PORT", "6380")],
        [("REDIS_URL", "rediss://cache.internal:6379"), ("REDIS_PASSWORD", "hunter2")],
    ] {
        assert!(matches!(load(&vars), Err(Error::Config(_))), "{vars:?}");
    }

    let config = load(&[
        ("REDIS_URL", "rediss://:hunter2@cache.internal:6380"),
        ("REDIS_SECURE", "true"),
    ])
    .unwrap();
    let StoreConfig::Redis(redis) = &config.store else {
        panic!("expected redis store");
    };
    assert_eq!(
        redis.connection_url().expose_secret(),
        "rediss://:hunter2@cache.internal:6380"
    );
}
