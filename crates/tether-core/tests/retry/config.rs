use std::sync::Arc;
use std::time::Duration;

use tether_core::{MockClock, RetryConfig, Status, TetherError};

const DETERMINISTIC: &str = r#"
max_failures = 3
initial_backoff = 50
max_backoff = 400
backoff_multiplier = 2.0
jitter = false
"#;

#[test]
fn toml_config_drives_backoff_sequence() {
    let config = RetryConfig::from_toml_str(DETERMINISTIC).expect("valid config");
    assert_eq!(config.max_failures, 3);
    assert_eq!(config.initial_backoff, Duration::from_millis(50));

    let mut backoff = config.backoff_policy();
    let delays: Vec<u64> = (0..5)
        .map(|_| u64::try_from(backoff.on_completion().as_millis()).unwrap_or(u64::MAX))
        .collect();
    assert_eq!(delays, vec![50, 100, 200, 400, 400]);

    let mut retry = config.retry_policy(Arc::new(MockClock::new()));
    let unavailable = Status::unavailable("x");
    assert!(retry.on_failure(&unavailable));
    assert!(retry.on_failure(&unavailable));
    assert!(retry.on_failure(&unavailable));
    assert!(!retry.on_failure(&unavailable));
}

#[test]
fn max_duration_selects_time_window_policy() {
    let clock = MockClock::new();
    let config = RetryConfig::from_toml_str("max_duration = 1000").expect("valid config");
    let mut retry = config.retry_policy(Arc::new(clock.clone()));
    let unavailable = Status::unavailable("x");
    for _ in 0..20 {
        assert!(retry.on_failure(&unavailable));
    }
    clock.advance(Duration::from_millis(1001));
    assert!(!retry.on_failure(&unavailable));
    assert!(retry.is_exhausted());
}

#[test]
fn missing_fields_take_defaults() {
    let config = RetryConfig::from_toml_str("").expect("empty config is valid");
    assert_eq!(config, RetryConfig::default());
}

#[test]
fn unknown_fields_are_rejected() {
    let err = RetryConfig::from_toml_str("max_retries = 3").expect_err("unknown key");
    assert!(matches!(err, TetherError::ConfigParse(_)));
}

#[test]
fn shrinking_multiplier_is_rejected() {
    let err = RetryConfig::from_toml_str("backoff_multiplier = 0.5").expect_err("invalid");
    assert!(matches!(
        err,
        TetherError::InvalidConfig {
            field: "backoff_multiplier",
            ..
        }
    ));
}
