use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use warren_core::{codes, Coded};
use warren_node::{AppConfig, BrokerKind, Error, LogFormat};

fn config(vars: &[(&str, &str)]) -> warren_node::Result<AppConfig> {
    let vars: HashMap<String, String> = vars
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    AppConfig::from_lookup(|key| vars.get(key).cloned())
}

#[test]
fn defaults_without_any_variables() {
    let config = config(&[]).unwrap();

    assert_eq!(config, AppConfig::default());
    assert_eq!(config.broker, BrokerKind::Memory);
    assert_eq!(config.resubscribe_delay, Duration::from_secs(1));
    assert_eq!(config.log_format, LogFormat::Pretty);
}

#[test]
fn reads_every_variable() {
    let config = config(&[
        ("WARREN_SERVICE_NAME", "users"),
        ("WARREN_BROKER", "AMQP"),
        ("WARREN_WORK_URL", "amqp://localhost/work"),
        ("WARREN_HOME_URL", "amqp://localhost/home"),
        ("WARREN_TOPOLOGY_PATH", "/etc/warren/topology.json"),
        ("WARREN_RESUBSCRIBE_DELAY_MS", "250"),
        ("WARREN_CONNECT_TIMEOUT_MS", "3000"),
        ("WARREN_LOG_FORMAT", "json"),
        ("WARREN_DIRECTORY_URL", "https://directory.internal"),
    ])
    .unwrap();

    assert_eq!(config.service_name, "users");
    assert_eq!(config.broker, BrokerKind::Amqp);
    assert_eq!(config.work_url.as_deref(), Some("amqp://localhost/work"));
    assert_eq!(config.topology_path, Some(PathBuf::from("/etc/warren/topology.json")));
    assert_eq!(config.resubscribe_delay, Duration::from_millis(250));
    assert_eq!(config.connect_timeout, Duration::from_secs(3));
    assert_eq!(config.log_format, LogFormat::Json);
    assert_eq!(config.directory_url.as_deref(), Some("https://directory.internal"));
}

#[test]
fn blank_values_fall_back_to_defaults() {
    let config = config(&[("WARREN_SERVICE_NAME", "  "), ("WARREN_BROKER", "")]).unwrap();

    assert_eq!(config.service_name, "warren");
    assert_eq!(config.broker, BrokerKind::Memory);
}

#[test]
fn amqp_requires_both_urls() {
    let err = config(&[("WARREN_BROKER", "amqp"), ("WARREN_WORK_URL", "amqp://localhost/work")])
        .unwrap_err();

    assert!(matches!(err, Error::Configuration(ref msg) if msg.contains("WARREN_HOME_URL")));
    assert_eq!(err.code(), codes::CONFIGURATION);
}

#[test]
fn invalid_values_are_configuration_errors() {
    for vars in [
        [("WARREN_BROKER", "kafka")],
        [("WARREN_LOG_FORMAT", "xml")],
        [("WARREN_RESUBSCRIBE_DELAY_MS", "soon")],
    ] {
        let err = config(&vars).unwrap_err();
        assert_eq!(err.code(), codes::CONFIGURATION, "{vars:?}");
    }
}
