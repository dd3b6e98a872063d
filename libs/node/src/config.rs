use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BrokerKind {
    /// One in-process broker per vhost
    #[default]
    Memory,
    /// AMQP broker, one connection per vhost URL
    Amqp,
}

impl FromStr for BrokerKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(Self::Memory),
            "amqp" => Ok(Self::Amqp),
            other => Err(Error::configuration(format!(
                "unknown broker {other:?}, expected \"memory\" or \"amqp\""
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl FromStr for LogFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(Error::configuration(format!(
                "unknown log format {other:?}, expected \"pretty\" or \"json\""
            ))),
        }
    }
}

/// Process configuration.
///
/// Read from `WARREN_*` environment variables; see [`AppConfig::from_lookup`]
/// for the full list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub service_name: String,
    pub broker: BrokerKind,
    /// AMQP URI of the "work" vhost
    pub work_url: Option<String>,
    /// AMQP URI of the "home" vhost
    pub home_url: Option<String>,
    /// JSON topology file replacing the built-in topology
    pub topology_path: Option<PathBuf>,
    /// Pause before the worker resubscribes a cancelled consumer
    pub resubscribe_delay: Duration,
    pub connect_timeout: Duration,
    pub log_format: LogFormat,
    /// Base URL of the downstream user directory
    pub directory_url: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            service_name: "warren".to_string(),
            broker: BrokerKind::Memory,
            work_url: None,
            home_url: None,
            topology_path: None,
            resubscribe_delay: Duration::from_millis(1_000),
            connect_timeout: Duration::from_millis(10_000),
            log_format: LogFormat::Pretty,
            directory_url: None,
        }
    }
}

impl AppConfig {
    /// Load from the process environment
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from any key lookup.
    ///
    /// | key | default |
    /// |---|---|
    /// | `WARREN_SERVICE_NAME` | `warren` |
    /// | `WARREN_BROKER` | `memory` |
    /// | `WARREN_WORK_URL`, `WARREN_HOME_URL` | required for `amqp` |
    /// | `WARREN_TOPOLOGY_PATH` | built-in topology |
    /// | `WARREN_RESUBSCRIBE_DELAY_MS` | `1000` |
    /// | `WARREN_CONNECT_TIMEOUT_MS` | `10000` |
    /// | `WARREN_LOG_FORMAT` | `pretty` |
    /// | `WARREN_DIRECTORY_URL` | unset |
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let config = Self {
            service_name: get("WARREN_SERVICE_NAME").unwrap_or(defaults.service_name),
            broker: get("WARREN_BROKER")
                .map(|v| v.parse::<BrokerKind>())
                .transpose()?
                .unwrap_or(defaults.broker),
            work_url: get("WARREN_WORK_URL"),
            home_url: get("WARREN_HOME_URL"),
            topology_path: get("WARREN_TOPOLOGY_PATH").map(PathBuf::from),
            resubscribe_delay: get("WARREN_RESUBSCRIBE_DELAY_MS")
                .map(|v| parse_millis("WARREN_RESUBSCRIBE_DELAY_MS", &v))
                .transpose()?
                .unwrap_or(defaults.resubscribe_delay),
            connect_timeout: get("WARREN_CONNECT_TIMEOUT_MS")
                .map(|v| parse_millis("WARREN_CONNECT_TIMEOUT_MS", &v))
                .transpose()?
                .unwrap_or(defaults.connect_timeout),
            log_format: get("WARREN_LOG_FORMAT")
                .map(|v| v.parse::<LogFormat>())
                .transpose()?
                .unwrap_or(defaults.log_format),
            directory_url: get("WARREN_DIRECTORY_URL"),
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.broker == BrokerKind::Amqp {
            if self.work_url.is_none() {
                return Err(Error::configuration("WARREN_WORK_URL is required for the amqp broker"));
            }
            if self.home_url.is_none() {
                return Err(Error::configuration("WARREN_HOME_URL is required for the amqp broker"));
            }
        }
        Ok(())
    }
}

fn parse_millis(key: &str, value: &str) -> Result<Duration> {
    value
        .trim()
        .parse::<u64>()
        .map(Duration::from_millis)
        .map_err(|e| {
            Error::configuration(format!(
                "{key}: {value:?} is not a number of milliseconds: {e}"
            ))
        })
}
