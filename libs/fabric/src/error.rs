use thiserror::Error;
use warren_core::{codes, Coded};

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Codec error: {0}")]
    Codec(String),

    #[error("Channel closed")]
    ChannelClosed,

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Publish to exchange {exchange:?} with routing key {routing_key:?} failed: {reason}")]
    Publish {
        exchange: String,
        routing_key: String,
        reason: String,
    },

    #[error("Broker error: {0}")]
    Broker(String),
}

impl Error {
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn publish(
        exchange: impl Into<String>,
        routing_key: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::Publish {
            exchange: exchange.into(),
            routing_key: routing_key.into(),
            reason: reason.into(),
        }
    }

    pub fn broker(msg: impl Into<String>) -> Self {
        Self::Broker(msg.into())
    }

    pub fn is_publish(&self) -> bool {
        matches!(self, Self::Publish { .. })
    }
}

impl Coded for Error {
    fn code(&self) -> &str {
        match self {
            Self::Io(_) => codes::IO,
            Self::Codec(_) => codes::CODEC,
            Self::ChannelClosed => codes::CHANNEL_CLOSED,
            Self::Configuration(_) => codes::CONFIGURATION,
            Self::Publish { .. } => codes::PUBLISH,
            Self::Broker(_) => codes::BROKER,
        }
    }
}

#[cfg(feature = "amqp")]
impl From<lapin::Error> for Error {
    fn from(err: lapin::Error) -> Self {
        match err {
            lapin::Error::InvalidChannelState(_) | lapin::Error::InvalidConnectionState(_) => {
                Self::ChannelClosed
            }
            other => Self::Broker(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
