use thiserror::Error;
use warren_core::{codes, Coded};

#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Integration failed: {0}")]
    Integration(String),

    #[error("User {0} not found")]
    UserNotFound(u64),

    #[error(transparent)]
    Fabric(#[from] warren_fabric::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn integration(msg: impl Into<String>) -> Self {
        Self::Integration(msg.into())
    }
}

impl Coded for Error {
    fn code(&self) -> &str {
        match self {
            Self::Configuration(_) => codes::CONFIGURATION,
            Self::Validation(_) => codes::VALIDATION,
            Self::Integration(_) => codes::INTEGRATION,
            Self::UserNotFound(_) => codes::NOT_FOUND,
            Self::Fabric(e) => e.code(),
            Self::Io(_) => codes::IO,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
