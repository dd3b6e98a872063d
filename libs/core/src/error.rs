use std::any::Any;
use std::borrow::Cow;
use std::error::Error as StdError;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Stable failure codes shared by every layer.
///
/// A code is the only key metrics and alerting dispatch on, so these strings
/// must never change once released.
pub mod codes {
    pub const VALIDATION: &str = "VALIDATION";
    pub const INTEGRATION: &str = "INTEGRATION";
    pub const CONFIGURATION: &str = "CONFIGURATION";
    pub const PUBLISH: &str = "PUBLISH";
    pub const CHANNEL_CLOSED: &str = "CHANNEL_CLOSED";
    pub const CODEC: &str = "CODEC";
    pub const BROKER: &str = "BROKER";
    pub const IO: &str = "IO";
    pub const NOT_FOUND: &str = "NOT_FOUND";
    pub const UNEXPECTED: &str = "UNEXPECTED";
}

/// A failure that carries a stable code
pub trait Coded: StdError {
    /// Stable short identifier of the failure class
    fn code(&self) -> &str;

    /// Snapshot this failure as a plain [`CodedError`]
    fn to_coded(&self) -> CodedError {
        CodedError::new(self.code().to_owned(), self.to_string())
    }
}

/// Base coded failure value: a code and a human-readable message.
///
/// Immutable once built. Concrete failure classes are expressed by the code,
/// not by extra behavior.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[error("{code}: {message}")]
pub struct CodedError {
    code: Cow<'static, str>,
    message: String,
}

impl CodedError {
    pub fn new(code: impl Into<Cow<'static, str>>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(codes::VALIDATION, message)
    }

    pub fn integration(message: impl Into<String>) -> Self {
        Self::new(codes::INTEGRATION, message)
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::new(codes::CONFIGURATION, message)
    }

    pub fn publish(message: impl Into<String>) -> Self {
        Self::new(codes::PUBLISH, message)
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl Coded for CodedError {
    fn code(&self) -> &str {
        &self.code
    }

    fn to_coded(&self) -> CodedError {
        self.clone()
    }
}

/// How a caught failure is treated for observability
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureClass {
    /// A recognized failure class, keyed by its code
    Expected(String),
    /// Anything without a recognized code, including panics
    Unexpected,
}

impl FailureClass {
    /// Classify a raw code. `UNEXPECTED` is never an expected class.
    pub fn from_code(code: &str) -> Self {
        if code.is_empty() || code == codes::UNEXPECTED {
            Self::Unexpected
        } else {
            Self::Expected(code.to_owned())
        }
    }

    pub fn is_unexpected(&self) -> bool {
        matches!(self, Self::Unexpected)
    }

    pub fn code(&self) -> &str {
        match self {
            Self::Expected(code) => code,
            Self::Unexpected => codes::UNEXPECTED,
        }
    }
}

/// Failure raised by a message handler.
///
/// Any [`Coded`] error converts into this with `?`. Foreign errors go through
/// [`HandlerError::unexpected`].
#[derive(Debug)]
pub enum HandlerError {
    Coded(CodedError),
    Unexpected(Box<dyn StdError + Send + Sync>),
    Panicked(String),
}

impl HandlerError {
    pub fn unexpected(err: impl Into<Box<dyn StdError + Send + Sync>>) -> Self {
        Self::Unexpected(err.into())
    }

    /// Build from a panic payload caught around a handler
    pub fn panicked(payload: Box<dyn Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_owned()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "non-string panic payload".to_owned()
        };
        Self::Panicked(message)
    }

    pub fn class(&self) -> FailureClass {
        match self {
            Self::Coded(e) => FailureClass::from_code(e.code()),
            Self::Unexpected(_) | Self::Panicked(_) => FailureClass::Unexpected,
        }
    }

    pub fn code(&self) -> &str {
        match self {
            Self::Coded(e) if !e.code().is_empty() => e.code(),
            _ => codes::UNEXPECTED,
        }
    }
}

impl fmt::Display for HandlerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Coded(e) => write!(f, "{e}"),
            Self::Unexpected(e) => write!(f, "unexpected failure: {e}"),
            Self::Panicked(msg) => write!(f, "handler panicked: {msg}"),
        }
    }
}

impl StdError for HandlerError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            Self::Coded(e) => Some(e),
            Self::Unexpected(e) => Some(e.as_ref()),
            Self::Panicked(_) => None,
        }
    }
}

impl<E> From<E> for HandlerError
where
    E: Coded + Send + Sync + 'static,
{
    fn from(err: E) -> Self {
        Self::Coded(err.to_coded())
    }
}
