//! Warren Core - failure taxonomy shared by every warren crate
//!
//! Failures carry a stable code (see [`codes`]) so that any layer can
//! classify them without depending on their concrete type.

pub mod error;

pub use error::{codes, Coded, CodedError, FailureClass, HandlerError};
