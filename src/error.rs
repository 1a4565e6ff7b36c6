//! Error types.

use thiserror::Error;

/// Errors produced while decoding peer messages or setting up a simulation.
#[derive(Debug, Error)]
pub enum Error {
    /// A serialised vehicle snapshot lacks one of its keys.
    #[error("missing field `{0}` in vehicle attributes")]
    MissingField(&'static str),

    /// A numeric field or lane index could not be parsed.
    #[error("invalid value {value:?} for `{field}`")]
    InvalidValue { field: String, value: String },

    /// The payload names an action other than `Get`, `Response` or `Command`.
    #[error("unknown message action {0:?}")]
    UnknownAction(String),

    /// The payload is not of the form `<Action>/<Content>`.
    #[error("malformed message payload {0:?}")]
    MalformedPayload(String),

    /// The configuration is internally inconsistent.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Creates an invalid value error.
    pub fn invalid(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self::InvalidValue {
            field: field.into(),
            value: value.into(),
        }
    }
}

/// Result type used throughout the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;
