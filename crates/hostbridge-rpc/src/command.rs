use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::protocol::{ErrorCode, ErrorObject};

/// A named operation that runs on the host thread.
///
/// `C` is the host context: the object through which the host's API is
/// reachable. It is only ever borrowed on the host thread, so it need not
/// be `Send`.
///
/// Closures of the form `Fn(&mut C, Value) -> Result<Value, CommandError>`
/// implement this trait.
pub trait CommandHandler<C>: Send + Sync {
    /// Run the command with the request's params (always a JSON object).
    fn execute(&self, host: &mut C, params: Value) -> Result<Value, CommandError>;
}

impl<C, F> CommandHandler<C> for F
where
    F: Fn(&mut C, Value) -> Result<Value, CommandError> + Send + Sync,
{
    fn execute(&self, host: &mut C, params: Value) -> Result<Value, CommandError> {
        self(host, params)
    }
}

/// Failure of a command handler.
#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    /// A failure the handler classified itself, reported with its own code.
    #[error("{message}")]
    Domain {
        code: i64,
        message: String,
        data: Option<Value>,
    },

    /// The params did not have the shape the handler needs.
    #[error("invalid params: {0}")]
    InvalidParams(String),

    /// Any other failure. Reported as an internal error carrying the
    /// innermost cause.
    #[error(transparent)]
    Failed(Box<dyn std::error::Error + Send + Sync>),
}

impl CommandError {
    /// A failure with an explicit error code.
    pub fn domain(code: i64, message: impl Into<String>) -> Self {
        Self::Domain {
            code,
            message: message.into(),
            data: None,
        }
    }

    /// A failure with an explicit error code and structured data.
    pub fn domain_with_data(code: i64, message: impl Into<String>, data: Value) -> Self {
        Self::Domain {
            code,
            message: message.into(),
            data: Some(data),
        }
    }

    /// The addressed element or resource does not exist.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::domain(ErrorCode::NOT_FOUND, message)
    }

    /// Params were rejected by the handler.
    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::InvalidParams(message.into())
    }

    /// Wrap an arbitrary error.
    pub fn failed(err: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self::Failed(err.into())
    }

    /// Convert to the wire error object.
    pub fn to_error_object(&self) -> ErrorObject {
        match self {
            Self::Domain {
                code,
                message,
                data,
            } => ErrorObject {
                code: *code,
                message: message.clone(),
                data: data.clone(),
            },
            Self::InvalidParams(message) => ErrorObject::invalid_params(message.clone()),
            Self::Failed(err) => ErrorObject::internal_error(root_cause(err.as_ref())),
        }
    }
}

impl From<serde_json::Error> for CommandError {
    fn from(err: serde_json::Error) -> Self {
        Self::InvalidParams(err.to_string())
    }
}

/// Deserialize a handler's params into a typed struct.
///
/// Shape mismatches become [`CommandError::InvalidParams`].
pub fn parse_params<T: DeserializeOwned>(params: Value) -> Result<T, CommandError> {
    Ok(serde_json::from_value(params)?)
}

/// Message of the innermost error in a `source()` chain.
fn root_cause(err: &(dyn std::error::Error + 'static)) -> String {
    let mut current = err;
    while let Some(source) = current.source() {
        current = source;
    }
    current.to_string()
}
