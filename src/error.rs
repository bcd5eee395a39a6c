/// Errors raised by the binding layer and the invocation contexts.
///
/// # Classification
///
/// - `Configuration`: the function cannot be bound as declared (unsupported
///   parameter type, unclaimed descriptor, duplicate registration, invalid
///   options). Permanent; retrying will not help.
/// - `Argument`: malformed input (too many activity parameters, a JSON token
///   of the wrong shape, a missing callback).
/// - `InvalidOperation`: the shim or a context was used out of contract
///   (output set twice, callback registered twice, `execute` before a callback).
/// - `NotImplemented`: a slot was used in a direction it does not support.
/// - `Serialization`: a value could not be encoded or decoded as JSON.
///
/// None of these mutate shared state; bindings and registries stay valid for
/// the next invocation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    #[error("configuration error: {message}")]
    Configuration { message: String },

    #[error("argument error{}: {message}", .parameter.as_ref().map(|p| format!(" ({p})")).unwrap_or_default())]
    Argument { parameter: Option<String>, message: String },

    #[error("invalid operation: {message}")]
    InvalidOperation { message: String },

    #[error("not implemented: {message}")]
    NotImplemented { message: String },

    #[error("serialization error: {message}")]
    Serialization { message: String },
}

impl Error {
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration { message: message.into() }
    }

    pub fn argument(message: impl Into<String>) -> Self {
        Self::Argument {
            parameter: None,
            message: message.into(),
        }
    }

    /// Argument error attributed to a named parameter.
    pub fn argument_for(parameter: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Argument {
            parameter: Some(parameter.into()),
            message: message.into(),
        }
    }

    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Self::InvalidOperation { message: message.into() }
    }

    pub fn not_implemented(message: impl Into<String>) -> Self {
        Self::NotImplemented { message: message.into() }
    }

    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization { message: message.into() }
    }

    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration { .. })
    }

    pub fn is_argument(&self) -> bool {
        matches!(self, Self::Argument { .. })
    }

    pub fn is_invalid_operation(&self) -> bool {
        matches!(self, Self::InvalidOperation { .. })
    }

    pub fn is_serialization(&self) -> bool {
        matches!(self, Self::Serialization { .. })
    }

    /// Configuration errors are permanent; the rest fail only the current invocation.
    pub fn is_permanent(&self) -> bool {
        self.is_configuration()
    }
}

/// Outcome of a failed `execute` pass or activity run.
#[derive(Debug, thiserror::Error)]
pub enum ExecuteError {
    /// The shim, binding or context rejected the call.
    #[error(transparent)]
    Invocation(#[from] Error),

    /// The user function failed; the error is returned exactly as the body produced it.
    #[error("{0:#}")]
    Function(anyhow::Error),
}

impl ExecuteError {
    /// The contract error, if this is not a user-function failure.
    pub fn as_invocation(&self) -> Option<&Error> {
        match self {
            Self::Invocation(e) => Some(e),
            Self::Function(_) => None,
        }
    }

    /// The user function's own error, if this is a function failure.
    pub fn as_function(&self) -> Option<&anyhow::Error> {
        match self {
            Self::Function(e) => Some(e),
            Self::Invocation(_) => None,
        }
    }

    pub fn into_function(self) -> Option<anyhow::Error> {
        match self {
            Self::Function(e) => Some(e),
            Self::Invocation(_) => None,
        }
    }
}
