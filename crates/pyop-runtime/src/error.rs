use thiserror::Error;

use pyop_core::TensorError;

/// Failure to resolve a `(module, symbol)` pair to something callable.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BindError {
    #[error("module '{module}' could not be imported: {reason}")]
    ModuleNotFound { module: String, reason: String },

    #[error("module '{module}' has no attribute '{symbol}'")]
    MissingSymbol { module: String, symbol: String },

    #[error("'{module}.{symbol}' is not callable")]
    NotCallable { module: String, symbol: String },
}

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("bind failed: {0}")]
    Bind(#[from] BindError),

    #[error("unsupported element type: {0}")]
    UnsupportedType(String),

    #[error("unsupported result: {0}")]
    UnsupportedResult(String),

    #[error("shape mismatch: {0}")]
    ShapeMismatch(#[from] TensorError),

    #[error("foreign call failed: {0}")]
    Invocation(String),

    #[error("embedded runtime unavailable: {0}")]
    Resource(String),

    #[error("invalid runtime configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
