use thiserror::Error;

use pyop_core::{Status, StatusCode};
use pyop_runtime::RuntimeError;

#[derive(Debug, Error)]
pub enum KernelError {
    #[error("missing required string attribute '{0}'")]
    MissingAttribute(&'static str),

    /// Settings could not be loaded. The message is already complete.
    #[error("{0}")]
    Config(String),

    #[error("input {0} is not available")]
    MissingInput(usize),

    #[error(transparent)]
    Runtime(#[from] RuntimeError),

    #[error("output rejected by the engine: {0}")]
    Output(Status),
}

impl KernelError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            KernelError::MissingAttribute(_)
            | KernelError::Config(_)
            | KernelError::MissingInput(_) => StatusCode::InvalidArgument,
            KernelError::Output(status) => status.code(),
            KernelError::Runtime(e) => match e {
                RuntimeError::Bind(_) | RuntimeError::Io(_) => StatusCode::Fail,
                RuntimeError::UnsupportedType(_) | RuntimeError::Config(_) => {
                    StatusCode::InvalidArgument
                }
                RuntimeError::UnsupportedResult(_)
                | RuntimeError::ShapeMismatch(_)
                | RuntimeError::Invocation(_) => StatusCode::RuntimeException,
                RuntimeError::Resource(_) => StatusCode::EngineError,
            },
        }
    }
}

impl From<KernelError> for Status {
    fn from(err: KernelError) -> Self {
        Status::new(err.status_code(), err.to_string())
    }
}
