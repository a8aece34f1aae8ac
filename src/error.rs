use std::fmt;

/// Failures raised by the storage gateways.
#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("storage i/o failed: {0}")]
    Sled(#[from] sled::Error),
    #[error("failed to encode record: {0}")]
    Encode(String),
    #[error("failed to decode record: {0}")]
    Decode(#[from] minicbor::decode::Error),
    #[error("no record stored under id {0}")]
    Missing(String),
    #[error("{0}")]
    Invalid(String),
    #[error("failed to generate record id: {0}")]
    IdGeneration(String),
    #[error("{0}")]
    Unavailable(String),
}

impl<E: fmt::Debug> From<minicbor::encode::Error<E>> for StoreError {
    fn from(value: minicbor::encode::Error<E>) -> Self {
        StoreError::Encode(format!("{value:?}"))
    }
}

/// The failure kinds callers of the workflow can branch on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    InvalidArgument,
    InvalidState,
    Forbidden,
    Storage,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::NotFound => write!(f, "not_found"),
            ErrorKind::InvalidArgument => write!(f, "invalid_argument"),
            ErrorKind::InvalidState => write!(f, "invalid_state"),
            ErrorKind::Forbidden => write!(f, "forbidden"),
            ErrorKind::Storage => write!(f, "storage"),
        }
    }
}

/// Typed failures returned at the service boundary.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum WorkflowError {
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    InvalidArgument(String),
    #[error("{0}")]
    InvalidState(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    Storage(String),
}

impl WorkflowError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            WorkflowError::NotFound(_) => ErrorKind::NotFound,
            WorkflowError::InvalidArgument(_) => ErrorKind::InvalidArgument,
            WorkflowError::InvalidState(_) => ErrorKind::InvalidState,
            WorkflowError::Forbidden(_) => ErrorKind::Forbidden,
            WorkflowError::Storage(_) => ErrorKind::Storage,
        }
    }
}

// storage details are logged, never handed to the caller
impl From<StoreError> for WorkflowError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::Missing(id) => WorkflowError::NotFound(format!("record {id} not found")),
            StoreError::Invalid(reason) => WorkflowError::InvalidArgument(reason),
            other => {
                tracing::error!(error = %other, "storage failure");
                WorkflowError::Storage("storage operation failed".into())
            }
        }
    }
}
