use {herald_repository::StorageError, thiserror::Error};

/// What to do with a device token after a failed send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// The token is dead: unregister it and stop.
    Unregister,
    /// Transient server-side failure: try again.
    Retry,
    /// Anything else: give up on this token.
    Abort,
}

/// Failure reported by a push gateway for a single send.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PushError {
    #[error("device token is not registered")]
    NotRegistered,

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("push service internal error: {0}")]
    Internal(String),

    #[error("push send timed out")]
    Timeout,

    #[error("push send failed: {0}")]
    Other(String),
}

impl PushError {
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    #[must_use]
    pub fn other(message: impl Into<String>) -> Self {
        Self::Other(message.into())
    }

    pub fn class(&self) -> ErrorClass {
        match self {
            Self::NotRegistered | Self::InvalidArgument(_) => ErrorClass::Unregister,
            Self::Internal(_) | Self::Timeout => ErrorClass::Retry,
            Self::Other(_) => ErrorClass::Abort,
        }
    }
}

/// Failure delivering to one device token.
#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("gave up after {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: PushError },

    #[error("push rejected: {0}")]
    Rejected(PushError),

    #[error("failed to unregister device: {0}")]
    Unregister(#[source] StorageError),
}

impl DeliveryError {
    /// Label used for the token outcome metric.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Exhausted { .. } => "exhausted",
            Self::Rejected(_) => "rejected",
            Self::Unregister(_) => "unregister_failed",
        }
    }
}

/// Failure that abandons a whole notification event.
#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("failed to {operation}: {source}")]
    Storage {
        operation: &'static str,
        #[source]
        source: StorageError,
    },
}

impl NotifyError {
    /// Adapter for `map_err` on repository calls.
    #[must_use]
    pub fn storage(operation: &'static str) -> impl FnOnce(StorageError) -> Self {
        move |source| Self::Storage { operation, source }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Storage { .. } => "storage",
        }
    }
}

pub type Result<T> = std::result::Result<T, NotifyError>;
