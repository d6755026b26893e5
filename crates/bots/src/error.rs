use {herald_repository::StorageError, thiserror::Error};

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("failed to {operation}: {source}")]
    Storage {
        operation: &'static str,
        #[source]
        source: StorageError,
    },

    #[error("unexpected json encode error: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl DispatchError {
    /// Adapter for `map_err` on repository calls.
    #[must_use]
    pub fn storage(operation: &'static str) -> impl FnOnce(StorageError) -> Self {
        move |source| Self::Storage { operation, source }
    }

    /// Label used for the error metric.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Storage { .. } => "storage",
            Self::Serialize(_) => "serialize",
        }
    }
}

pub type Result<T> = std::result::Result<T, DispatchError>;
