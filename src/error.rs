pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("{0}")]
    General(String),
    #[error(transparent)]
    SerdeJson(#[from] serde_json::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Storage(#[from] zarrs::storage::StorageError),
    #[error(transparent)]
    Array(#[from] zarrs::array::ArrayError),
    #[cfg(feature = "hdf5")]
    #[error(transparent)]
    Hdf5(#[from] hdf5_metno::Error),
    /// A panic was caught at a fault boundary.
    #[error("fault during {operation}: {message}")]
    Fault {
        operation: &'static str,
        message: String,
    },
    /// A buffer for this many elements could not be allocated.
    #[error("could not allocate a buffer of {elements} elements")]
    Allocation { elements: u64 },
    #[error(transparent)]
    Wrapped(Box<dyn std::error::Error>),
}

impl Error {
    pub fn general(message: impl Into<String>) -> Self {
        Self::General(message.into())
    }

    pub fn wrap(error: impl std::error::Error + 'static) -> Self {
        Self::Wrapped(Box::new(error))
    }

    /// Whether this error came out of a fault boundary rather than a reported failure.
    pub fn is_fault(&self) -> bool {
        matches!(self, Self::Fault { .. })
    }
}
