// Collector error taxonomy. Every variant is recoverable: the engine absorbs it.

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CollectionError {
    #[error("permission denied")]
    PermissionDenied,

    #[error("system call failed (code {code})")]
    SyscallFailed { code: i32 },

    #[error("driver error (code {code})")]
    DriverError { code: i32 },

    #[error("property not found: {0}")]
    PropertyNotFound(String),

    /// The blocking sampling task panicked or was cancelled.
    #[error("sampling task failed: {0}")]
    TaskFailed(String),
}

impl CollectionError {
    pub fn property_not_found<S: Into<String>>(name: S) -> Self {
        CollectionError::PropertyNotFound(name.into())
    }

    pub fn from_io(e: &std::io::Error) -> Self {
        if e.kind() == std::io::ErrorKind::PermissionDenied {
            return CollectionError::PermissionDenied;
        }
        CollectionError::SyscallFailed {
            code: e.raw_os_error().unwrap_or(-1),
        }
    }
}

impl From<std::io::Error> for CollectionError {
    fn from(e: std::io::Error) -> Self {
        CollectionError::from_io(&e)
    }
}

pub type CollectionResult<T> = Result<T, CollectionError>;
