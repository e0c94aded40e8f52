//! Error types and handling for iovring

/// Result type alias for iovring operations
pub type Result<T> = std::result::Result<T, IovError>;

/// Error types for shared buffers, I/O vectors, rings and the read driver
#[derive(Debug, thiserror::Error)]
pub enum IovError {
    /// I/O related errors (file operations, mmap, symlinks, etc.)
    #[error("I/O error: {message}")]
    Io {
        message: String,
        #[source]
        source: Option<std::io::Error>,
    },

    /// An operation completed with a negative result (sign-inverted errno)
    #[error("OS error {code}: {}", std::io::Error::from_raw_os_error(*code))]
    Os { code: i32 },

    /// Invalid parameters or configuration
    #[error("Invalid parameter: {parameter} - {message}")]
    InvalidParameter { parameter: String, message: String },

    /// No free submission slot left on a ring
    #[error("Ring full: all {capacity} entries are in use")]
    RingFull { capacity: usize },

    /// Operation on a vector or ring that has already been closed
    #[error("Resource closed: {resource}")]
    Closed { resource: String },

    /// Path does not live under any known mount point
    #[error("No mount point found for {path}")]
    MountNotFound { path: String },

    /// Native engine failures (construction, submission, waiting)
    #[error("Engine error: {message}")]
    Engine { message: String },

    /// The engine cannot produce the requested completions
    #[error("Ring stalled: {pending} operations pending, {wanted} completions wanted")]
    Stalled { pending: usize, wanted: usize },
}

impl IovError {
    /// Create an I/O error from a standard I/O error
    pub fn from_io(source: std::io::Error, context: &str) -> Self {
        Self::Io {
            message: format!("{}: {}", context, source),
            source: Some(source),
        }
    }

    /// Create an error from a negative completion result
    pub fn from_completion(result: i64) -> Self {
        Self::Os {
            code: result.unsigned_abs() as i32,
        }
    }

    /// Create an invalid parameter error
    pub fn invalid_parameter(parameter: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidParameter {
            parameter: parameter.into(),
            message: message.into(),
        }
    }

    /// Create a ring full error
    pub fn ring_full(capacity: usize) -> Self {
        Self::RingFull { capacity }
    }

    /// Create a closed resource error
    pub fn closed(resource: impl Into<String>) -> Self {
        Self::Closed {
            resource: resource.into(),
        }
    }

    /// Create a mount not found error
    pub fn mount_not_found(path: impl AsRef<std::path::Path>) -> Self {
        Self::MountNotFound {
            path: path.as_ref().display().to_string(),
        }
    }

    /// Create an engine error
    pub fn engine(message: impl Into<String>) -> Self {
        Self::Engine {
            message: message.into(),
        }
    }

    /// Create a stalled ring error
    pub fn stalled(pending: usize, wanted: usize) -> Self {
        Self::Stalled { pending, wanted }
    }

    /// The OS error code carried by this error, if any
    pub fn raw_os_error(&self) -> Option<i32> {
        match self {
            Self::Os { code } => Some(*code),
            Self::Io {
                source: Some(source),
                ..
            } => source.raw_os_error(),
            _ => None,
        }
    }
}

// Convert from common error types
impl From<std::io::Error> for IovError {
    fn from(err: std::io::Error) -> Self {
        Self::from_io(err, "I/O operation failed")
    }
}

impl From<nix::Error> for IovError {
    fn from(err: nix::Error) -> Self {
        Self::from_io(std::io::Error::from(err), "System call failed")
    }
}
