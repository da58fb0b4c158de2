//! Error types and handling for duckdb-postal.

/// Result type alias for extension operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for extension operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// libpostal setup failed
    #[error("Could not initialize libpostal: {message}")]
    InitializationFailed {
        /// Error message
        message: String,
    },

    /// The data directory setting was rejected
    #[error("{message}")]
    Configuration {
        /// Error message
        message: String,
    },

    /// libpostal could not parse an input row
    #[error("{message}")]
    ParseError {
        /// Error message naming the offending input
        message: String,
    },

    /// libpostal could not expand an input row
    #[error("{message}")]
    NormalizationError {
        /// Error message naming the offending input
        message: String,
    },

    /// Input could not be handed to C
    #[error("FFI error: {message}")]
    FfiError {
        /// Error message
        message: String,
    },

    /// I/O errors
    #[error("I/O error: {source}")]
    IoError {
        /// Source error
        #[from]
        source: std::io::Error,
    },
}

impl Error {
    /// Create a new initialization error
    pub fn initialization_failed(message: impl Into<String>) -> Self {
        Self::InitializationFailed {
            message: message.into(),
        }
    }

    /// Create a new configuration error
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create a new parse error
    pub fn parse_error(message: impl Into<String>) -> Self {
        Self::ParseError {
            message: message.into(),
        }
    }

    /// Create a new normalization error
    pub fn normalization_error(message: impl Into<String>) -> Self {
        Self::NormalizationError {
            message: message.into(),
        }
    }

    /// Create a new FFI error
    pub fn ffi_error(message: impl Into<String>) -> Self {
        Self::FfiError {
            message: message.into(),
        }
    }
}
