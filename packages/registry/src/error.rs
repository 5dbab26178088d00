//! Error types for registry operations.

use thiserror::Error;

/// Errors reported by the subscription registry.
///
/// Store failures never unwind into the caller of `put`/`remove`; they reach
/// it through the operation's completion.
#[derive(Debug, Clone, Error)]
pub enum RegistryError {
    /// The address cannot be used as a store path component.
    #[error("invalid address '{address}': {message}")]
    InvalidAddress { address: String, message: String },

    /// The registration record is malformed.
    #[error("invalid registration: {message}")]
    InvalidRegistration { message: String },

    /// A record could not be serialized.
    #[error("failed to encode registration: {message}")]
    Encode { message: String },

    /// A stored leaf could not be turned back into a record.
    #[error("failed to decode registration: {message}")]
    Decode { message: String },

    /// The coordination store rejected or failed the operation.
    #[error("store error: {0}")]
    Store(#[from] subreg_coord::Error),

    /// Configuration could not be loaded or is inconsistent.
    #[error("configuration error: {message}")]
    Config { message: String },

    /// A caller-side deadline expired before the completion fired.
    #[error("operation timed out")]
    Timeout,

    /// The registry has been closed.
    #[error("registry closed")]
    Closed,

    /// No async runtime was available to drive store calls.
    #[error("runtime unavailable: {message}")]
    Runtime { message: String },
}

impl RegistryError {
    pub fn decode(message: impl Into<String>) -> Self {
        RegistryError::Decode {
            message: message.into(),
        }
    }

    pub fn encode(message: impl Into<String>) -> Self {
        RegistryError::Encode {
            message: message.into(),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        RegistryError::Config {
            message: message.into(),
        }
    }

    /// Whether retrying later may succeed.
    ///
    /// Store failures and timeouts are transient; misuse and codec errors
    /// are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            RegistryError::Store(e) => !matches!(e, subreg_coord::Error::Path(_)),
            RegistryError::Timeout => true,
            RegistryError::InvalidAddress { .. }
            | RegistryError::InvalidRegistration { .. }
            | RegistryError::Encode { .. }
            | RegistryError::Decode { .. }
            | RegistryError::Config { .. }
            | RegistryError::Closed
            | RegistryError::Runtime { .. } => false,
        }
    }
}

/// Result type alias for registry operations.
pub type Result<T> = std::result::Result<T, RegistryError>;
