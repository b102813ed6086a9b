//! Error types for the Galaxy3D immediate-mode layer
//!
//! Only recoverable conditions are represented here (backend failures and
//! memory exhaustion). Usage-protocol violations such as `begin()` while a
//! session is already active are programming errors and abort through
//! `engine_fatal!` instead.

use std::fmt;

/// Result type for Galaxy3D operations
pub type Result<T> = std::result::Result<T, Error>;

/// Galaxy3D errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Backend-specific error (Vulkan, mock, etc.)
    BackendError(String),

    /// The allocator could not satisfy a request of `requested` bytes
    OutOfMemory {
        requested: u64,
    },

    /// Invalid resource (buffer handle, vertex format, etc.)
    InvalidResource(String),

    /// Initialization failed (device, allocator, command graph)
    InitializationFailed(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::BackendError(msg) => write!(f, "Backend error: {}", msg),
            Error::OutOfMemory { requested } => {
                write!(f, "Out of GPU memory (requested {} bytes)", requested)
            }
            Error::InvalidResource(msg) => write!(f, "Invalid resource: {}", msg),
            Error::InitializationFailed(msg) => write!(f, "Initialization failed: {}", msg),
        }
    }
}

impl std::error::Error for Error {}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
