//! Error types for settingstore
//!
//! Provides a unified error type for all operations.

use std::time::Duration;

use thiserror::Error;

/// Result type alias using StoreError
pub type Result<T> = std::result::Result<T, StoreError>;

/// Unified error type for settingstore operations
#[derive(Debug, Error)]
pub enum StoreError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // Remote Errors
    // -------------------------------------------------------------------------
    #[error("Document not found")]
    NotFound,

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Bootstrap did not complete within {0:?}")]
    BootstrapTimeout(Duration),

    // -------------------------------------------------------------------------
    // Caller Errors
    // -------------------------------------------------------------------------
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Configuration error: {0}")]
    Config(String),

    // -------------------------------------------------------------------------
    // Document Errors
    // -------------------------------------------------------------------------
    #[error("Decode error: {0}")]
    Decode(String),

    // -------------------------------------------------------------------------
    // Lifecycle Errors
    // -------------------------------------------------------------------------
    #[error("Store is closed")]
    Closed,
}

impl StoreError {
    /// Build a copy suitable for the asynchronous error channel.
    ///
    /// `std::io::Error` is not `Clone`, so I/O errors keep their kind and
    /// message but lose any inner source.
    pub fn to_report(&self) -> StoreError {
        match self {
            StoreError::Io(e) => StoreError::Io(std::io::Error::new(e.kind(), e.to_string())),
            StoreError::NotFound => StoreError::NotFound,
            StoreError::Transport(m) => StoreError::Transport(m.clone()),
            StoreError::Protocol(m) => StoreError::Protocol(m.clone()),
            StoreError::BootstrapTimeout(d) => StoreError::BootstrapTimeout(*d),
            StoreError::InvalidArgument(m) => StoreError::InvalidArgument(m.clone()),
            StoreError::Config(m) => StoreError::Config(m.clone()),
            StoreError::Decode(m) => StoreError::Decode(m.clone()),
            StoreError::Closed => StoreError::Closed,
        }
    }

    /// True for failures caused by the remote side or the network path to it
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            StoreError::Transport(_) | StoreError::Protocol(_) | StoreError::Io(_)
        )
    }
}
