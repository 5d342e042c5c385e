//! Error types for Beacon dispatch.

use std::error::Error as StdError;
use thiserror::Error;

/// Invalid process-level configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigurationError {
    /// Tracking marker is empty or contains characters outside `[A-Za-z0-9_-]`.
    #[error("Invalid tracking marker: {0:?}")]
    InvalidMarker(String),
}

/// Failure reported by a subscription handler.
///
/// Returned synchronously from a handler, or used to reject a
/// [`Deferred`](crate::completion::Deferred).
#[derive(Debug, Error)]
#[error("{message}")]
pub struct HandlerError {
    message: String,
    #[source]
    source: Option<Box<dyn StdError + Send + Sync>>,
}

impl HandlerError {
    /// Create an error with a message.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    /// Create an error wrapping an underlying cause.
    #[must_use]
    pub fn with_source(
        message: impl Into<String>,
        source: impl Into<Box<dyn StdError + Send + Sync>>,
    ) -> Self {
        Self {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// Get the error message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Failure of an aggregated completion.
#[derive(Debug, Error)]
pub enum CompletionError {
    /// A handler's deferred result was rejected.
    #[error("Handler failed: {0}")]
    Failed(#[from] HandlerError),

    /// A deferred result's resolver was dropped without settling.
    #[error("Deferred result abandoned before settling")]
    Abandoned,
}

/// Dispatch errors.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// Invalid configuration.
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    /// A handler failed synchronously; remaining handlers were not invoked.
    #[error("Handler for channel '{channel}' failed: {source}")]
    Handler {
        /// Channel being published.
        channel: String,
        /// The handler's error.
        #[source]
        source: HandlerError,
    },

    /// Scoped publish from an instance that is not attached.
    #[error("Instance is not attached to the tree")]
    NotAttached,

    /// Node id unknown to the tree.
    #[error("Unknown node: {0}")]
    UnknownNode(String),
}
