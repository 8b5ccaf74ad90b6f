//! Error types shared across the service.
//!
//! Component-level failures never leave their component as an `Err`; they are
//! folded into the `success:false` result records. Only [`ApiError`] reaches
//! the transport, as a route-shaped failure body with status 500.

use std::io;
use thiserror::Error;

/// Why a caller-supplied path could not be confined to the workspace.
#[derive(Debug, Error)]
pub enum ConfineError {
    #[error("Access denied: path outside workspace")]
    Escapes,

    #[error("Access denied: path outside workspace")]
    Unresolvable(#[source] io::Error),
}

#[derive(Debug, Error)]
pub enum FileError {
    #[error(transparent)]
    AccessDenied(#[from] ConfineError),

    #[error("File not found: {0}")]
    NotFound(String),

    #[error("{0}")]
    Io(#[from] io::Error),
}

/// Dispatcher-level failure: the request never reached a component, or the
/// component died unexpectedly.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Malformed request body: {0}")]
    MalformedRequest(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// A result record that can stand in for a request that failed before, or
/// outside of, its component.
pub trait FailureRecord {
    fn failure(message: String) -> Self;
}

/// Failures seen by [`crate::client::SandboxClient`] before a result record
/// could be read. The client folds these into `success:false` records.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Sandbox error: {0}")]
    Status(reqwest::StatusCode),

    #[error(transparent)]
    Http(#[from] reqwest::Error),
}

/// Failures that prevent the service from starting.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("failed to prepare workspace {path}: {source}")]
    Workspace {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("server error: {0}")]
    Serve(#[source] io::Error),
}
