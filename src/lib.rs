//! execbox: a confined execution service.
//!
//! Runs shell commands and Python snippets inside one workspace directory,
//! reads and writes files there, and serves all of it as JSON over HTTP.

#[cfg(not(unix))]
compile_error!("execbox relies on Unix process groups and only builds on Unix.");

pub mod client;
pub mod config;
pub mod deadline;
pub mod error;
pub mod files;
pub mod http_server;
pub mod shell;
pub mod snippet;
pub mod state;
pub mod workspace;

pub use client::SandboxClient;
pub use config::{ListenConfig, ServiceConfig};
pub use error::{ApiError, ClientError, ConfineError, FileError, StartupError};
pub use state::AppState;
pub use workspace::Workspace;
