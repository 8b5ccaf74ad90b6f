//! Command-line and environment configuration.

use clap::Args;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use tracing::{info, warn};

pub const DEFAULT_WORKSPACE: &str = "/home/sandbox/workspace";
pub const DEFAULT_PORT: u16 = 8000;

/// Where the server listens.
#[derive(Debug, Clone, Args)]
pub struct ListenConfig {
    /// Address to bind
    #[arg(long, env = "EXECBOX_HOST", default_value_t = IpAddr::V4(Ipv4Addr::UNSPECIFIED))]
    pub host: IpAddr,

    /// Port to listen on
    #[arg(long, env = "EXECBOX_PORT", default_value_t = DEFAULT_PORT)]
    pub port: u16,
}

impl ListenConfig {
    pub fn addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

/// What every execution needs, shared by the server and the one-shot commands.
#[derive(Debug, Clone, Args)]
pub struct ServiceConfig {
    /// Directory all executions and file operations are confined to
    #[arg(long, env = "EXECBOX_WORKSPACE", default_value = DEFAULT_WORKSPACE)]
    pub workspace: PathBuf,

    /// Python interpreter used for snippets
    #[arg(long, env = "EXECBOX_PYTHON", default_value = "python3")]
    pub python: String,

    /// Executions allowed to run at once; further requests queue
    #[arg(long, env = "EXECBOX_MAX_CONCURRENT", default_value_t = 1)]
    pub max_concurrent: usize,
}

impl ServiceConfig {
    pub fn new(workspace: impl Into<PathBuf>) -> Self {
        Self {
            workspace: workspace.into(),
            python: "python3".to_string(),
            max_concurrent: 1,
        }
    }

    /// Absolute path of the interpreter. Payloads run with a reduced `PATH`,
    /// so the lookup happens here, once, against the server's own `PATH`.
    pub fn resolve_interpreter(&self) -> PathBuf {
        match which::which(&self.python) {
            Ok(path) => {
                info!(interpreter = %path.display(), "Snippet interpreter found");
                path
            }
            Err(e) => {
                warn!(python = %self.python, error = %e, "Snippet interpreter not found; /execute will fail");
                PathBuf::from(&self.python)
            }
        }
    }
}
