//! execbox - confined execution service with an HTTP API.
//!
//! Usage:
//!   execbox serve [--port 8000] [--workspace DIR]   # Start HTTP server
//!   execbox bash '<command>' [--timeout 30]         # Run one shell command
//!   execbox exec '<code>' [--timeout 30]            # Run one Python snippet (`-` reads stdin)

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use execbox::config::{ListenConfig, ServiceConfig};
use execbox::deadline::{Deadline, SHELL_TIMEOUT_CEILING, SNIPPET_TIMEOUT_CEILING};
use execbox::http_server;
use execbox::state::AppState;
use serde::Serialize;
use std::io::Read;
use std::process::ExitCode;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "execbox")]
#[command(about = "Confined shell and Python execution over HTTP", version)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the HTTP server
    Serve {
        #[command(flatten)]
        listen: ListenConfig,
        #[command(flatten)]
        service: ServiceConfig,
    },
    /// Run one shell command in the workspace and print the JSON result
    Bash {
        command: String,
        /// Seconds before the command is killed
        #[arg(long)]
        timeout: Option<i64>,
        #[command(flatten)]
        service: ServiceConfig,
    },
    /// Run one Python snippet in the workspace and print the JSON result
    Exec {
        /// Snippet source, or `-` to read it from stdin
        code: String,
        /// Seconds before the interpreter is killed
        #[arg(long)]
        timeout: Option<i64>,
        #[command(flatten)]
        service: ServiceConfig,
    },
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // Logs go to stderr; stdout is reserved for one-shot results.
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,tower_http=debug")),
        )
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();

    match args.command {
        Commands::Serve { listen, service } => {
            let state = AppState::from_config(&service)?;
            http_server::run_server(listen.addr(), state).await?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Bash {
            command,
            timeout,
            service,
        } => {
            let state = AppState::from_config(&service)?;
            let deadline = Deadline::clamp(timeout, SHELL_TIMEOUT_CEILING);
            let result = state.shell.run(&command, deadline).await;
            report(&result, result.success)
        }
        Commands::Exec {
            code,
            timeout,
            service,
        } => {
            let code = if code == "-" {
                let mut source = String::new();
                std::io::stdin()
                    .read_to_string(&mut source)
                    .context("failed to read snippet from stdin")?;
                source
            } else {
                code
            };
            let state = AppState::from_config(&service)?;
            let deadline = Deadline::clamp(timeout, SNIPPET_TIMEOUT_CEILING);
            let result = state.snippets.run(&code, deadline).await;
            report(&result, result.success)
        }
    }
}

fn report(result: &impl Serialize, success: bool) -> Result<ExitCode> {
    println!("{}", serde_json::to_string_pretty(result)?);
    Ok(if success {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
