//! Python snippet runner.
//!
//! Each snippet runs in a fresh interpreter process started in the workspace,
//! so nothing the snippet does to its working directory or signal handlers
//! touches the server. The interpreter runs a small harness (`harness.py`)
//! that executes the code against the [`BindingRegistry`], captures its
//! output, and reports back with one JSON envelope on stdout.
//!
//! The value reported as `result` is the snippet's `result` variable if it
//! bound one, otherwise `_` if bound, otherwise `null`. Values JSON cannot
//! carry are replaced by their `str()` text.

mod bindings;

pub use bindings::{Binding, BindingRegistry};

use crate::deadline::{self, Captured, Deadline, Outcome};
use crate::error::FailureRecord;
use crate::workspace::Workspace;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use tracing::{debug, info, warn};
use uuid::Uuid;

const HARNESS: &str = include_str!("harness.py");

/// Marker placed between captured stdout and stderr in `output`.
pub const STDERR_MARKER: &str = "\n[stderr]\n";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SnippetRequest {
    #[serde(default)]
    pub code: String,
    /// Seconds; capped at [`deadline::SNIPPET_TIMEOUT_CEILING`].
    #[serde(
        default,
        deserialize_with = "deadline::deserialize_timeout",
        skip_serializing_if = "Option::is_none"
    )]
    pub timeout: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnippetResult {
    pub success: bool,
    pub output: String,
    #[serde(default)]
    pub result: Value,
    pub error: Option<String>,
}

impl SnippetResult {
    fn timed_out(deadline: Deadline) -> Self {
        Self::failure(format!(
            "Code execution timed out after {} seconds",
            deadline.as_secs()
        ))
    }
}

impl FailureRecord for SnippetResult {
    fn failure(message: String) -> Self {
        Self {
            success: false,
            output: String::new(),
            result: Value::Null,
            error: Some(message),
        }
    }
}

#[derive(Serialize)]
struct HarnessRequest<'a> {
    code: &'a str,
    workspace: &'a Path,
    bindings: &'a [Binding],
    sentinel: &'a str,
}

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(default)]
    stdout: String,
    #[serde(default)]
    stderr: String,
    #[serde(default)]
    result: Value,
    error: Option<String>,
    #[serde(default)]
    missing: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct SnippetRunner {
    workspace: Workspace,
    interpreter: PathBuf,
    bindings: BindingRegistry,
}

impl SnippetRunner {
    pub fn new(workspace: Workspace, interpreter: impl Into<PathBuf>) -> Self {
        Self {
            workspace,
            interpreter: interpreter.into(),
            bindings: BindingRegistry::default(),
        }
    }

    pub fn with_bindings(mut self, bindings: BindingRegistry) -> Self {
        self.bindings = bindings;
        self
    }

    pub fn interpreter(&self) -> &Path {
        &self.interpreter
    }

    pub fn bindings(&self) -> &BindingRegistry {
        &self.bindings
    }

    pub async fn run(&self, code: &str, deadline: Deadline) -> SnippetResult {
        let sentinel = format!("__execbox_envelope_{}__", Uuid::new_v4().simple());
        let request = HarnessRequest {
            code,
            workspace: self.workspace.root(),
            bindings: self.bindings.as_slice(),
            sentinel: &sentinel,
        };
        let input = match serde_json::to_vec(&request) {
            Ok(input) => input,
            Err(e) => return SnippetResult::failure(format!("Failed to encode snippet: {e}")),
        };

        debug!(len = code.len(), secs = deadline.as_secs(), "Running snippet");

        let child = deadline::confined_command(&self.interpreter, &self.workspace)
            .arg("-B")
            .arg("-c")
            .arg(HARNESS)
            .env("PYTHONIOENCODING", "utf-8")
            .stdin(Stdio::piped())
            .spawn();
        let child = match child {
            Ok(child) => child,
            Err(e) => {
                warn!(interpreter = %self.interpreter.display(), error = %e, "Failed to spawn interpreter");
                return SnippetResult::failure(format!(
                    "Failed to start interpreter {}: {e}",
                    self.interpreter.display()
                ));
            }
        };

        let result = match deadline::run_to_deadline(child, Some(input), deadline).await {
            Ok(Outcome::Completed(captured)) => interpret(captured, &sentinel),
            Ok(Outcome::TimedOut) => SnippetResult::timed_out(deadline),
            Err(e) => SnippetResult::failure(format!("Interpreter I/O failed: {e}")),
        };

        info!(success = result.success, "Snippet finished");
        result
    }
}

fn interpret(captured: Captured, sentinel: &str) -> SnippetResult {
    let stdout = String::from_utf8_lossy(&captured.stdout);
    let stray_stderr = String::from_utf8_lossy(&captured.stderr);

    let Some((stray_stdout, line)) = split_envelope(&stdout, sentinel) else {
        return SnippetResult {
            success: false,
            output: compose_output(&stdout, &stray_stderr),
            result: Value::Null,
            error: Some(format!(
                "Interpreter {} before reporting a result",
                describe_exit(captured.status)
            )),
        };
    };

    let envelope: Envelope = match serde_json::from_str(line) {
        Ok(envelope) => envelope,
        Err(e) => {
            return SnippetResult::failure(format!("Unreadable result from interpreter: {e}"));
        }
    };

    if !envelope.missing.is_empty() {
        warn!(missing = ?envelope.missing, "Snippet bindings unavailable in interpreter");
    }

    // Text written straight to the file descriptors (child processes, os.write)
    // bypasses the harness buffers; keep it rather than drop it.
    let stdout = format!("{stray_stdout}{}", envelope.stdout);
    let stderr = format!("{}{stray_stderr}", envelope.stderr);

    SnippetResult {
        success: envelope.error.is_none(),
        output: compose_output(&stdout, &stderr),
        result: if envelope.error.is_none() {
            envelope.result
        } else {
            Value::Null
        },
        error: envelope.error,
    }
}

/// Split stdout into whatever preceded the envelope and the envelope line.
fn split_envelope<'a>(stdout: &'a str, sentinel: &str) -> Option<(&'a str, &'a str)> {
    let at = stdout.rfind(sentinel)?;
    let before = &stdout[..at];
    let before = before.strip_suffix('\n').unwrap_or(before);
    let line = stdout[at + sentinel.len()..].lines().next().unwrap_or_default();
    Some((before, line))
}

fn compose_output(stdout: &str, stderr: &str) -> String {
    let mut output = stdout.to_string();
    if !stderr.is_empty() {
        output.push_str(STDERR_MARKER);
        output.push_str(stderr);
    }
    output.trim().to_string()
}

fn describe_exit(status: ExitStatus) -> String {
    use std::os::unix::process::ExitStatusExt;
    match (status.code(), status.signal()) {
        (Some(code), _) => format!("exited with status {code}"),
        (None, Some(signal)) => format!("was killed by signal {signal}"),
        (None, None) => "exited".to_string(),
    }
}
