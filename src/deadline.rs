//! Deadline enforcement for child processes.
//!
//! Both runners spawn their payload as a child in its own process group.
//! The deadline covers waiting for exit and draining both pipes; when it
//! expires the whole group is killed with `SIGKILL`, so grandchildren go too.

use crate::workspace::Workspace;
use nix::errno::Errno;
use nix::sys::signal::{killpg, Signal};
use nix::unistd::Pid;
use serde::Deserialize;
use std::io;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::process::{Child, Command};
use tokio::time;
use tracing::{debug, warn};

pub const DEFAULT_TIMEOUT_SECS: u64 = 30;
pub const SHELL_TIMEOUT_CEILING: u64 = 120;
pub const SNIPPET_TIMEOUT_CEILING: u64 = 60;

/// Search path handed to every payload.
pub const CONFINED_PATH: &str = "/usr/local/bin:/usr/bin:/bin";

/// A wall-clock budget in whole seconds, already clamped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deadline(u64);

impl Deadline {
    /// Absent requests get the default; anything above `ceiling` is capped and
    /// anything below one second is raised to one second.
    pub fn clamp(requested: Option<i64>, ceiling: u64) -> Self {
        let secs = match requested {
            None => DEFAULT_TIMEOUT_SECS,
            Some(secs) if secs < 1 => 1,
            Some(secs) => secs as u64,
        };
        Self(secs.min(ceiling))
    }

    pub fn from_secs(secs: u64) -> Self {
        Self(secs.max(1))
    }

    pub fn as_secs(self) -> u64 {
        self.0
    }

    pub fn duration(self) -> Duration {
        Duration::from_secs(self.0)
    }
}

/// Reads a requested timeout given as any JSON number. Fractions are
/// truncated to whole seconds; `null` or an absent field means "use the default".
pub fn deserialize_timeout<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let requested = Option::<serde_json::Number>::deserialize(deserializer)?;
    Ok(requested.map(|n| match n.as_i64() {
        Some(secs) => secs,
        None => n.as_f64().map_or(i64::MAX, |secs| secs as i64),
    }))
}

/// Everything a finished child left behind.
#[derive(Debug)]
pub struct Captured {
    pub status: ExitStatus,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

#[derive(Debug)]
pub enum Outcome {
    Completed(Captured),
    TimedOut,
}

/// Build a command scoped to the workspace: cwd and `HOME` are the root,
/// `PATH` is [`CONFINED_PATH`], the rest of the environment is inherited.
pub fn confined_command(program: impl AsRef<std::ffi::OsStr>, workspace: &Workspace) -> Command {
    let mut command = Command::new(program);
    command
        .current_dir(workspace.root())
        .env("HOME", workspace.root())
        .env("PATH", CONFINED_PATH)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .process_group(0)
        .kill_on_drop(true);
    command
}

/// Wait for `child` to exit and drain its output, feeding `input` to its
/// stdin first if given. The process group is killed if the deadline passes
/// or if this future is dropped before the child finishes.
pub async fn run_to_deadline(
    mut child: Child,
    input: Option<Vec<u8>>,
    deadline: Deadline,
) -> io::Result<Outcome> {
    let mut group = ProcessGroup::of(&child);
    let stdin = child.stdin.take();
    let stdout = child.stdout.take();
    let stderr = child.stderr.take();

    let collect = async {
        let (status, stdout, stderr, ()) =
            tokio::try_join!(child.wait(), drain(stdout), drain(stderr), feed(stdin, input))?;
        Ok::<_, io::Error>(Captured {
            status,
            stdout,
            stderr,
        })
    };
    let waited = time::timeout(deadline.duration(), collect).await;

    match waited {
        Ok(Ok(captured)) => {
            group.release();
            Ok(Outcome::Completed(captured))
        }
        Ok(Err(e)) => {
            group.kill();
            if let Err(reap) = child.wait().await {
                warn!(error = %reap, "Failed to reap child after I/O error");
            }
            Err(e)
        }
        Err(_) => {
            debug!(secs = deadline.as_secs(), "Deadline expired, killing process group");
            group.kill();
            child.wait().await?;
            Ok(Outcome::TimedOut)
        }
    }
}

async fn drain<R: AsyncRead + Unpin>(pipe: Option<R>) -> io::Result<Vec<u8>> {
    let mut buf = Vec::new();
    if let Some(mut pipe) = pipe {
        pipe.read_to_end(&mut buf).await?;
    }
    Ok(buf)
}

async fn feed<W: AsyncWrite + Unpin>(pipe: Option<W>, input: Option<Vec<u8>>) -> io::Result<()> {
    let (Some(mut pipe), Some(input)) = (pipe, input) else {
        return Ok(());
    };
    // A child that exits without reading its input is not our failure.
    match pipe.write_all(&input).await {
        Err(e) if e.kind() == io::ErrorKind::BrokenPipe => Ok(()),
        other => other,
    }
}

/// Kill switch for a child spawned with `process_group(0)`.
struct ProcessGroup {
    pgid: Option<Pid>,
}

impl ProcessGroup {
    fn of(child: &Child) -> Self {
        Self {
            pgid: child.id().map(|id| Pid::from_raw(id as i32)),
        }
    }

    /// The child exited on its own; leave any background jobs alone.
    fn release(&mut self) {
        self.pgid = None;
    }

    fn kill(&mut self) {
        let Some(pgid) = self.pgid.take() else {
            return;
        };
        match killpg(pgid, Signal::SIGKILL) {
            Ok(()) | Err(Errno::ESRCH) => {}
            Err(e) => warn!(pgid = pgid.as_raw(), error = %e, "Failed to kill process group"),
        }
    }
}

impl Drop for ProcessGroup {
    fn drop(&mut self) {
        self.kill();
    }
}
