//! Single-file read and write inside the workspace.
//!
//! These are blocking calls; the HTTP layer runs them on the blocking pool.

use crate::error::{FailureRecord, FileError};
use crate::workspace::Workspace;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{self, Write};
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use tempfile::NamedTempFile;
use tracing::{debug, info};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReadFileRequest {
    #[serde(default)]
    pub path: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WriteFileRequest {
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadFileResult {
    pub success: bool,
    pub content: Option<String>,
    pub error: Option<String>,
}

impl FailureRecord for ReadFileResult {
    fn failure(message: String) -> Self {
        Self {
            success: false,
            content: None,
            error: Some(message),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WriteFileResult {
    pub success: bool,
    pub error: Option<String>,
    /// Where the content landed, relative to the workspace root.
    #[serde(default)]
    pub path: Option<String>,
}

impl FailureRecord for WriteFileResult {
    fn failure(message: String) -> Self {
        Self {
            success: false,
            error: Some(message),
            path: None,
        }
    }
}

/// Read a whole UTF-8 file.
pub fn read_file(workspace: &Workspace, requested: &str) -> ReadFileResult {
    match try_read(workspace, requested) {
        Ok(content) => {
            info!(path = requested, bytes = content.len(), "File read");
            ReadFileResult {
                success: true,
                content: Some(content),
                error: None,
            }
        }
        Err(e) => {
            debug!(path = requested, error = %e, "File read refused");
            ReadFileResult::failure(e.to_string())
        }
    }
}

/// Replace (or create) a file with `content`, creating parent directories.
pub fn write_file(workspace: &Workspace, requested: &str, content: &str) -> WriteFileResult {
    match try_write(workspace, requested, content) {
        Ok(relative) => {
            info!(path = %relative, bytes = content.len(), "File written");
            WriteFileResult {
                success: true,
                error: None,
                path: Some(relative),
            }
        }
        Err(e) => {
            debug!(path = requested, error = %e, "File write refused");
            WriteFileResult::failure(e.to_string())
        }
    }
}

fn try_read(workspace: &Workspace, requested: &str) -> Result<String, FileError> {
    let path = workspace.confine(requested)?;
    if !path.exists() {
        return Err(FileError::NotFound(requested.to_string()));
    }
    let bytes = fs::read(&path)?;
    String::from_utf8(bytes)
        .map_err(|e| FileError::Io(io::Error::new(io::ErrorKind::InvalidData, e)))
}

fn try_write(workspace: &Workspace, requested: &str, content: &str) -> Result<String, FileError> {
    let path = workspace.confine(requested)?;
    let parent = match path.parent() {
        Some(parent) if parent.starts_with(workspace.root()) => parent,
        _ => {
            return Err(FileError::Io(io::Error::new(
                io::ErrorKind::InvalidInput,
                "Cannot write to the workspace root",
            )))
        }
    };
    if path.is_dir() {
        return Err(FileError::Io(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("Is a directory: {requested}"),
        )));
    }
    fs::create_dir_all(parent)?;

    // Stage next to the target and rename over it: concurrent writers to the
    // same path are last-writer-wins and readers never see a partial file.
    let mut staged = NamedTempFile::new_in(parent)?;
    staged.write_all(content.as_bytes())?;
    staged
        .as_file()
        .set_permissions(fs::Permissions::from_mode(0o644))?;
    staged.persist(&path).map_err(|e| FileError::Io(e.error))?;

    Ok(relative_display(workspace, &path))
}

fn relative_display(workspace: &Workspace, path: &Path) -> String {
    workspace
        .relative(path)
        .unwrap_or(path)
        .display()
        .to_string()
}
