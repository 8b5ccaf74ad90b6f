//! Workspace root and path confinement.
//!
//! Every filesystem-touching operation goes through [`Workspace::confine`].
//! Containment is decided on the resolved path (symlinks followed, `..`
//! applied) and compared component-wise, never as a string prefix.

use crate::error::ConfineError;
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};
use tracing::debug;

/// The single directory all executions and file operations are confined to.
#[derive(Debug, Clone)]
pub struct Workspace {
    root: PathBuf,
}

impl Workspace {
    /// Create the directory if absent and pin its canonical location.
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref();
        fs::create_dir_all(path)?;
        let root = fs::canonicalize(path)?;
        debug!(root = %root.display(), "Workspace ready");
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a caller-supplied path against the root.
    ///
    /// The returned path is the root itself or a strict descendant of it.
    pub fn confine(&self, requested: &str) -> Result<PathBuf, ConfineError> {
        let resolved = resolve(&self.root.join(requested))?;
        if resolved.starts_with(&self.root) {
            Ok(resolved)
        } else {
            debug!(requested, resolved = %resolved.display(), "Path escapes workspace");
            Err(ConfineError::Escapes)
        }
    }

    /// Path of a confined location relative to the root.
    pub fn relative<'a>(&self, confined: &'a Path) -> Option<&'a Path> {
        confined.strip_prefix(&self.root).ok()
    }
}

/// Like `realpath`, but tolerates components that do not exist yet: those are
/// appended as written, so a write target can be resolved before it is created.
fn resolve(path: &Path) -> Result<PathBuf, ConfineError> {
    let mut resolved = PathBuf::new();

    for component in path.components() {
        match component {
            Component::Prefix(_) | Component::RootDir => resolved.push(component.as_os_str()),
            Component::CurDir => {}
            Component::ParentDir => {
                resolved.pop();
            }
            Component::Normal(name) => {
                let candidate = resolved.join(name);
                match fs::symlink_metadata(&candidate) {
                    Ok(meta) if meta.file_type().is_symlink() => {
                        // Dangling or looping links are refused outright.
                        resolved =
                            fs::canonicalize(&candidate).map_err(ConfineError::Unresolvable)?;
                    }
                    Ok(_) => resolved = candidate,
                    Err(e) if e.kind() == io::ErrorKind::NotFound => resolved = candidate,
                    Err(e) => return Err(ConfineError::Unresolvable(e)),
                }
            }
        }
    }

    Ok(resolved)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::symlink;
    use tempfile::TempDir;

    fn workspace() -> (TempDir, Workspace) {
        let dir = TempDir::new().unwrap();
        let ws = Workspace::open(dir.path().join("ws")).unwrap();
        (dir, ws)
    }

    #[test]
    fn open_creates_missing_root() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("a/b/workspace");
        let ws = Workspace::open(&target).unwrap();
        assert!(target.is_dir());
        assert!(ws.root().is_absolute());
    }

    #[test]
    fn plain_relative_paths_stay_inside() {
        let (_dir, ws) = workspace();
        let path = ws.confine("a/b.txt").unwrap();
        assert_eq!(path, ws.root().join("a/b.txt"));
        assert_eq!(ws.relative(&path), Some(Path::new("a/b.txt")));
    }

    #[test]
    fn empty_path_is_the_root() {
        let (_dir, ws) = workspace();
        assert_eq!(ws.confine("").unwrap(), ws.root());
        assert_eq!(ws.confine(".").unwrap(), ws.root());
    }

    #[test]
    fn traversal_out_of_root_is_denied() {
        let (_dir, ws) = workspace();
        assert!(matches!(
            ws.confine("../../etc/passwd"),
            Err(ConfineError::Escapes)
        ));
        assert!(matches!(ws.confine(".."), Err(ConfineError::Escapes)));
    }

    #[test]
    fn traversal_that_lands_back_inside_is_allowed() {
        let (_dir, ws) = workspace();
        let path = ws.confine("missing/../notes.txt").unwrap();
        assert_eq!(path, ws.root().join("notes.txt"));
    }

    #[test]
    fn absolute_paths_outside_are_denied() {
        let (_dir, ws) = workspace();
        assert!(matches!(ws.confine("/etc/passwd"), Err(ConfineError::Escapes)));
    }

    #[test]
    fn absolute_path_inside_root_is_allowed() {
        let (_dir, ws) = workspace();
        let inside = ws.root().join("data.csv");
        let path = ws.confine(inside.to_str().unwrap()).unwrap();
        assert_eq!(path, inside);
    }

    #[test]
    fn sibling_with_shared_name_prefix_is_denied() {
        let (dir, ws) = workspace();
        let sibling = dir.path().join("ws-evil");
        fs::create_dir_all(&sibling).unwrap();
        let sibling = fs::canonicalize(sibling).unwrap();
        let requested = sibling.join("x.txt");
        assert!(matches!(
            ws.confine(requested.to_str().unwrap()),
            Err(ConfineError::Escapes)
        ));
    }

    #[test]
    fn symlink_pointing_outside_is_denied() {
        let (dir, ws) = workspace();
        let outside = dir.path().join("outside");
        fs::create_dir_all(&outside).unwrap();
        fs::write(outside.join("secret.txt"), "s3cret").unwrap();
        symlink(&outside, ws.root().join("link")).unwrap();

        assert!(matches!(
            ws.confine("link/secret.txt"),
            Err(ConfineError::Escapes)
        ));
        assert!(matches!(
            ws.confine("link/new-file.txt"),
            Err(ConfineError::Escapes)
        ));
    }

    #[test]
    fn symlink_pointing_inside_is_followed() {
        let (_dir, ws) = workspace();
        fs::create_dir_all(ws.root().join("real")).unwrap();
        symlink(ws.root().join("real"), ws.root().join("alias")).unwrap();
        let path = ws.confine("alias/file.txt").unwrap();
        assert_eq!(path, ws.root().join("real/file.txt"));
    }

    #[test]
    fn parent_of_symlink_follows_the_target() {
        let (dir, ws) = workspace();
        let outside = dir.path().join("elsewhere/deeper");
        fs::create_dir_all(&outside).unwrap();
        symlink(&outside, ws.root().join("jump")).unwrap();
        assert!(matches!(
            ws.confine("jump/../x.txt"),
            Err(ConfineError::Escapes)
        ));
    }

    #[test]
    fn dangling_symlink_is_unresolvable() {
        let (dir, ws) = workspace();
        symlink(dir.path().join("nowhere"), ws.root().join("dangling")).unwrap();
        assert!(matches!(
            ws.confine("dangling"),
            Err(ConfineError::Unresolvable(_))
        ));
    }
}
