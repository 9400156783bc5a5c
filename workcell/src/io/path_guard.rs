//! Workspace containment check for user-supplied paths.
//!
//! Resolution walks the path one component at a time, reading symlinks with
//! `lstat`/`readlink` and splicing their targets back into the walk. Nothing
//! is opened along the way, so an escaping link is rejected before any I/O
//! goes through it. Components that do not exist yet are appended as-is,
//! which lets `write_file` target new paths.

use std::collections::VecDeque;
use std::ffi::OsString;
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

use tracing::{debug, warn};

use crate::error::ToolError;

/// Matches the kernel's `ELOOP` limit.
const MAX_SYMLINK_HOPS: usize = 40;

/// Resolves paths against a fixed, canonical workspace root.
#[derive(Debug, Clone)]
pub struct PathGuard {
    root: PathBuf,
}

/// Owned path step still to be resolved.
#[derive(Debug)]
enum Step {
    Root(PathBuf),
    Parent,
    Name(OsString),
}

impl PathGuard {
    /// Canonicalize `root` (which must exist) and build a guard for it.
    pub fn new(root: impl AsRef<Path>) -> Result<Self, ToolError> {
        let root = root.as_ref();
        let canonical =
            fs::canonicalize(root).map_err(|err| ToolError::io(root.display().to_string(), err))?;
        Ok(Self { root: canonical })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve `relative` against the root and certify it stays inside.
    ///
    /// Absolute inputs are accepted only if they resolve under the root.
    pub fn resolve(&self, relative: impl AsRef<Path>) -> Result<PathBuf, ToolError> {
        let relative = relative.as_ref();
        let resolved = self.walk(relative)?;
        if !resolved.starts_with(&self.root) {
            warn!(
                path = %relative.display(),
                resolved = %resolved.display(),
                "path escapes workspace"
            );
            return Err(ToolError::OutsideRoot {
                path: relative.display().to_string(),
            });
        }
        debug!(path = %relative.display(), resolved = %resolved.display(), "path resolved");
        Ok(resolved)
    }

    /// Workspace-relative display form of a resolved path.
    pub fn relative_display(&self, resolved: &Path) -> String {
        match resolved.strip_prefix(&self.root) {
            Ok(rel) if rel.as_os_str().is_empty() => ".".to_string(),
            Ok(rel) => rel.display().to_string(),
            Err(_) => resolved.display().to_string(),
        }
    }

    fn walk(&self, input: &Path) -> Result<PathBuf, ToolError> {
        let mut resolved = self.root.clone();
        let mut pending: VecDeque<Step> = steps(input).collect();
        let mut hops = 0usize;

        while let Some(step) = pending.pop_front() {
            match step {
                Step::Root(anchor) => resolved = anchor,
                Step::Parent => {
                    resolved.pop();
                }
                Step::Name(name) => {
                    let candidate = resolved.join(&name);
                    match fs::symlink_metadata(&candidate) {
                        Ok(meta) if meta.file_type().is_symlink() => {
                            hops += 1;
                            if hops > MAX_SYMLINK_HOPS {
                                return Err(ToolError::io(
                                    input.display().to_string(),
                                    io::Error::other("too many levels of symbolic links"),
                                ));
                            }
                            let target = fs::read_link(&candidate).map_err(|err| {
                                ToolError::io(candidate.display().to_string(), err)
                            })?;
                            // The link's target replaces it; relative targets
                            // resolve from the link's directory (`resolved`).
                            for step in steps(&target).collect::<Vec<_>>().into_iter().rev() {
                                pending.push_front(step);
                            }
                        }
                        Ok(_) => resolved = candidate,
                        Err(err) if err.kind() == io::ErrorKind::NotFound => resolved = candidate,
                        Err(err) if err.kind() == io::ErrorKind::NotADirectory => {
                            return Err(ToolError::NotADirectory {
                                path: self.relative_display(&resolved),
                            });
                        }
                        Err(err) => {
                            return Err(ToolError::io(candidate.display().to_string(), err));
                        }
                    }
                }
            }
        }

        Ok(resolved)
    }
}

fn steps(path: &Path) -> impl Iterator<Item = Step> + '_ {
    let mut anchor = PathBuf::new();
    path.components().filter_map(move |component| match component {
        Component::Prefix(prefix) => {
            anchor.push(prefix.as_os_str());
            None
        }
        Component::RootDir => {
            anchor.push(Component::RootDir.as_os_str());
            Some(Step::Root(std::mem::take(&mut anchor)))
        }
        Component::CurDir => None,
        Component::ParentDir => Some(Step::Parent),
        Component::Normal(name) => Some(Step::Name(name.to_os_string())),
    })
}
