//! Read, write and list operations confined to the workspace root.
//!
//! Every operation resolves its path through [`PathGuard`] first and only
//! touches the resolved (symlink-free) path.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;

use serde::Serialize;
use tracing::{debug, instrument};

use crate::error::ToolError;
use crate::io::path_guard::PathGuard;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EntryKind {
    File,
    Dir,
}

/// One row of a directory listing. Directories carry no size.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DirEntry {
    pub name: String,
    pub kind: EntryKind,
    pub size_bytes: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct WorkspaceFiles {
    guard: PathGuard,
}

impl WorkspaceFiles {
    pub fn new(guard: PathGuard) -> Self {
        Self { guard }
    }

    /// Read a UTF-8 text file.
    #[instrument(skip_all, fields(path))]
    pub fn read_file(&self, path: &str) -> Result<String, ToolError> {
        let resolved = self.guard.resolve(path)?;
        if !resolved.is_file() {
            return Err(ToolError::NotFound {
                path: path.to_string(),
            });
        }
        let contents = fs::read_to_string(&resolved).map_err(|err| ToolError::io(path, err))?;
        debug!(bytes = contents.len(), "file read");
        Ok(contents)
    }

    /// Write `content`, creating parent directories and replacing any
    /// existing file. Returns the number of bytes written.
    #[instrument(skip_all, fields(path, bytes = content.len()))]
    pub fn write_file(&self, path: &str, content: &str) -> Result<usize, ToolError> {
        let resolved = self.guard.resolve(path)?;
        if resolved == self.guard.root() || resolved.is_dir() {
            return Err(ToolError::io(
                path,
                io::Error::new(io::ErrorKind::IsADirectory, "target is a directory"),
            ));
        }
        if let Some(parent) = resolved.parent() {
            fs::create_dir_all(parent).map_err(|err| ToolError::io(path, err))?;
        }
        // Creating parents may race with a symlink swap; re-check before opening.
        // A swap after this point is not caught.
        if self.guard.resolve(path)? != resolved {
            return Err(ToolError::OutsideRoot {
                path: path.to_string(),
            });
        }
        let mut file = open_no_follow(&resolved).map_err(|err| ToolError::io(path, err))?;
        file.write_all(content.as_bytes()).map_err(|err| ToolError::io(path, err))?;
        debug!("file written");
        Ok(content.len())
    }

    /// List a directory, sorted by name. Symlinks are listed, not followed.
    #[instrument(skip_all, fields(path))]
    pub fn list_directory(&self, path: &str) -> Result<Vec<DirEntry>, ToolError> {
        let resolved = self.guard.resolve(path)?;
        let meta = match fs::metadata(&resolved) {
            Ok(meta) => meta,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return Err(ToolError::NotFound {
                    path: path.to_string(),
                });
            }
            Err(err) => return Err(ToolError::io(path, err)),
        };
        if !meta.is_dir() {
            return Err(ToolError::NotADirectory {
                path: path.to_string(),
            });
        }

        let mut entries = Vec::new();
        for entry in fs::read_dir(&resolved).map_err(|err| ToolError::io(path, err))? {
            let entry = entry.map_err(|err| ToolError::io(path, err))?;
            // `DirEntry::metadata` does not traverse symlinks on unix.
            let meta = entry.metadata().map_err(|err| ToolError::io(path, err))?;
            let name = entry.file_name().to_string_lossy().into_owned();
            entries.push(if meta.is_dir() {
                DirEntry {
                    name,
                    kind: EntryKind::Dir,
                    size_bytes: None,
                }
            } else {
                DirEntry {
                    name,
                    kind: EntryKind::File,
                    size_bytes: Some(meta.len()),
                }
            });
        }
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        debug!(count = entries.len(), "directory listed");
        Ok(entries)
    }

    pub fn root(&self) -> &Path {
        self.guard.root()
    }
}

/// Open for writing, refusing a symlink in the last component.
#[cfg(unix)]
fn open_no_follow(path: &Path) -> io::Result<File> {
    use nix::fcntl::OFlag;
    use std::os::unix::fs::OpenOptionsExt;

    OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .custom_flags(OFlag::O_NOFOLLOW.bits())
        .open(path)
}

#[cfg(not(unix))]
fn open_no_follow(path: &Path) -> io::Result<File> {
    OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(path)
}
