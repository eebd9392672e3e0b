// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Filesystem relocation logic.
//!
//! Moving an object is attempted as a single atomic rename first. Renames
//! cannot cross filesystem boundaries, so when the archive directory lives on
//! another volume the object is copied over in full, and only then removed
//! from its old location. A copy that fails midway removes whatever partial
//! content it left behind, and never touches the source.

use ignore::WalkBuilder;
use std::{
    fs,
    io::ErrorKind,
    path::{Path, PathBuf},
};
use tracing::{debug, instrument, warn};

/// Move filesystem objects from one location to another.
pub trait Relocator {
    /// Move object at `from` to `to`.
    ///
    /// The parent directory of `to` must already exist, and `to` itself must
    /// not exist.
    fn relocate(&self, from: &Path, to: &Path) -> Result<()>;
}

/// Relocation through the local filesystem.
#[derive(Debug, Default, Clone, Copy)]
pub struct FsRelocator;

impl FsRelocator {
    /// Construct new filesystem relocator.
    pub fn new() -> Self {
        Self
    }
}

impl Relocator for FsRelocator {
    #[instrument(skip(self), level = "debug")]
    fn relocate(&self, from: &Path, to: &Path) -> Result<()> {
        match fs::rename(from, to) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::CrossesDevices => {
                debug!("rename crosses devices, fall back to copy then delete");
                copy_then_delete(from, to)
            }
            Err(err) => Err(RelocateError::Rename {
                source: err,
                from: from.to_path_buf(),
                to: to.to_path_buf(),
            }),
        }
    }
}

fn copy_then_delete(from: &Path, to: &Path) -> Result<()> {
    if let Err(err) = copy_object(from, to) {
        // INVARIANT: Source stays intact, partial destination is discarded.
        match remove_object(to) {
            Ok(()) => {}
            Err(cleanup) if cleanup.kind() == ErrorKind::NotFound => {}
            Err(cleanup) => warn!(
                "failed to discard partial copy at {:?}: {cleanup}",
                to.display()
            ),
        }
        return Err(err);
    }

    remove_object(from).map_err(|err| RelocateError::Remove {
        source: err,
        path: from.to_path_buf(),
    })
}

fn copy_object(from: &Path, to: &Path) -> Result<()> {
    let copy_err = |err, src: &Path, dst: &Path| RelocateError::Copy {
        source: err,
        from: src.to_path_buf(),
        to: dst.to_path_buf(),
    };

    let metadata = fs::symlink_metadata(from).map_err(|err| copy_err(err, from, to))?;
    if metadata.file_type().is_symlink() {
        return copy_symlink(from, to).map_err(|err| copy_err(err, from, to));
    }

    if metadata.is_file() {
        return fs::copy(from, to)
            .map(|_| ())
            .map_err(|err| copy_err(err, from, to));
    }

    let walker = WalkBuilder::new(from)
        .standard_filters(false)
        .hidden(false)
        .follow_links(false)
        .build();

    // INVARIANT: Directory permissions are applied last, deepest first, so
    //   read-only directories can still be filled.
    let mut directories = Vec::new();
    for entry in walker {
        let entry = entry.map_err(|err| RelocateError::Walk {
            source: err,
            path: from.to_path_buf(),
        })?;
        let source = entry.path();
        let target = match source.strip_prefix(from) {
            Ok(relative) if !relative.as_os_str().is_empty() => to.join(relative),
            _ => to.to_path_buf(),
        };

        let Some(file_type) = entry.file_type() else {
            continue;
        };

        if file_type.is_symlink() {
            copy_symlink(source, &target).map_err(|err| copy_err(err, source, &target))?;
        } else if file_type.is_dir() {
            fs::create_dir(&target).map_err(|err| copy_err(err, source, &target))?;
            let permissions = fs::metadata(source)
                .map_err(|err| copy_err(err, source, &target))?
                .permissions();
            directories.push((target, permissions));
        } else {
            fs::copy(source, &target).map_err(|err| copy_err(err, source, &target))?;
        }
    }

    for (directory, permissions) in directories.into_iter().rev() {
        fs::set_permissions(&directory, permissions)
            .map_err(|err| copy_err(err, from, &directory))?;
    }

    Ok(())
}

fn remove_object(path: &Path) -> std::io::Result<()> {
    let metadata = fs::symlink_metadata(path)?;
    if metadata.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    }
}

#[cfg(unix)]
fn copy_symlink(from: &Path, to: &Path) -> std::io::Result<()> {
    let target = fs::read_link(from)?;
    std::os::unix::fs::symlink(target, to)
}

#[cfg(windows)]
fn copy_symlink(from: &Path, to: &Path) -> std::io::Result<()> {
    let target = fs::read_link(from)?;
    if fs::metadata(from).map(|meta| meta.is_dir()).unwrap_or(false) {
        std::os::windows::fs::symlink_dir(target, to)
    } else {
        std::os::windows::fs::symlink_file(target, to)
    }
}

/// Relocation error types.
#[derive(Debug, thiserror::Error)]
pub enum RelocateError {
    /// Object cannot be renamed into place.
    #[error("failed to move {:?} to {:?}", from.display(), to.display())]
    Rename {
        #[source]
        source: std::io::Error,
        from: PathBuf,
        to: PathBuf,
    },

    /// Object cannot be copied across devices.
    #[error("failed to copy {:?} to {:?}", from.display(), to.display())]
    Copy {
        #[source]
        source: std::io::Error,
        from: PathBuf,
        to: PathBuf,
    },

    /// Directory tree cannot be walked for copying.
    #[error("failed to walk {:?}", path.display())]
    Walk {
        #[source]
        source: ignore::Error,
        path: PathBuf,
    },

    /// Source cannot be removed after a complete copy.
    #[error("copied {:?} but failed to remove it afterwards", path.display())]
    Remove {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },
}

impl RelocateError {
    /// Check if relocation failed from lack of permissions.
    pub fn is_permission_denied(&self) -> bool {
        match self {
            Self::Rename { source, .. } | Self::Copy { source, .. } | Self::Remove { source, .. } => {
                source.kind() == ErrorKind::PermissionDenied
            }
            Self::Walk { source, .. } => source
                .io_error()
                .is_some_and(|err| err.kind() == ErrorKind::PermissionDenied),
        }
    }
}

/// Friendly result alias :3
pub type Result<T, E = RelocateError> = std::result::Result<T, E>;
