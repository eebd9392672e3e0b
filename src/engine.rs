// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Archive manifest engine.
//!
//! The engine relocates filesystem objects out of a project tree into a
//! holding location called the __archive directory__, and records each
//! relocation in the [manifest](crate::manifest). Because every move is
//! recorded, every move can be undone.
//!
//! # Archiving
//!
//! Archiving an object that does not exist is not an error. Project trees
//! routinely lack some optional objects, e.g., a cache that was never created,
//! so a missing source is simply reported as skipped. A manifest record is
//! appended only after the object is fully present at its archived location.
//!
//! # Restoration
//!
//! Restoration walks the manifest forward and moves each archived object back
//! to its original location. Each entry is independent of the others:
//!
//! - An entry whose archived object no longer exists is skipped. This makes
//!   restoration idempotent, since a restored entry has no archived object
//!   left to move.
//! - An entry that fails is reported, and processing carries on with the
//!   next entry.
//! - Corrupt manifest lines are reported along with the rest.
//!
//! Only a missing or unreadable manifest file stops restoration as a whole.
//!
//! # Pitfalls
//!
//! No locking is performed. Interrupting a run between a move and its
//! manifest append leaves a relocation that is not recorded, and thus cannot
//! be restored by the engine.

pub mod relocate;

use crate::{
    engine::relocate::{FsRelocator, RelocateError, Relocator},
    manifest::{unix_timestamp, CorruptLine, Manifest, ManifestEntry, ManifestError, ManifestLog},
};

use std::{
    fs,
    io::ErrorKind,
    path::{Path, PathBuf},
};
use tracing::{debug, error, info, instrument, warn};

/// Default name of the archive directory under the project root.
pub const DEFAULT_ARCHIVE_DIR: &str = "archive";

/// Default name of the manifest file under the archive directory.
pub const DEFAULT_MANIFEST_NAME: &str = "MANIFEST";

/// Explicit context an engine operates in.
///
/// Relative paths handed to the engine are resolved against the project
/// root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveContext {
    root: PathBuf,
    archive_dir: PathBuf,
    manifest_path: PathBuf,
}

impl ArchiveContext {
    /// Construct new context for project root.
    ///
    /// Uses `<root>/archive` as the archive directory, and
    /// `<root>/archive/MANIFEST` as the manifest file.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let archive_dir = root.join(DEFAULT_ARCHIVE_DIR);
        let manifest_path = archive_dir.join(DEFAULT_MANIFEST_NAME);

        Self {
            root,
            archive_dir,
            manifest_path,
        }
    }

    /// Use a different archive directory.
    ///
    /// Keeps the manifest file name, but moves it under the new archive
    /// directory.
    pub fn with_archive_dir(mut self, archive_dir: impl AsRef<Path>) -> Self {
        let name = self
            .manifest_path
            .file_name()
            .map(ToOwned::to_owned)
            .unwrap_or_else(|| DEFAULT_MANIFEST_NAME.into());
        self.archive_dir = self.root.join(archive_dir);
        self.manifest_path = self.archive_dir.join(name);
        self
    }

    /// Use a different manifest file, relative to the project root.
    pub fn with_manifest_path(mut self, manifest_path: impl AsRef<Path>) -> Self {
        self.manifest_path = self.root.join(manifest_path);
        self
    }

    /// Resolve path against project root.
    pub fn resolve(&self, path: impl AsRef<Path>) -> PathBuf {
        self.root.join(path)
    }

    pub fn root(&self) -> &Path {
        self.root.as_path()
    }

    pub fn archive_dir(&self) -> &Path {
        self.archive_dir.as_path()
    }

    pub fn manifest_path(&self) -> &Path {
        self.manifest_path.as_path()
    }
}

/// Result of archiving a single object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArchiveOutcome {
    /// Object was moved, and its record appended to the manifest.
    Archived(ManifestEntry),

    /// Object to archive does not exist, nothing was done.
    SourceNotFound(PathBuf),
}

/// Result of restoring a single manifest entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestoreOutcome {
    /// Archived object was moved back to its original location.
    Restored,

    /// Archived object no longer exists, nothing was done.
    Skipped,
}

/// Summary of a batch archive run.
#[derive(Debug, Default)]
pub struct ArchiveReport {
    /// Entries appended to the manifest, in order.
    pub archived: Vec<ManifestEntry>,

    /// Sources that did not exist.
    pub skipped: Vec<PathBuf>,

    /// Sources that failed to archive.
    pub failed: Vec<(PathBuf, EngineError)>,
}

impl ArchiveReport {
    /// Record result of archiving object at `original`.
    pub fn record(&mut self, original: impl Into<PathBuf>, result: Result<ArchiveOutcome>) {
        match result {
            Ok(ArchiveOutcome::Archived(entry)) => self.archived.push(entry),
            Ok(ArchiveOutcome::SourceNotFound(path)) => self.skipped.push(path),
            Err(err) => {
                let original = original.into();
                error!("failed to archive {:?}: {err}", original.display());
                self.failed.push((original, err));
            }
        }
    }

    /// Check if every requested object was either archived or skipped.
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Summary of a restore run.
#[derive(Debug, Default)]
pub struct RestoreReport {
    /// Entries moved back to their original location.
    pub restored: Vec<ManifestEntry>,

    /// Entries whose archived object no longer exists.
    pub skipped: Vec<ManifestEntry>,

    /// Entries that failed to restore.
    pub failed: Vec<(ManifestEntry, EngineError)>,

    /// Manifest lines that could not be parsed.
    pub corrupt: Vec<CorruptLine>,
}

impl RestoreReport {
    /// Check if restoration went through without any failure or corrupt
    /// manifest line.
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty() && self.corrupt.is_empty()
    }
}

/// Archive manifest engine.
///
/// Relocates objects through a [`Relocator`], and records each relocation in
/// the manifest file of its [`ArchiveContext`].
#[derive(Debug)]
pub struct ArchiveEngine<R = FsRelocator>
where
    R: Relocator,
{
    context: ArchiveContext,
    relocator: R,
    log: ManifestLog,
}

impl ArchiveEngine<FsRelocator> {
    /// Construct new engine that relocates through the local filesystem.
    pub fn new(context: ArchiveContext) -> Self {
        Self::with_relocator(context, FsRelocator::new())
    }
}

impl<R> ArchiveEngine<R>
where
    R: Relocator,
{
    /// Construct new engine with custom relocation logic.
    pub fn with_relocator(context: ArchiveContext, relocator: R) -> Self {
        let log = ManifestLog::new(context.manifest_path());
        Self {
            context,
            relocator,
            log,
        }
    }

    pub fn context(&self) -> &ArchiveContext {
        &self.context
    }

    /// Archive object at `original_path` to `archived_path`.
    ///
    /// Creates missing ancestors of `archived_path`, moves the object, then
    /// appends one record to the manifest. Both paths are resolved against the
    /// project root, and recorded in their resolved form.
    ///
    /// # Errors
    ///
    /// - Return [`EngineError::Manifest`] if either path cannot be recorded
    ///   in the manifest, or the manifest cannot be appended to.
    /// - Return [`EngineError::DestinationConflict`] if `archived_path`
    ///   already exists.
    /// - Return [`EngineError::PermissionDenied`] or [`EngineError::Relocate`]
    ///   if the move itself fails.
    /// - Return [`EngineError::Io`] if either location cannot be inspected.
    #[instrument(skip(self, original_path, archived_path), level = "debug")]
    pub fn archive(
        &self,
        original_path: impl AsRef<Path>,
        archived_path: impl AsRef<Path>,
    ) -> Result<ArchiveOutcome> {
        let original = self.context.resolve(original_path);
        let archived = self.context.resolve(archived_path);

        if !exists(&original)? {
            warn!("skip {:?}, it does not exist", original.display());
            return Ok(ArchiveOutcome::SourceNotFound(original));
        }

        // INVARIANT: Validate record before touching the filesystem.
        let entry = ManifestEntry::new(&original, &archived, unix_timestamp())?;

        if exists(&archived)? {
            return Err(EngineError::DestinationConflict { path: archived });
        }

        create_parent_dirs(&archived)?;
        if let Err(err) = self.relocate(&original, &archived) {
            self.prune_empty_parents(&archived);
            return Err(err);
        }
        if let Err(err) = self.log.append(&entry) {
            error!(
                "moved {:?} to {:?}, but could not record it in manifest",
                original.display(),
                archived.display()
            );
            return Err(err.into());
        }

        info!("archive {:?} -> {:?}", original.display(), archived.display());
        Ok(ArchiveOutcome::Archived(entry))
    }

    /// Archive a batch of objects in order.
    ///
    /// Failures are collected into the returned report, and never stop the
    /// rest of the batch.
    pub fn archive_all<O, A>(&self, moves: impl IntoIterator<Item = (O, A)>) -> ArchiveReport
    where
        O: AsRef<Path>,
        A: AsRef<Path>,
    {
        let mut report = ArchiveReport::default();
        for (original, archived) in moves {
            let result = self.archive(&original, &archived);
            report.record(self.context.resolve(original), result);
        }

        report
    }

    /// Restore every entry of a manifest in forward order.
    ///
    /// Entries whose archived object no longer exists are skipped. Failing
    /// entries are reported without stopping restoration of the rest.
    pub fn restore_all(&self, manifest: &Manifest) -> RestoreReport {
        let mut report = RestoreReport {
            corrupt: manifest.corrupt_lines().to_vec(),
            ..Default::default()
        };

        for corrupt in &report.corrupt {
            error!("{corrupt}");
        }

        for entry in manifest {
            match self.restore_entry(entry) {
                Ok(RestoreOutcome::Restored) => report.restored.push(entry.clone()),
                Ok(RestoreOutcome::Skipped) => report.skipped.push(entry.clone()),
                Err(err) => {
                    error!(
                        "failed to restore {:?}: {err}",
                        entry.original_path().display()
                    );
                    report.failed.push((entry.clone(), err));
                }
            }
        }

        report
    }

    /// Load manifest of this engine's context, and restore all of it.
    ///
    /// # Errors
    ///
    /// - Return [`EngineError::Manifest`] if the manifest file is missing or
    ///   unreadable.
    pub fn restore_from_manifest(&self) -> Result<RestoreReport> {
        let manifest = self.load_manifest()?;
        Ok(self.restore_all(&manifest))
    }

    /// Load manifest of this engine's context.
    ///
    /// # Errors
    ///
    /// - Return [`EngineError::Manifest`] if the manifest file is missing or
    ///   unreadable.
    pub fn load_manifest(&self) -> Result<Manifest> {
        Ok(Manifest::load(self.context.manifest_path())?)
    }

    /// Restore a single manifest entry.
    ///
    /// # Errors
    ///
    /// - Return [`EngineError::DestinationConflict`] if the original location
    ///   is occupied.
    /// - Return [`EngineError::PermissionDenied`] or [`EngineError::Relocate`]
    ///   if the move itself fails.
    /// - Return [`EngineError::Io`] if either location cannot be inspected.
    #[instrument(skip(self, entry), level = "debug")]
    pub fn restore_entry(&self, entry: &ManifestEntry) -> Result<RestoreOutcome> {
        let archived = self.context.resolve(entry.archived_path());
        let original = self.context.resolve(entry.original_path());

        if !exists(&archived)? {
            debug!("skip {:?}, nothing archived there", archived.display());
            return Ok(RestoreOutcome::Skipped);
        }

        if exists(&original)? {
            return Err(EngineError::DestinationConflict { path: original });
        }

        create_parent_dirs(&original)?;
        self.relocate(&archived, &original)?;
        self.prune_empty_parents(&archived);

        info!("restore {:?} -> {:?}", archived.display(), original.display());
        Ok(RestoreOutcome::Restored)
    }

    fn relocate(&self, from: &Path, to: &Path) -> Result<()> {
        self.relocator.relocate(from, to).map_err(|err| {
            if err.is_permission_denied() {
                EngineError::PermissionDenied {
                    source: err,
                    path: from.to_path_buf(),
                }
            } else {
                EngineError::Relocate(err)
            }
        })
    }

    // Remove directories left empty inside the archive directory, stopping at
    // the archive directory itself.
    fn prune_empty_parents(&self, archived: &Path) {
        let archive_dir = self.context.archive_dir();
        let mut current = archived.parent();
        while let Some(dir) = current {
            if dir == archive_dir || !dir.starts_with(archive_dir) {
                break;
            }

            if fs::remove_dir(dir).is_err() {
                break;
            }

            debug!("prune empty directory {:?}", dir.display());
            current = dir.parent();
        }
    }
}

fn exists(path: &Path) -> Result<bool> {
    match fs::symlink_metadata(path) {
        Ok(_) => Ok(true),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(false),
        Err(err) => Err(EngineError::Io {
            source: err,
            path: path.to_path_buf(),
        }),
    }
}

fn create_parent_dirs(path: &Path) -> Result<()> {
    let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) else {
        return Ok(());
    };

    mkdirp::mkdirp(parent).map_err(|err| EngineError::Io {
        source: err,
        path: parent.to_path_buf(),
    })?;

    Ok(())
}

/// Archive engine error types.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Destination of a move is already occupied.
    #[error("destination {:?} already exists", path.display())]
    DestinationConflict { path: PathBuf },

    /// Move was refused by the filesystem for lack of permissions.
    #[error("permission denied while moving {:?}", path.display())]
    PermissionDenied {
        #[source]
        source: RelocateError,
        path: PathBuf,
    },

    /// Location cannot be inspected or prepared.
    #[error("failed to access {:?}", path.display())]
    Io {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Move failed.
    #[error(transparent)]
    Relocate(#[from] RelocateError),

    /// Manifest cannot be read, appended to, or cannot record a path.
    #[error(transparent)]
    Manifest(#[from] ManifestError),
}

/// Friendly result alias :3
pub type Result<T, E = EngineError> = std::result::Result<T, E>;
