// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Archive manifest format.
//!
//! Every relocation performed by the archive engine is recorded in the
//! __manifest__, a flat append-only text file. Each line holds exactly one
//! record:
//!
//! ```text
//! <original_path>|<archived_path>|<unix_timestamp>
//! ```
//!
//! There is no header and no trailing metadata. Records appear in the order
//! archiving occurred. Blank lines are tolerated and ignored.
//!
//! A malformed line never poisons the rest of the file. Loading a manifest
//! keeps every well-formed record, and sets aside each corrupt line along with
//! its line number so the caller can report it.

use std::{
    fmt::{Display, Formatter, Result as FmtResult},
    fs::{read, OpenOptions},
    io::Write,
    path::{Path, PathBuf},
    slice::Iter,
    time::{SystemTime, UNIX_EPOCH},
};
use tracing::{debug, instrument, warn};

/// Reserved character separating the fields of a manifest record.
pub const SEPARATOR: char = '|';

/// Single relocation record.
///
/// # Invariant
///
/// - Neither path contains [`SEPARATOR`] or a line break.
/// - Both paths are valid UTF-8 and non-empty.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ManifestEntry {
    original_path: PathBuf,
    archived_path: PathBuf,
    timestamp: u64,
}

impl ManifestEntry {
    /// Construct new manifest entry.
    ///
    /// # Errors
    ///
    /// - Return [`ManifestError::InvalidPath`] if either path cannot be
    ///   represented in the manifest format.
    pub fn new(
        original_path: impl Into<PathBuf>,
        archived_path: impl Into<PathBuf>,
        timestamp: u64,
    ) -> Result<Self> {
        let original_path = original_path.into();
        let archived_path = archived_path.into();
        validate_path(&original_path)?;
        validate_path(&archived_path)?;

        Ok(Self {
            original_path,
            archived_path,
            timestamp,
        })
    }

    /// Location of the object before it was archived.
    pub fn original_path(&self) -> &Path {
        self.original_path.as_path()
    }

    /// Location of the object after it was archived.
    pub fn archived_path(&self) -> &Path {
        self.archived_path.as_path()
    }

    /// Seconds since the Unix epoch at time of archiving.
    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }
}

impl Display for ManifestEntry {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        // INVARIANT: Paths were validated as UTF-8 on construction.
        write!(
            fmt,
            "{}{SEPARATOR}{}{SEPARATOR}{}",
            self.original_path.to_string_lossy(),
            self.archived_path.to_string_lossy(),
            self.timestamp
        )
    }
}

/// Serialize manifest entry into one manifest line without line terminator.
pub fn serialize_entry(entry: &ManifestEntry) -> String {
    entry.to_string()
}

/// Parse one manifest line.
///
/// The `line_number` is one-based, and is only used to identify the offending
/// line in the returned error.
///
/// # Errors
///
/// - Return [`ManifestError::Corrupt`] if the line does not hold exactly three
///   fields, holds an empty path, or its timestamp is not a base-10 integer.
pub fn parse_entry(line_number: usize, line: &str) -> Result<ManifestEntry> {
    Ok(parse_line(line_number, line)?)
}

fn parse_line(line_number: usize, line: &str) -> Result<ManifestEntry, CorruptLine> {
    let corrupt = |reason| CorruptLine {
        line: line_number,
        content: line.to_owned(),
        reason,
    };

    let fields = line.split(SEPARATOR).collect::<Vec<_>>();
    let [original, archived, timestamp] = fields.as_slice() else {
        return Err(corrupt(CorruptReason::FieldCount(fields.len())));
    };

    if original.is_empty() || archived.is_empty() {
        return Err(corrupt(CorruptReason::EmptyPath));
    }

    let timestamp = timestamp
        .parse::<u64>()
        .map_err(|_| corrupt(CorruptReason::Timestamp(timestamp.to_string())))?;

    Ok(ManifestEntry {
        original_path: PathBuf::from(original),
        archived_path: PathBuf::from(archived),
        timestamp,
    })
}

/// Ordered listing of manifest entries.
///
/// Holds every well-formed record in file order, plus every corrupt line that
/// was skipped while parsing.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Manifest {
    entries: Vec<ManifestEntry>,
    corrupt: Vec<CorruptLine>,
}

impl Manifest {
    /// Construct new empty manifest.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse manifest content.
    ///
    /// Never fails as a whole. Corrupt lines are collected, and can be
    /// inspected through [`Manifest::corrupt_lines`].
    pub fn parse(content: &str) -> Self {
        Self::parse_bytes(content.as_bytes())
    }

    /// Parse raw manifest content.
    ///
    /// Same as [`Manifest::parse`], except that a line which is not valid
    /// UTF-8 is set aside as corrupt instead of failing the whole manifest.
    pub fn parse_bytes(content: &[u8]) -> Self {
        let mut manifest = Self::new();
        for (index, raw) in content.split(|byte| *byte == b'\n').enumerate() {
            let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
            let parsed = match std::str::from_utf8(raw) {
                Ok(line) if line.trim().is_empty() => continue,
                Ok(line) => parse_line(index + 1, line),
                Err(_) => Err(CorruptLine {
                    line: index + 1,
                    content: String::from_utf8_lossy(raw).into_owned(),
                    reason: CorruptReason::Encoding,
                }),
            };

            match parsed {
                Ok(entry) => manifest.entries.push(entry),
                Err(corrupt) => {
                    warn!("{corrupt}");
                    manifest.corrupt.push(corrupt);
                }
            }
        }

        manifest
    }

    /// Load manifest from file.
    ///
    /// # Errors
    ///
    /// - Return [`ManifestError::Read`] if the manifest file is missing or
    ///   cannot be read.
    #[instrument(skip(path), level = "debug")]
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        debug!("load manifest {:?}", path.display());
        let content = read(path).map_err(|err| ManifestError::Read {
            source: err,
            path: path.to_path_buf(),
        })?;

        Ok(Self::parse_bytes(&content))
    }

    /// Well-formed entries in archiving order.
    pub fn entries(&self) -> &[ManifestEntry] {
        self.entries.as_slice()
    }

    /// Lines that failed to parse.
    pub fn corrupt_lines(&self) -> &[CorruptLine] {
        self.corrupt.as_slice()
    }

    pub fn iter(&self) -> Iter<'_, ManifestEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<'a> IntoIterator for &'a Manifest {
    type Item = &'a ManifestEntry;
    type IntoIter = Iter<'a, ManifestEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

impl FromIterator<ManifestEntry> for Manifest {
    fn from_iter<I: IntoIterator<Item = ManifestEntry>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
            corrupt: Vec::new(),
        }
    }
}

impl Display for Manifest {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        for entry in &self.entries {
            writeln!(fmt, "{entry}")?;
        }

        Ok(())
    }
}

/// Append-only writer for a manifest file.
///
/// The file and its parent directories are created on first append, so a run
/// that archives nothing leaves no manifest behind.
#[derive(Debug, Clone)]
pub struct ManifestLog {
    path: PathBuf,
}

impl ManifestLog {
    /// Construct new manifest writer for target file.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Append one entry as a new line, and flush it to disk.
    ///
    /// # Errors
    ///
    /// - Return [`ManifestError::Append`] if the manifest file cannot be
    ///   created, opened, or written to.
    #[instrument(skip(self, entry), level = "debug")]
    pub fn append(&self, entry: &ManifestEntry) -> Result<()> {
        let append_err = |err| ManifestError::Append {
            source: err,
            path: self.path.clone(),
        };

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            mkdirp::mkdirp(parent).map_err(append_err)?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(append_err)?;
        writeln!(file, "{entry}").map_err(append_err)?;
        file.sync_data().map_err(append_err)?;
        debug!("append {entry:?} to {:?}", self.path.display());

        Ok(())
    }
}

/// Current time as seconds since the Unix epoch.
pub fn unix_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs())
        .unwrap_or_default()
}

fn validate_path(path: &Path) -> Result<()> {
    let invalid = |reason| ManifestError::InvalidPath {
        path: path.to_path_buf(),
        reason,
    };

    let Some(text) = path.to_str() else {
        return Err(invalid("path is not valid UTF-8"));
    };

    if text.is_empty() {
        return Err(invalid("path is empty"));
    }

    if text.contains(SEPARATOR) {
        return Err(invalid("path contains manifest field separator '|'"));
    }

    if text.contains(['\n', '\r']) {
        return Err(invalid("path contains a line break"));
    }

    Ok(())
}

/// Manifest line that failed to parse.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("manifest line {line} is corrupt ({reason}): {content:?}")]
pub struct CorruptLine {
    /// One-based line number in the manifest file.
    pub line: usize,

    /// Raw content of the line.
    pub content: String,

    /// Why the line was rejected.
    pub reason: CorruptReason,
}

/// Reason a manifest line was rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CorruptReason {
    #[error("expected 3 fields, found {0}")]
    FieldCount(usize),

    #[error("timestamp {0:?} is not a base-10 integer")]
    Timestamp(String),

    #[error("empty path field")]
    EmptyPath,

    #[error("line is not valid UTF-8")]
    Encoding,
}

/// Manifest error types.
#[derive(Debug, thiserror::Error)]
pub enum ManifestError {
    /// Manifest line cannot be parsed.
    #[error(transparent)]
    Corrupt(#[from] CorruptLine),

    /// Path cannot be represented in the manifest format.
    #[error("path {:?} cannot be recorded in manifest: {reason}", path.display())]
    InvalidPath { path: PathBuf, reason: &'static str },

    /// Manifest file cannot be read.
    #[error("failed to read manifest at {:?}", path.display())]
    Read {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Manifest file cannot be appended to.
    #[error("failed to append to manifest at {:?}", path.display())]
    Append {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },
}

/// Friendly result alias :3
pub type Result<T, E = ManifestError> = std::result::Result<T, E>;
