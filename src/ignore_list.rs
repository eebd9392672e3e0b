// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Ignore list maintenance.
//!
//! Keep the archive directory out of version control by listing it in the
//! project's `.gitignore`. Existing content is never reordered or rewritten,
//! new patterns are only ever appended.

use std::{
    fs::{read_to_string, OpenOptions},
    io::{ErrorKind, Write},
    path::{Path, PathBuf},
};
use tracing::{debug, info, instrument};

/// File name of the ignore list under the project root.
pub const GITIGNORE_FILE_NAME: &str = ".gitignore";

/// Make sure ignore list of project root contains pattern.
///
/// Creates the ignore list if it does not exist yet. Returns whether the
/// ignore list was changed.
///
/// # Errors
///
/// - Return [`Error::ReadIgnoreFile`] if the existing ignore list cannot be
///   read.
/// - Return [`Error::WriteIgnoreFile`] if the pattern cannot be appended.
#[instrument(skip(root), level = "debug")]
pub fn ensure_ignored(root: impl AsRef<Path>, pattern: &str) -> Result<bool> {
    let ignore_path = root.as_ref().join(GITIGNORE_FILE_NAME);
    let content = match read_to_string(&ignore_path) {
        Ok(content) => content,
        Err(err) if err.kind() == ErrorKind::NotFound => String::new(),
        Err(err) => {
            return Err(Error::ReadIgnoreFile {
                source: err,
                ignore_path,
            })
        }
    };

    if content.lines().any(|line| line.trim() == pattern) {
        debug!("{pattern:?} already listed in {:?}", ignore_path.display());
        return Ok(false);
    }

    let write_err = |err| Error::WriteIgnoreFile {
        source: err,
        ignore_path: ignore_path.clone(),
    };

    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&ignore_path)
        .map_err(write_err)?;

    // INVARIANT: Never glue new pattern onto an unterminated last line.
    let mut addition = String::new();
    if !content.is_empty() && !content.ends_with('\n') {
        addition.push('\n');
    }
    addition.push_str(pattern);
    addition.push('\n');
    file.write_all(addition.as_bytes()).map_err(write_err)?;

    info!("add {pattern:?} to {:?}", ignore_path.display());
    Ok(true)
}

/// Ignore list error types.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Ignore list cannot be read from.
    #[error("failed to read from ignore file at {:?}", ignore_path.display())]
    ReadIgnoreFile {
        #[source]
        source: std::io::Error,
        ignore_path: PathBuf,
    },

    /// Ignore list cannot be written to.
    #[error("failed to write to ignore file at {:?}", ignore_path.display())]
    WriteIgnoreFile {
        #[source]
        source: std::io::Error,
        ignore_path: PathBuf,
    },
}

/// Friendly result alias :3
pub type Result<T, E = Error> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;
    use pretty_assertions::assert_eq;
    use sealed_test::prelude::*;
    use std::fs;

    #[sealed_test]
    fn create_ignore_file_when_missing() -> anyhow::Result<()> {
        assert!(ensure_ignored(".", "/archive/")?);
        assert_eq!(fs::read_to_string(".gitignore")?, "/archive/\n");

        Ok(())
    }

    #[sealed_test]
    fn append_after_unterminated_last_line() -> anyhow::Result<()> {
        fs::write(".gitignore", "target/\n*.log")?;

        assert!(ensure_ignored(".", "/archive/")?);
        let expect = indoc! {"
            target/
            *.log
            /archive/
        "};
        assert_eq!(fs::read_to_string(".gitignore")?, expect);

        Ok(())
    }

    #[sealed_test]
    fn no_duplicate_patterns() -> anyhow::Result<()> {
        fs::write(".gitignore", "/archive/\ntarget/\n")?;

        assert!(!ensure_ignored(".", "/archive/")?);
        assert_eq!(fs::read_to_string(".gitignore")?, "/archive/\ntarget/\n");

        Ok(())
    }
}
