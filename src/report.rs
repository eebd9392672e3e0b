// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Human-readable output derived from the manifest.
//!
//! Two artifacts are generated next to the manifest after an archive run: a
//! Markdown report summarizing what was archived, and a POSIX shell script
//! that can restore everything without Reclaim being installed. Both only
//! ever read the manifest. Neither is meant to be parsed back.

use crate::{
    engine::ArchiveContext,
    manifest::{Manifest, ManifestEntry},
    path::relative_to,
};

use ignore::WalkBuilder;
use std::{
    fmt::Write,
    fs,
    path::{Component, Path},
};

/// File name of the generated report under the archive directory.
pub const REPORT_FILE_NAME: &str = "REPORT.md";

/// File name of the generated restore script under the archive directory.
pub const RESTORE_SCRIPT_NAME: &str = "restore.sh";

/// Render Markdown summary of a manifest.
///
/// Entries are grouped by the category directory they were archived into, in
/// order of first appearance. Sizes are measured from the archived objects as
/// they are right now.
pub fn render_report(manifest: &Manifest, context: &ArchiveContext) -> String {
    let root = context.root();
    let mut out = String::new();
    let mut total = 0;

    let _ = writeln!(out, "# Archive report\n");
    let _ = writeln!(
        out,
        "{} item(s) on record in `{}`.\n",
        manifest.len(),
        relative_to(context.manifest_path(), root).display()
    );

    let mut groups: Vec<(String, Vec<&ManifestEntry>)> = Vec::new();
    for entry in manifest {
        let category = category_of(entry, context);
        match groups.iter_mut().find(|(name, _)| *name == category) {
            Some((_, entries)) => entries.push(entry),
            None => groups.push((category, vec![entry])),
        }
    }

    for (category, entries) in &groups {
        let _ = writeln!(out, "## {category}\n");
        let _ = writeln!(out, "| Original | Archived | Size | Archived at |");
        let _ = writeln!(out, "| --- | --- | --- | --- |");
        for entry in entries {
            let archived = context.resolve(entry.archived_path());
            let size = match disk_usage(&archived) {
                Some(bytes) => {
                    total += bytes;
                    format_size(bytes)
                }
                None => "missing".into(),
            };
            let _ = writeln!(
                out,
                "| `{}` | `{}` | {} | {} |",
                relative_to(entry.original_path(), root).display(),
                relative_to(entry.archived_path(), root).display(),
                size,
                entry.timestamp()
            );
        }
        let _ = writeln!(out);
    }

    if !manifest.corrupt_lines().is_empty() {
        let _ = writeln!(out, "## Corrupt manifest lines\n");
        for corrupt in manifest.corrupt_lines() {
            let _ = writeln!(
                out,
                "- line {} ({}): `{}`",
                corrupt.line, corrupt.reason, corrupt.content
            );
        }
        let _ = writeln!(out);
    }

    let _ = writeln!(out, "Total archived size: {}.\n", format_size(total));
    let _ = writeln!(
        out,
        "Restore everything with `reclaim restore`, or `sh {}`.",
        relative_to(&context.archive_dir().join(RESTORE_SCRIPT_NAME), root).display()
    );

    out
}

/// Render POSIX shell script that restores every manifest entry.
///
/// The script mirrors restoration semantics of the engine: missing archived
/// objects are skipped, occupied original locations are reported, and the
/// script keeps going on failure. Its exit status is non-zero if any entry
/// failed.
pub fn render_restore_script(manifest: &Manifest) -> String {
    let mut out = String::from(
        r#"#!/bin/sh
# Restore content archived by reclaim.
# Generated from the archive manifest, safe to run more than once.
set -u

status=0

restore() {
    if [ ! -e "$2" ] && [ ! -L "$2" ]; then
        return 0
    fi
    if [ -e "$1" ] || [ -L "$1" ]; then
        echo "skip $1: destination already exists" >&2
        status=1
        return 0
    fi
    if mkdir -p "$(dirname "$1")" && mv "$2" "$1"; then
        echo "restored $1"
    else
        status=1
    fi
}

"#,
    );

    for entry in manifest {
        let _ = writeln!(
            out,
            "restore {} {}",
            shell_quote(&entry.original_path().to_string_lossy()),
            shell_quote(&entry.archived_path().to_string_lossy())
        );
    }

    out.push_str("\nexit \"$status\"\n");
    out
}

/// Total size in bytes of everything at path.
///
/// Symbolic links count as their own size, and are never followed. Returns
/// nothing if path does not exist.
pub fn disk_usage(path: impl AsRef<Path>) -> Option<u64> {
    let path = path.as_ref();
    let metadata = fs::symlink_metadata(path).ok()?;
    if !metadata.is_dir() {
        return Some(metadata.len());
    }

    let total = WalkBuilder::new(path)
        .standard_filters(false)
        .hidden(false)
        .follow_links(false)
        .build()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_some_and(|kind| !kind.is_dir()))
        .filter_map(|entry| fs::symlink_metadata(entry.path()).ok())
        .map(|metadata| metadata.len())
        .sum();

    Some(total)
}

/// Format byte count with binary unit suffix.
pub fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["KiB", "MiB", "GiB", "TiB", "PiB"];

    if bytes < 1024 {
        return format!("{bytes} B");
    }

    let mut size = bytes as f64 / 1024.0;
    let mut unit = UNITS[0];
    for next in &UNITS[1..] {
        if size < 1024.0 {
            break;
        }
        size /= 1024.0;
        unit = *next;
    }

    format!("{size:.1} {unit}")
}

fn category_of(entry: &ManifestEntry, context: &ArchiveContext) -> String {
    context
        .resolve(entry.archived_path())
        .strip_prefix(context.archive_dir())
        .ok()
        .and_then(|relative| match relative.components().next() {
            Some(Component::Normal(name)) if relative.components().count() > 1 => {
                Some(name.to_string_lossy().into_owned())
            }
            _ => None,
        })
        .unwrap_or_else(|| "uncategorized".into())
}

fn shell_quote(text: &str) -> String {
    format!("'{}'", text.replace('\'', r"'\''"))
}
