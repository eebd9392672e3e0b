// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use crate::{DenyRelocator, TreeFixture};

use anyhow::Result;
use pretty_assertions::assert_eq;
use reclaim::{
    config::ArchivePlan,
    engine::{ArchiveContext, ArchiveEngine, ArchiveOutcome, EngineError},
    manifest::{unix_timestamp, Manifest, ManifestError},
    plan::expand,
};
use sealed_test::prelude::*;
use std::fs;

#[sealed_test]
fn archive_moves_object_and_appends_entry() -> Result<()> {
    let tree = TreeFixture::here()?;
    tree.write(".venv/pyvenv.cfg", "home = /usr/bin")?;
    tree.write(".venv/lib/site.py", "import os")?;
    let engine = ArchiveEngine::new(ArchiveContext::new(tree.root()));

    let before = unix_timestamp();
    let outcome = engine.archive(tree.path(".venv"), tree.path("archive/virtual-envs/.venv"))?;
    let after = unix_timestamp();

    let ArchiveOutcome::Archived(entry) = outcome else {
        panic!("expected archived outcome, got {outcome:?}");
    };
    assert!(!tree.path(".venv").exists());
    assert_eq!(tree.read("archive/virtual-envs/.venv/pyvenv.cfg")?, "home = /usr/bin");
    assert_eq!(tree.read("archive/virtual-envs/.venv/lib/site.py")?, "import os");
    assert!(before <= entry.timestamp() && entry.timestamp() <= after);

    let result = tree.read("archive/MANIFEST")?;
    let expect = format!(
        "{root}/.venv|{root}/archive/virtual-envs/.venv|{ts}\n",
        root = tree.root().display(),
        ts = entry.timestamp()
    );
    assert_eq!(result, expect);

    Ok(())
}

#[sealed_test]
fn archive_resolves_relative_paths_against_root() -> Result<()> {
    let tree = TreeFixture::here()?;
    tree.write("node_modules/left-pad/index.js", "module.exports = pad")?;
    let engine = ArchiveEngine::new(ArchiveContext::new(tree.root()));

    engine.archive("node_modules", "archive/dependencies/node_modules")?;

    let manifest = Manifest::load(tree.path("archive/MANIFEST"))?;
    assert_eq!(manifest.len(), 1);
    assert_eq!(manifest.entries()[0].original_path(), tree.path("node_modules"));
    assert_eq!(
        manifest.entries()[0].archived_path(),
        tree.path("archive/dependencies/node_modules")
    );

    Ok(())
}

#[sealed_test]
fn archive_missing_source_is_skipped() -> Result<()> {
    let tree = TreeFixture::here()?;
    let engine = ArchiveEngine::new(ArchiveContext::new(tree.root()));

    let outcome = engine.archive(".mypy_cache", "archive/build-caches/.mypy_cache")?;

    assert_eq!(outcome, ArchiveOutcome::SourceNotFound(tree.path(".mypy_cache")));
    assert!(!tree.path("archive/build-caches/.mypy_cache").exists());
    assert!(!tree.path("archive/MANIFEST").exists());

    Ok(())
}

#[sealed_test]
fn archive_refuses_occupied_destination() -> Result<()> {
    let tree = TreeFixture::here()?;
    tree.write(".cache/blob", "new")?;
    tree.write("archive/runtime-state/.cache/blob", "old")?;
    let engine = ArchiveEngine::new(ArchiveContext::new(tree.root()));

    let result = engine.archive(".cache", "archive/runtime-state/.cache");

    assert!(matches!(result, Err(EngineError::DestinationConflict { .. })));
    assert_eq!(tree.read(".cache/blob")?, "new");
    assert_eq!(tree.read("archive/runtime-state/.cache/blob")?, "old");
    assert!(!tree.path("archive/MANIFEST").exists());

    Ok(())
}

#[sealed_test]
fn archive_refuses_path_containing_separator() -> Result<()> {
    let tree = TreeFixture::here()?;
    tree.write("odd|name/file", "content")?;
    let engine = ArchiveEngine::new(ArchiveContext::new(tree.root()));

    let result = engine.archive("odd|name", "archive/runtime-state/odd|name");

    assert!(matches!(
        result,
        Err(EngineError::Manifest(ManifestError::InvalidPath { .. }))
    ));
    assert_eq!(tree.read("odd|name/file")?, "content");
    assert!(!tree.path("archive").exists());

    Ok(())
}

#[sealed_test]
fn archive_all_continues_past_failures() -> Result<()> {
    let tree = TreeFixture::here()?;
    tree.write(".venv/pyvenv.cfg", "venv")?;
    tree.write("node_modules/pkg.json", "{}")?;
    tree.write(".cache/blob", "cache")?;
    let engine = ArchiveEngine::with_relocator(
        ArchiveContext::new(tree.root()),
        DenyRelocator::new(tree.path("node_modules")),
    );

    let report = engine.archive_all([
        (".venv", "archive/virtual-envs/.venv"),
        ("node_modules", "archive/dependencies/node_modules"),
        ("tmp", "archive/runtime-state/tmp"),
        (".cache", "archive/runtime-state/.cache"),
    ]);

    assert_eq!(report.archived.len(), 2);
    assert_eq!(report.skipped, vec![tree.path("tmp")]);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].0, tree.path("node_modules"));
    assert!(matches!(
        report.failed[0].1,
        EngineError::PermissionDenied { .. }
    ));
    assert!(!report.is_clean());
    assert_eq!(tree.read("node_modules/pkg.json")?, "{}");

    let manifest = Manifest::load(tree.path("archive/MANIFEST"))?;
    let originals = manifest
        .iter()
        .map(|entry| entry.original_path().to_path_buf())
        .collect::<Vec<_>>();
    assert_eq!(originals, vec![tree.path(".venv"), tree.path(".cache")]);

    Ok(())
}

#[sealed_test]
fn archive_failure_leaves_no_stray_directories() -> Result<()> {
    let tree = TreeFixture::here()?;
    tree.write("node_modules/pkg.json", "{}")?;
    let engine = ArchiveEngine::with_relocator(
        ArchiveContext::new(tree.root()),
        DenyRelocator::new(tree.path("node_modules")),
    );

    let result = engine.archive("node_modules", "archive/dependencies/scoped/node_modules");

    assert!(matches!(result, Err(EngineError::PermissionDenied { .. })));
    assert!(!tree.path("archive/dependencies").exists());
    assert!(!tree.path("archive/MANIFEST").exists());
    assert_eq!(tree.read("node_modules/pkg.json")?, "{}");

    Ok(())
}

#[sealed_test]
fn archive_expanded_plan() -> Result<()> {
    let tree = TreeFixture::here()?;
    tree.write(".venv/pyvenv.cfg", "venv")?;
    tree.write("src/app/__pycache__/mod.pyc", "bytecode")?;
    tree.write("src/app/mod.py", "print()")?;

    let plan = ArchivePlan::default();
    let context = plan.context(tree.root());
    let moves = expand(&plan, &context, &[] as &[&str])?;
    let engine = ArchiveEngine::new(context);
    let report = engine.archive_all(
        moves
            .iter()
            .map(|planned| (&planned.original, &planned.archived)),
    );

    assert!(report.is_clean());
    assert_eq!(report.archived.len(), 2);
    assert_eq!(tree.read("archive/virtual-envs/.venv/pyvenv.cfg")?, "venv");
    assert_eq!(
        tree.read("archive/build-caches/src/app/__pycache__/mod.pyc")?,
        "bytecode"
    );
    assert_eq!(tree.read("src/app/mod.py")?, "print()");
    assert!(!tree.path("src/app/__pycache__").exists());
    assert!(fs::metadata(tree.path("archive/MANIFEST"))?.is_file());

    Ok(())
}
