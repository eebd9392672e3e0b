// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use reclaim::{
    config::{find_plan_file, ArchivePlan, PLAN_FILE_NAME},
    engine::{ArchiveEngine, ArchiveReport, RestoreReport},
    ignore_list::ensure_ignored,
    manifest::Manifest,
    path::relative_to,
    plan::{expand, PlannedMove},
    report::{
        disk_usage, format_size, render_report, render_restore_script, REPORT_FILE_NAME,
        RESTORE_SCRIPT_NAME,
    },
};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use inquire::Confirm;
use std::{
    fs::{read_to_string, write},
    path::{Path, PathBuf},
    process::exit,
};
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Debug, Clone, Parser)]
#[command(
    about,
    override_usage = "reclaim [options] <reclaim-command>",
    subcommand_help_heading = "Commands",
    version
)]
struct Cli {
    /// Project root to operate on.
    #[arg(short, long, global = true, value_name = "path")]
    pub root: Option<PathBuf>,

    /// Archive plan file to use instead of the default lookup.
    #[arg(short, long, global = true, value_name = "path")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    fn run(self) -> Result<()> {
        let root = match self.root {
            Some(root) => root,
            None => std::env::current_dir().context("cannot determine current directory")?,
        };
        let root = root
            .canonicalize()
            .with_context(|| format!("project root {:?} does not exist", root.display()))?;

        match self.command {
            Command::Init(opts) => run_init(&root, opts),
            Command::Plan(opts) => run_plan(&root, self.config, opts),
            Command::Archive(opts) => run_archive(&root, self.config, opts),
            Command::Restore(opts) => run_restore(&root, self.config, opts),
            Command::List => run_list(&root, self.config),
            Command::Report => run_report(&root, self.config),
        }
    }
}

#[derive(Debug, Clone, Subcommand)]
enum Command {
    /// Write default archive plan to project root.
    #[command(override_usage = "reclaim init [options]")]
    Init(InitOptions),

    /// Show what would be archived.
    #[command(override_usage = "reclaim plan [options] [<category>]...")]
    Plan(PlanOptions),

    /// Archive regeneratable content out of project tree.
    #[command(override_usage = "reclaim archive [options] [<category>]...")]
    Archive(ArchiveOptions),

    /// Restore everything recorded in the archive manifest.
    #[command(override_usage = "reclaim restore [options]")]
    Restore(RestoreOptions),

    /// List archive manifest entries in order.
    #[command(override_usage = "reclaim list [options]")]
    List,

    /// Print archive report to stdout.
    #[command(override_usage = "reclaim report [options]")]
    Report,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct InitOptions {
    /// Overwrite existing archive plan.
    #[arg(short, long)]
    pub force: bool,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct PlanOptions {
    /// Only consider these categories.
    #[arg(value_name = "category")]
    pub categories: Vec<String>,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct ArchiveOptions {
    /// Only archive these categories.
    #[arg(value_name = "category")]
    pub categories: Vec<String>,

    /// Do not ask for confirmation.
    #[arg(short, long)]
    pub yes: bool,

    /// Show what would be archived without moving anything.
    #[arg(short = 'n', long)]
    pub dry_run: bool,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct RestoreOptions {
    /// Do not ask for confirmation.
    #[arg(short, long)]
    pub yes: bool,
}

fn main() {
    let layer = fmt::layer()
        .compact()
        .with_target(false)
        .without_time();
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(layer)
        .with(filter)
        .init();

    if let Err(error) = run() {
        error!("{error:?}");
        exit(1);
    }

    exit(0)
}

fn run() -> Result<()> {
    Cli::parse().run()
}

fn load_plan(root: &Path, config: Option<PathBuf>) -> Result<ArchivePlan> {
    let Some(path) = config.or_else(|| find_plan_file(root)) else {
        info!("no archive plan found, use built-in defaults");
        return Ok(ArchivePlan::default());
    };

    info!("use archive plan {:?}", path.display());
    let content = read_to_string(&path)
        .with_context(|| format!("failed to read archive plan {:?}", path.display()))?;
    let plan = content
        .parse()
        .with_context(|| format!("invalid archive plan {:?}", path.display()))?;

    Ok(plan)
}

fn confirm(message: &str) -> Result<bool> {
    Ok(Confirm::new(message).with_default(false).prompt()?)
}

fn run_init(root: &Path, opts: InitOptions) -> Result<()> {
    let path = root.join(PLAN_FILE_NAME);
    if path.exists() && !opts.force {
        bail!("archive plan {:?} already exists, use --force to overwrite", path.display());
    }

    write(&path, ArchivePlan::default().to_string())
        .with_context(|| format!("failed to write archive plan {:?}", path.display()))?;
    info!("write default archive plan to {:?}", path.display());

    Ok(())
}

fn run_plan(root: &Path, config: Option<PathBuf>, opts: PlanOptions) -> Result<()> {
    let plan = load_plan(root, config)?;
    let context = plan.context(root);
    let moves = expand(&plan, &context, opts.categories.as_slice())?;
    print_moves(root, &moves);

    Ok(())
}

fn run_archive(root: &Path, config: Option<PathBuf>, opts: ArchiveOptions) -> Result<()> {
    let plan = load_plan(root, config)?;
    let context = plan.context(root);
    let moves = expand(&plan, &context, opts.categories.as_slice())?;

    if moves.is_empty() {
        info!("nothing to archive in {:?}", root.display());
        return Ok(());
    }

    print_moves(root, &moves);
    if opts.dry_run {
        return Ok(());
    }

    if !opts.yes && !confirm(&format!("Archive {} item(s)?", moves.len()))? {
        warn!("archive cancelled");
        return Ok(());
    }

    let engine = ArchiveEngine::new(context);
    let bar = ProgressBar::new(moves.len() as u64);
    bar.set_style(
        ProgressStyle::with_template("{elapsed_precise:.green}  {msg:<50}  [{wide_bar:.yellow/blue}]")?
            .progress_chars("-Cco."),
    );

    let mut report = ArchiveReport::default();
    for planned in &moves {
        bar.set_message(relative_to(&planned.original, root).display().to_string());
        let result = bar.suspend(|| engine.archive(&planned.original, &planned.archived));
        report.record(&planned.original, result);
        bar.inc(1);
    }
    bar.finish_and_clear();

    if !report.archived.is_empty() {
        write_artifacts(&engine)?;

        if plan.settings.update_gitignore {
            if let Some(pattern) = plan.settings.gitignore_pattern() {
                ensure_ignored(root, &pattern)?;
            }
        }
    }

    info!(
        "archived {}, skipped {}, failed {}",
        report.archived.len(),
        report.skipped.len(),
        report.failed.len()
    );

    if !report.is_clean() {
        bail!("{} item(s) failed to archive", report.failed.len());
    }

    Ok(())
}

fn write_artifacts(engine: &ArchiveEngine) -> Result<()> {
    let context = engine.context();
    let manifest = engine.load_manifest()?;

    let report_path = context.archive_dir().join(REPORT_FILE_NAME);
    write(&report_path, render_report(&manifest, context))
        .with_context(|| format!("failed to write report {:?}", report_path.display()))?;

    let script_path = context.archive_dir().join(RESTORE_SCRIPT_NAME);
    write(&script_path, render_restore_script(&manifest))
        .with_context(|| format!("failed to write restore script {:?}", script_path.display()))?;

    #[cfg(unix)]
    {
        use std::{
            fs::{set_permissions, Permissions},
            os::unix::fs::PermissionsExt,
        };
        set_permissions(&script_path, Permissions::from_mode(0o755))
            .with_context(|| format!("failed to mark {:?} executable", script_path.display()))?;
    }

    info!("write report to {:?}", report_path.display());
    Ok(())
}

fn run_restore(root: &Path, config: Option<PathBuf>, opts: RestoreOptions) -> Result<()> {
    let plan = load_plan(root, config)?;
    let engine = ArchiveEngine::new(plan.context(root));
    let manifest = engine.load_manifest()?;

    if manifest.is_empty() && manifest.corrupt_lines().is_empty() {
        info!("manifest is empty, nothing to restore");
        return Ok(());
    }

    if !opts.yes && !confirm(&format!("Restore {} item(s)?", manifest.len()))? {
        warn!("restore cancelled");
        return Ok(());
    }

    let report = engine.restore_all(&manifest);
    print_restore_report(root, &report);

    if !report.is_clean() {
        bail!(
            "{} item(s) failed to restore, {} corrupt manifest line(s)",
            report.failed.len(),
            report.corrupt.len()
        );
    }

    Ok(())
}

fn run_list(root: &Path, config: Option<PathBuf>) -> Result<()> {
    let plan = load_plan(root, config)?;
    let manifest = Manifest::load(plan.context(root).manifest_path())?;

    for entry in &manifest {
        println!(
            "{} -> {}  ({})",
            relative_to(entry.original_path(), root).display(),
            relative_to(entry.archived_path(), root).display(),
            entry.timestamp()
        );
    }

    for corrupt in manifest.corrupt_lines() {
        warn!("{corrupt}");
    }

    Ok(())
}

fn run_report(root: &Path, config: Option<PathBuf>) -> Result<()> {
    let plan = load_plan(root, config)?;
    let context = plan.context(root);
    let manifest = Manifest::load(context.manifest_path())?;
    print!("{}", render_report(&manifest, &context));

    Ok(())
}

fn print_moves(root: &Path, moves: &[PlannedMove]) {
    let mut total = 0;
    for planned in moves {
        let size = disk_usage(&planned.original).unwrap_or_default();
        total += size;
        println!(
            "{:<16} {:>10}  {} -> {}",
            planned.category,
            format_size(size),
            relative_to(&planned.original, root).display(),
            relative_to(&planned.archived, root).display()
        );
    }
    println!("{} item(s), {} total", moves.len(), format_size(total));
}

fn print_restore_report(root: &Path, report: &RestoreReport) {
    for entry in &report.restored {
        println!("restored  {}", relative_to(entry.original_path(), root).display());
    }

    for entry in &report.skipped {
        println!("skipped   {}", relative_to(entry.original_path(), root).display());
    }

    for (entry, err) in &report.failed {
        println!(
            "failed    {}: {err}",
            relative_to(entry.original_path(), root).display()
        );
    }

    for corrupt in &report.corrupt {
        println!("corrupt   {corrupt}");
    }
}
