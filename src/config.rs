// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Configuration layout.
//!
//! Specify the layout of the archive plan file that Reclaim uses to decide
//! what gets archived, and where it goes. File I/O is left to the caller to
//! figure out.

use crate::engine::{ArchiveContext, DEFAULT_ARCHIVE_DIR, DEFAULT_MANIFEST_NAME};

use serde::{Deserialize, Serialize};
use std::{
    fmt::{Display, Error as FmtError, Formatter, Result as FmtResult},
    path::{Path, PathBuf},
    str::FromStr,
};

/// Default file name of a project-local archive plan.
pub const PLAN_FILE_NAME: &str = "reclaim.toml";

/// Archive plan layout.
///
/// An __archive plan__ lists regeneratable content of a project tree by
/// category. Each category owns a set of glob patterns relative to the project
/// root, and a subdirectory of the archive directory that matching content is
/// moved into.
///
/// # General Layout
///
/// ```toml
/// [settings]
/// archive_dir = "archive"
/// manifest = "MANIFEST"
/// update_gitignore = true
///
/// [[category]]
/// name = "virtual-envs"
/// description = "Python virtual environments"
/// paths = [".venv", "venv"]
/// ```
#[derive(Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
pub struct ArchivePlan {
    /// Settings for the archive run.
    #[serde(default)]
    pub settings: PlanSettings,

    /// Categories of content to archive.
    #[serde(rename = "category", default)]
    pub categories: Vec<Category>,
}

impl ArchivePlan {
    /// Construct archive context for project root from plan settings.
    pub fn context(&self, root: impl Into<PathBuf>) -> ArchiveContext {
        ArchiveContext::new(root)
            .with_archive_dir(&self.settings.archive_dir)
            .with_manifest_path(self.settings.archive_dir.join(&self.settings.manifest))
    }

    /// Find category by name.
    pub fn category(&self, name: impl AsRef<str>) -> Option<&Category> {
        self.categories
            .iter()
            .find(|category| category.name == name.as_ref())
    }
}

impl Default for ArchivePlan {
    fn default() -> Self {
        let category = |name: &str, description: &str, paths: &[&str]| Category {
            name: name.into(),
            description: Some(description.into()),
            paths: paths.iter().map(|path| path.to_string()).collect(),
        };

        Self {
            settings: PlanSettings::default(),
            categories: vec![
                category(
                    "dependencies",
                    "Installed package dependencies",
                    &["node_modules", "vendor/bundle", ".yarn/cache"],
                ),
                category(
                    "virtual-envs",
                    "Python virtual environments",
                    &[".venv", "venv", "env"],
                ),
                category(
                    "build-caches",
                    "Compiler, linter, and test runner caches",
                    &[
                        "**/__pycache__",
                        ".pytest_cache",
                        ".mypy_cache",
                        ".ruff_cache",
                        ".next/cache",
                        ".parcel-cache",
                        ".turbo",
                    ],
                ),
                category(
                    "runtime-state",
                    "Runtime caches, scratch files, and logs",
                    &[".cache", "tmp", "logs"],
                ),
                category(
                    "documentation",
                    "Generated documentation",
                    &["site", "docs/_build"],
                ),
            ],
        }
    }
}

impl FromStr for ArchivePlan {
    type Err = ConfigError;

    fn from_str(data: &str) -> Result<Self, Self::Err> {
        let mut plan: ArchivePlan = toml::from_str(data).map_err(ConfigError::Deserialize)?;

        // INVARIANT: Perform shell expansion on archive directory field.
        plan.settings.archive_dir = PathBuf::from(
            shellexpand::full(plan.settings.archive_dir.to_string_lossy().as_ref())
                .map_err(ConfigError::ShellExpansion)?
                .into_owned(),
        );

        for category in &plan.categories {
            if category.name.is_empty() || category.name.contains(['/', '\\']) {
                return Err(ConfigError::InvalidCategoryName(category.name.clone()));
            }
        }

        Ok(plan)
    }
}

impl Display for ArchivePlan {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(
            toml::to_string_pretty(self)
                .map_err(ConfigError::Serialize)?
                .as_str(),
        )
    }
}

/// Archive run settings.
#[derive(Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PlanSettings {
    /// Directory to move archived content into, relative to project root if
    /// relative.
    pub archive_dir: PathBuf,

    /// Manifest file name, relative to the archive directory.
    pub manifest: PathBuf,

    /// Add the archive directory to the project's `.gitignore`.
    pub update_gitignore: bool,
}

impl Default for PlanSettings {
    fn default() -> Self {
        Self {
            archive_dir: PathBuf::from(DEFAULT_ARCHIVE_DIR),
            manifest: PathBuf::from(DEFAULT_MANIFEST_NAME),
            update_gitignore: true,
        }
    }
}

impl PlanSettings {
    /// Pattern to add to `.gitignore` for the archive directory.
    ///
    /// Returns nothing if the archive directory lives outside of the project
    /// root.
    pub fn gitignore_pattern(&self) -> Option<String> {
        if self.archive_dir.is_absolute() {
            return None;
        }

        let dir = self.archive_dir.to_string_lossy();
        let dir = dir.trim_start_matches("./").trim_end_matches('/');
        if dir.is_empty() || dir.starts_with("..") {
            return None;
        }

        Some(format!("/{dir}/"))
    }
}

/// Category of content to archive.
#[derive(Default, Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
pub struct Category {
    /// Name of category, also used as subdirectory of the archive directory.
    pub name: String,

    /// Brief description of what the category holds.
    pub description: Option<String>,

    /// Glob patterns relative to the project root.
    pub paths: Vec<String>,
}

/// Locate archive plan file for project root.
///
/// Prefers `<root>/reclaim.toml`, then the user-wide plan at
/// `$XDG_CONFIG_HOME/reclaim/config.toml`. Returns nothing if neither exists.
pub fn find_plan_file(root: impl AsRef<Path>) -> Option<PathBuf> {
    let local = root.as_ref().join(PLAN_FILE_NAME);
    if local.is_file() {
        return Some(local);
    }

    crate::path::default_plan_file()
        .ok()
        .filter(|path| path.is_file())
}

/// Configuration error types.
#[derive(Clone, Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to deserialize configuration.
    #[error(transparent)]
    Deserialize(#[from] toml::de::Error),

    /// Failed to serialize configuration.
    #[error(transparent)]
    Serialize(#[from] toml::ser::Error),

    /// Failed to perform shell expansion on configuration.
    #[error(transparent)]
    ShellExpansion(#[from] shellexpand::LookupError<std::env::VarError>),

    /// Category name cannot be used as a directory name.
    #[error("invalid category name {0:?}")]
    InvalidCategoryName(String),
}

impl From<ConfigError> for FmtError {
    fn from(_: ConfigError) -> Self {
        FmtError
    }
}

/// Friendly result alias :3
type Result<T, E = ConfigError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use sealed_test::prelude::*;
    use simple_test_case::test_case;

    #[sealed_test(env = [("ATTIC", "/mnt/attic")])]
    fn deserialize_archive_plan() -> anyhow::Result<()> {
        let result: ArchivePlan = r#"
            [settings]
            archive_dir = "$ATTIC/project"
            manifest = "moves.log"
            update_gitignore = false

            [[category]]
            name = "virtual-envs"
            description = "Python virtual environments"
            paths = [".venv", "venv"]

            [[category]]
            name = "build-caches"
            paths = ["**/__pycache__"]
        "#
        .parse()?;

        let expect = ArchivePlan {
            settings: PlanSettings {
                archive_dir: PathBuf::from("/mnt/attic/project"),
                manifest: PathBuf::from("moves.log"),
                update_gitignore: false,
            },
            categories: vec![
                Category {
                    name: "virtual-envs".into(),
                    description: Some("Python virtual environments".into()),
                    paths: vec![".venv".into(), "venv".into()],
                },
                Category {
                    name: "build-caches".into(),
                    description: None,
                    paths: vec!["**/__pycache__".into()],
                },
            ],
        };

        assert_eq!(result, expect);

        Ok(())
    }

    #[test]
    fn missing_settings_fall_back_to_defaults() -> anyhow::Result<()> {
        let result: ArchivePlan = r#"
            [[category]]
            name = "dependencies"
            paths = ["node_modules"]
        "#
        .parse()?;

        assert_eq!(result.settings, PlanSettings::default());
        assert_eq!(result.categories.len(), 1);

        Ok(())
    }

    #[test]
    fn default_plan_survives_serialization() -> anyhow::Result<()> {
        let plan = ArchivePlan::default();
        let result: ArchivePlan = plan.to_string().parse()?;
        assert_eq!(result, plan);

        Ok(())
    }

    #[test]
    fn reject_category_name_with_separator() {
        let result = r#"
            [[category]]
            name = "../escape"
            paths = ["node_modules"]
        "#
        .parse::<ArchivePlan>();
        assert!(matches!(result, Err(ConfigError::InvalidCategoryName(_))));
    }

    #[test]
    fn plan_context_places_manifest_under_archive_dir() {
        let context = ArchivePlan::default().context("/repo");
        assert_eq!(context.archive_dir(), Path::new("/repo/archive"));
        assert_eq!(context.manifest_path(), Path::new("/repo/archive/MANIFEST"));
    }

    #[test_case("archive", Some("/archive/"); "plain")]
    #[test_case("./build/archive/", Some("/build/archive/"); "dotted")]
    #[test_case("/mnt/attic", None; "absolute")]
    #[test_case("../attic", None; "outside root")]
    #[test]
    fn gitignore_pattern_for_archive_dir(archive_dir: &str, expect: Option<&str>) {
        let settings = PlanSettings {
            archive_dir: PathBuf::from(archive_dir),
            ..Default::default()
        };
        pretty_assertions::assert_eq!(settings.gitignore_pattern().as_deref(), expect);
    }
}
