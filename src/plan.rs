// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Archive plan expansion.
//!
//! Turn the glob patterns of an [`ArchivePlan`] into concrete moves for the
//! archive engine. Content matched by a category named `name` at path `rel`
//! relative to the project root is moved to `<archive_dir>/<name>/<rel>`, so
//! nested matches from different parts of the tree never collide.
//!
//! Expansion walks categories in plan order, and patterns in category order.
//! The following matches are dropped:
//!
//! - Anything inside the archive directory itself.
//! - Anything containing the archive directory, since it cannot be moved
//!   into its own subtree.
//! - Anything nested under an earlier match, since it moves along with it.
//! - The project root, or anything outside of it.
//!
//! A match that contains earlier matches replaces them for the same reason.

use crate::{config::ArchivePlan, engine::ArchiveContext};

use glob::{glob_with, MatchOptions, Pattern};
use std::path::{Path, PathBuf};
use tracing::{debug, instrument, warn};

/// Concrete move produced by plan expansion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedMove {
    /// Category that matched the content.
    pub category: String,

    /// Current location of the content.
    pub original: PathBuf,

    /// Location to archive the content to.
    pub archived: PathBuf,
}

/// Expand archive plan against project root.
///
/// Only categories named in `only` are expanded, unless `only` is empty.
///
/// # Errors
///
/// - Return [`PlanError::UnknownCategory`] if `only` names a category the
///   plan does not have.
/// - Return [`PlanError::Pattern`] if a glob pattern is invalid.
#[instrument(skip_all, level = "debug")]
pub fn expand(
    plan: &ArchivePlan,
    context: &ArchiveContext,
    only: &[impl AsRef<str>],
) -> Result<Vec<PlannedMove>> {
    let only = only.iter().map(AsRef::as_ref).collect::<Vec<&str>>();
    for name in &only {
        if plan.category(name).is_none() {
            return Err(PlanError::UnknownCategory(name.to_string()));
        }
    }

    let options = MatchOptions {
        case_sensitive: true,
        require_literal_separator: true,
        require_literal_leading_dot: false,
    };
    let root = context.root();
    let escaped_root = Pattern::escape(root.to_string_lossy().as_ref());

    let mut moves: Vec<PlannedMove> = Vec::new();
    let categories = plan
        .categories
        .iter()
        .filter(|category| only.is_empty() || only.contains(&category.name.as_str()));

    for category in categories {
        for pattern in &category.paths {
            let full = format!(
                "{}/{}",
                escaped_root.trim_end_matches('/'),
                pattern.trim_start_matches('/')
            );
            debug!("expand {full:?} for category {:?}", category.name);
            let paths = glob_with(&full, options).map_err(|err| PlanError::Pattern {
                source: err,
                pattern: pattern.clone(),
            })?;

            for path in paths {
                let path = match path {
                    Ok(path) => path,
                    Err(err) => {
                        warn!("skip unreadable match: {err}");
                        continue;
                    }
                };

                let Some(relative) = relative_under(&path, root) else {
                    warn!("skip {:?}, not inside project root", path.display());
                    continue;
                };

                if path.starts_with(context.archive_dir()) {
                    debug!("skip {:?}, inside archive directory", path.display());
                    continue;
                }

                if context.archive_dir().starts_with(&path) {
                    warn!("skip {:?}, it contains the archive directory", path.display());
                    continue;
                }

                if moves.iter().any(|planned| path.starts_with(&planned.original)) {
                    debug!("skip {:?}, already covered", path.display());
                    continue;
                }

                // INVARIANT: An ancestor match carries its descendants along.
                moves.retain(|planned| !planned.original.starts_with(&path));

                let archived = context
                    .archive_dir()
                    .join(&category.name)
                    .join(&relative);
                moves.push(PlannedMove {
                    category: category.name.clone(),
                    original: path,
                    archived,
                });
            }
        }
    }

    Ok(moves)
}

fn relative_under(path: &Path, root: &Path) -> Option<PathBuf> {
    let relative = path.strip_prefix(root).ok()?;
    if relative.as_os_str().is_empty() {
        return None;
    }

    Some(relative.to_path_buf())
}

/// Plan expansion error types.
#[derive(Debug, thiserror::Error)]
pub enum PlanError {
    /// Glob pattern of a category is invalid.
    #[error("invalid path pattern {pattern:?}")]
    Pattern {
        #[source]
        source: glob::PatternError,
        pattern: String,
    },

    /// Requested category is not in the plan.
    #[error("unknown category {0:?}")]
    UnknownCategory(String),
}

/// Friendly result alias :3
pub type Result<T, E = PlanError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Category;
    use pretty_assertions::assert_eq;
    use sealed_test::prelude::*;
    use std::fs;

    fn plan(categories: &[(&str, &[&str])]) -> ArchivePlan {
        ArchivePlan {
            settings: Default::default(),
            categories: categories
                .iter()
                .map(|(name, paths)| Category {
                    name: name.to_string(),
                    description: None,
                    paths: paths.iter().map(|path| path.to_string()).collect(),
                })
                .collect(),
        }
    }

    #[sealed_test]
    fn expand_maps_matches_into_category_dirs() -> anyhow::Result<()> {
        let root = std::env::current_dir()?;
        fs::create_dir_all(".venv/bin")?;
        fs::create_dir_all("pkg/sub/__pycache__")?;
        fs::create_dir_all("pkg/__pycache__")?;

        let plan = plan(&[
            ("virtual-envs", &[".venv", "venv"]),
            ("build-caches", &["**/__pycache__"]),
        ]);
        let context = plan.context(&root);
        let result = expand(&plan, &context, &[] as &[&str])?;

        let expect = vec![
            PlannedMove {
                category: "virtual-envs".into(),
                original: root.join(".venv"),
                archived: root.join("archive/virtual-envs/.venv"),
            },
            PlannedMove {
                category: "build-caches".into(),
                original: root.join("pkg/__pycache__"),
                archived: root.join("archive/build-caches/pkg/__pycache__"),
            },
            PlannedMove {
                category: "build-caches".into(),
                original: root.join("pkg/sub/__pycache__"),
                archived: root.join("archive/build-caches/pkg/sub/__pycache__"),
            },
        ];
        assert_eq!(result, expect);

        Ok(())
    }

    #[sealed_test]
    fn expand_drops_nested_and_archived_matches() -> anyhow::Result<()> {
        let root = std::env::current_dir()?;
        fs::create_dir_all("node_modules/left-pad/node_modules")?;
        fs::create_dir_all("archive/dependencies/node_modules")?;

        let plan = plan(&[("dependencies", &["**/node_modules"])]);
        let context = plan.context(&root);
        let result = expand(&plan, &context, &[] as &[&str])?;

        assert_eq!(result.len(), 1);
        assert_eq!(result[0].original, root.join("node_modules"));

        Ok(())
    }

    #[sealed_test]
    fn expand_drops_match_containing_archive_dir() -> anyhow::Result<()> {
        let root = std::env::current_dir()?;
        fs::create_dir_all("tmp/attic")?;
        fs::create_dir_all("logs")?;

        let plan = plan(&[("runtime-state", &["tmp", "logs"])]);
        let context = plan.context(&root).with_archive_dir("tmp/attic");
        let result = expand(&plan, &context, &[] as &[&str])?;

        let expect = vec![PlannedMove {
            category: "runtime-state".into(),
            original: root.join("logs"),
            archived: root.join("tmp/attic/runtime-state/logs"),
        }];
        assert_eq!(result, expect);

        Ok(())
    }

    #[sealed_test]
    fn expand_replaces_descendants_with_ancestor_match() -> anyhow::Result<()> {
        let root = std::env::current_dir()?;
        fs::create_dir_all("tmp/__pycache__")?;

        let plan = plan(&[
            ("build-caches", &["**/__pycache__"]),
            ("runtime-state", &["tmp"]),
        ]);
        let context = plan.context(&root);
        let result = expand(&plan, &context, &[] as &[&str])?;

        assert_eq!(result.len(), 1);
        assert_eq!(result[0].category, "runtime-state");
        assert_eq!(result[0].original, root.join("tmp"));

        Ok(())
    }

    #[sealed_test]
    fn expand_filters_by_category() -> anyhow::Result<()> {
        let root = std::env::current_dir()?;
        fs::create_dir_all(".venv")?;
        fs::create_dir_all("node_modules")?;

        let plan = plan(&[
            ("virtual-envs", &[".venv"]),
            ("dependencies", &["node_modules"]),
        ]);
        let context = plan.context(&root);
        let result = expand(&plan, &context, &["dependencies"])?;

        assert_eq!(result.len(), 1);
        assert_eq!(result[0].original, root.join("node_modules"));

        let result = expand(&plan, &context, &["nope"]);
        assert!(matches!(result, Err(PlanError::UnknownCategory(_))));

        Ok(())
    }

    #[test]
    fn expand_rejects_invalid_pattern() {
        let plan = plan(&[("broken", &["[unclosed"])]);
        let context = plan.context("/nonexistent-root");
        let result = expand(&plan, &context, &[] as &[&str]);
        assert!(matches!(result, Err(PlanError::Pattern { .. })));
    }
}
