// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Tracked file registry.
//!
//! Dotman does not keep a manifest of tracked files. The configs directory of
//! the managed store _is_ the manifest: every non-directory entry inside it is
//! a tracked file, identified by its path relative to the configs directory.

use crate::config::StoreLayout;

use ignore::WalkBuilder;
use std::path::{Path, PathBuf};
use tracing::instrument;

/// List every tracked file relative to the configs directory.
///
/// Hidden files are included, and no ignore rules apply, because dotfiles
/// are hidden files almost by definition. Symbolic links inside the configs
/// directory are reported but never followed. Results are sorted by file name
/// at each directory level.
///
/// # Errors
///
/// - Return [`RegistryError::Walk`] if any entry cannot be read. Partial
///   results are discarded.
#[instrument(skip(layout), level = "debug")]
pub fn list_tracked_files(layout: &StoreLayout) -> Result<Vec<PathBuf>> {
    walk_files(layout.configs_dir())
        .map(|entries| {
            entries
                .into_iter()
                .map(|(relative, _)| relative)
                .collect()
        })
}

/// Walk configs directory yielding relative and absolute path of every file.
pub(crate) fn walk_files(root: &Path) -> Result<Vec<(PathBuf, PathBuf)>> {
    let walker = WalkBuilder::new(root)
        .standard_filters(false)
        .follow_links(false)
        .sort_by_file_name(|a, b| a.cmp(b))
        .build();

    let mut entries = Vec::new();
    for entry in walker {
        let entry = entry.map_err(|err| RegistryError::Walk {
            source: err,
            root: root.to_path_buf(),
        })?;

        // INVARIANT: Directories are never tracked, only their contents.
        if entry.file_type().is_none_or(|kind| kind.is_dir()) {
            continue;
        }

        let relative = entry
            .path()
            .strip_prefix(root)
            .map_err(|_| RegistryError::OutsideRoot {
                path: entry.path().to_path_buf(),
                root: root.to_path_buf(),
            })?
            .to_path_buf();
        entries.push((relative, entry.into_path()));
    }

    Ok(entries)
}

/// Tracked file registry error types.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// Directory walk failed.
    #[error("failed to walk tracked files in {:?}", root.display())]
    Walk {
        #[source]
        source: ignore::Error,
        root: PathBuf,
    },

    /// Walk produced a path outside of its root.
    #[error("path {:?} escapes {:?}", path.display(), root.display())]
    OutsideRoot { path: PathBuf, root: PathBuf },
}

/// Friendly result alias :3
pub type Result<T, E = RegistryError> = std::result::Result<T, E>;
