// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Link synchronization.
//!
//! A tracked file lives in the configs directory of the managed store, and is
//! deployed to the home directory as a symbolic link that points back at the
//! stored copy. The path inside the home directory is called the
//! __mirrored path__, because it mirrors the relative path of the tracked file
//! inside the configs directory.
//!
//! # Deployment Is Destructive
//!
//! Linking a tracked file unconditionally removes whatever currently occupies
//! its mirrored path, be it a file, a directory, or another link. There is no
//! prompt and no recovery. Use the backup store first if that matters.

use crate::{
    config::StoreLayout,
    path::{absolutize, remove_any, symlink},
    registry::{self, RegistryError},
};

use std::{
    fs,
    io,
    path::{Path, PathBuf},
};
use tracing::{debug, info, instrument, warn};

/// Deployment state of a tracked file's mirrored path.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum LinkState {
    /// Nothing exists at the mirrored path.
    Missing,

    /// Mirrored path is a link to exactly the stored file.
    Linked,

    /// Mirrored path is occupied by something else.
    Conflict,
}

/// Keep mirrored paths in the home directory linked to the managed store.
#[derive(Debug, Clone, Copy)]
pub struct Linker<'layout> {
    layout: &'layout StoreLayout,
}

impl<'layout> Linker<'layout> {
    /// Construct new linker over a store layout.
    pub fn new(layout: &'layout StoreLayout) -> Self {
        Self { layout }
    }

    /// Start tracking a file.
    ///
    /// Copies the file into the configs directory at the path mirroring its
    /// location relative to the home directory, then immediately replaces the
    /// original with a link to the stored copy. Returns the path of the new
    /// tracked file relative to the configs directory.
    ///
    /// A file that is already linked into the store is left alone.
    ///
    /// # Errors
    ///
    /// - Return [`LinkError::NotFound`] if source does not exist.
    /// - Return [`LinkError::NotAFile`] if source is a directory.
    /// - Return [`LinkError::OutsideHome`] if source is not inside the home
    ///   directory.
    /// - Return [`LinkError::InsideStore`] if source is inside the managed
    ///   store.
    /// - Return [`LinkError::Copy`] if the file cannot be copied.
    #[instrument(skip(self, source), level = "debug")]
    pub fn add_file(&self, source: impl AsRef<Path>) -> Result<PathBuf> {
        let source = absolutize(source.as_ref()).map_err(|err| LinkError::Inspect {
            source: err,
            path: source.as_ref().to_path_buf(),
        })?;

        let meta = match fs::metadata(&source) {
            Ok(meta) => meta,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return Err(LinkError::NotFound { path: source });
            }
            Err(err) => {
                return Err(LinkError::Inspect {
                    source: err,
                    path: source,
                })
            }
        };

        if meta.is_dir() {
            return Err(LinkError::NotAFile { path: source });
        }

        if source.starts_with(self.layout.store_root()) {
            return Err(LinkError::InsideStore { path: source });
        }

        let relative = source
            .strip_prefix(self.layout.home())
            .map_err(|_| LinkError::OutsideHome {
                path: source.clone(),
                home: self.layout.home().to_path_buf(),
            })?
            .to_path_buf();

        let stored = self.layout.stored_path(&relative);

        // INVARIANT: Never copy a stored file onto itself through any link.
        if same_file(&source, &stored) {
            if self.inspect(&relative)? == LinkState::Linked {
                warn!("{} is already tracked", relative.display());
            } else {
                self.link_file(&relative)?;
            }
            return Ok(relative);
        }

        create_parent(&stored)?;
        fs::copy(&source, &stored).map_err(|err| LinkError::Copy {
            source: err,
            from: source.clone(),
            to: stored.clone(),
        })?;
        debug!("copied {} to {}", source.display(), stored.display());

        self.link_file(&relative)?;

        Ok(relative)
    }

    /// Link every tracked file into the home directory.
    ///
    /// Processes tracked files in registry order. The first failure aborts the
    /// walk, and leaves links created before it in place. Returns mirrored
    /// paths that were linked.
    ///
    /// # Errors
    ///
    /// - Return [`LinkError::Registry`] if tracked files cannot be listed.
    /// - Return any error of [`Linker::link_file`].
    #[instrument(skip(self), level = "debug")]
    pub fn link_all(&self) -> Result<Vec<PathBuf>> {
        let mut linked = Vec::new();
        for relative in registry::list_tracked_files(self.layout)? {
            linked.push(self.link_file(&relative)?);
        }

        Ok(linked)
    }

    /// Link one tracked file into the home directory.
    ///
    /// Creates parent directories of the mirrored path, removes whatever
    /// occupies the mirrored path, and links it to the stored file.
    ///
    /// # Errors
    ///
    /// - Return [`LinkError::CreateDir`] if parent directories cannot be
    ///   created.
    /// - Return [`LinkError::Remove`] if mirrored path cannot be cleared.
    /// - Return [`LinkError::Symlink`] if link cannot be created.
    pub fn link_file(&self, relative: impl AsRef<Path>) -> Result<PathBuf> {
        let stored = self.layout.stored_path(relative.as_ref());
        let mirrored = self.layout.mirrored_path(relative.as_ref());

        create_parent(&mirrored)?;
        remove_any(&mirrored).map_err(|err| LinkError::Remove {
            source: err,
            path: mirrored.clone(),
        })?;
        symlink(&stored, &mirrored).map_err(|err| LinkError::Symlink {
            source: err,
            original: stored.clone(),
            link: mirrored.clone(),
        })?;
        info!("linked {} -> {}", mirrored.display(), stored.display());

        Ok(mirrored)
    }

    /// Stop tracking a file.
    ///
    /// Accepts either the mirrored path, or a path inside the configs
    /// directory. Removes the link at the mirrored path, puts a regular copy
    /// of the stored file back in its place, then deletes the stored file and
    /// any directories it leaves empty inside the configs directory.
    ///
    /// # Errors
    ///
    /// - Return [`LinkError::NotTracked`] if path does not name a tracked file.
    /// - Return [`LinkError::Conflict`] if mirrored path holds something other
    ///   than a link to the stored file.
    /// - Return [`LinkError::Copy`] if stored file cannot be copied back.
    /// - Return [`LinkError::Remove`] if link or stored file cannot be removed.
    #[instrument(skip(self, path), level = "debug")]
    pub fn remove_file(&self, path: impl AsRef<Path>) -> Result<PathBuf> {
        let path = absolutize(path.as_ref()).map_err(|err| LinkError::Inspect {
            source: err,
            path: path.as_ref().to_path_buf(),
        })?;

        let relative = path
            .strip_prefix(self.layout.configs_dir())
            .or_else(|_| path.strip_prefix(self.layout.home()))
            .map_err(|_| LinkError::NotTracked { path: path.clone() })?
            .to_path_buf();

        let stored = self.layout.stored_path(&relative);
        if !stored.is_file() {
            return Err(LinkError::NotTracked { path });
        }

        let mirrored = self.layout.mirrored_path(&relative);
        if self.inspect(&relative)? == LinkState::Conflict {
            return Err(LinkError::Conflict { path: mirrored });
        }

        remove_any(&mirrored).map_err(|err| LinkError::Remove {
            source: err,
            path: mirrored.clone(),
        })?;
        create_parent(&mirrored)?;
        fs::copy(&stored, &mirrored).map_err(|err| LinkError::Copy {
            source: err,
            from: stored.clone(),
            to: mirrored.clone(),
        })?;
        fs::remove_file(&stored).map_err(|err| LinkError::Remove {
            source: err,
            path: stored.clone(),
        })?;
        self.prune_empty_parents(&stored);
        info!("untracked {}", mirrored.display());

        Ok(relative)
    }

    /// Determine deployment state of a tracked file's mirrored path.
    ///
    /// # Errors
    ///
    /// - Return [`LinkError::Inspect`] if mirrored path cannot be inspected.
    pub fn inspect(&self, relative: impl AsRef<Path>) -> Result<LinkState> {
        let stored = self.layout.stored_path(relative.as_ref());
        let mirrored = self.layout.mirrored_path(relative.as_ref());

        let meta = match fs::symlink_metadata(&mirrored) {
            Ok(meta) => meta,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(LinkState::Missing),
            Err(err) => {
                return Err(LinkError::Inspect {
                    source: err,
                    path: mirrored,
                })
            }
        };

        if !meta.file_type().is_symlink() {
            return Ok(LinkState::Conflict);
        }

        let target = fs::read_link(&mirrored).map_err(|err| LinkError::Inspect {
            source: err,
            path: mirrored.clone(),
        })?;

        if target == stored {
            Ok(LinkState::Linked)
        } else {
            Ok(LinkState::Conflict)
        }
    }

    fn prune_empty_parents(&self, stored: &Path) {
        let configs = self.layout.configs_dir();
        let mut current = stored.parent();
        while let Some(dir) = current {
            if dir == configs || !dir.starts_with(configs) {
                break;
            }

            // INVARIANT: remove_dir only succeeds on empty directories.
            if fs::remove_dir(dir).is_err() {
                break;
            }

            current = dir.parent();
        }
    }
}

/// Both paths resolve to the same existing file once links are followed.
fn same_file(lhs: &Path, rhs: &Path) -> bool {
    match (fs::canonicalize(lhs), fs::canonicalize(rhs)) {
        (Ok(lhs), Ok(rhs)) => lhs == rhs,
        _ => false,
    }
}

fn create_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|err| LinkError::CreateDir {
            source: err,
            path: parent.to_path_buf(),
        })?;
    }

    Ok(())
}

/// Link synchronization error types.
#[derive(Debug, thiserror::Error)]
pub enum LinkError {
    /// File to track does not exist.
    #[error("file does not exist: {:?}", path.display())]
    NotFound { path: PathBuf },

    /// Only regular files can be tracked.
    #[error("not a file: {:?}", path.display())]
    NotAFile { path: PathBuf },

    /// File to track lives outside of the home directory.
    #[error("{:?} is not inside home directory {:?}", path.display(), home.display())]
    OutsideHome { path: PathBuf, home: PathBuf },

    /// File to track already lives inside the managed store.
    #[error("{:?} is inside the managed store", path.display())]
    InsideStore { path: PathBuf },

    /// Path does not name a tracked file.
    #[error("{:?} is not a tracked file", path.display())]
    NotTracked { path: PathBuf },

    /// Mirrored path is occupied by something the store does not own.
    #[error("{:?} is not linked to the managed store, refusing to overwrite it", path.display())]
    Conflict { path: PathBuf },

    /// Listing tracked files failed.
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// Path could not be inspected.
    #[error("failed to inspect {:?}", path.display())]
    Inspect {
        #[source]
        source: io::Error,
        path: PathBuf,
    },

    /// File could not be copied.
    #[error("failed to copy {:?} to {:?}", from.display(), to.display())]
    Copy {
        #[source]
        source: io::Error,
        from: PathBuf,
        to: PathBuf,
    },

    /// Parent directory could not be created.
    #[error("failed to create directory {:?}", path.display())]
    CreateDir {
        #[source]
        source: io::Error,
        path: PathBuf,
    },

    /// Existing entry could not be removed.
    #[error("failed to remove {:?}", path.display())]
    Remove {
        #[source]
        source: io::Error,
        path: PathBuf,
    },

    /// Symbolic link could not be created.
    #[error("failed to link {:?} -> {:?}", link.display(), original.display())]
    Symlink {
        #[source]
        source: io::Error,
        original: PathBuf,
        link: PathBuf,
    },
}

/// Friendly result alias :3
pub type Result<T, E = LinkError> = std::result::Result<T, E>;
