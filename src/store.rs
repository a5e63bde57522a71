// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Managed store facade.
//!
//! The __managed store__ is the directory that holds everything dotman knows
//! about: tracked files, backups, health snapshots, generated documentation,
//! and the version control metadata of the whole thing. By default it lives
//! at `~/.dotman`, but `$DOTMAN_DIR` can move it anywhere.
//!
//! [`Store`] is the one entry point that ties the store layout, the settings
//! file, the link synchronizer, the version control bridge, the backup store,
//! the health scanner, and the documentation generator together. Each public
//! method maps to exactly one command of the dotman binary.

use crate::{
    backup::{BackupError, BackupRecord, BackupStore},
    config::{ConfigError, Settings, StoreLayout, Visibility},
    docs::{self, DocsError},
    health::{HealthReport, HealthScanner},
    link::{LinkError, Linker},
    path::{expand_user_path, PathError},
    registry::{self, RegistryError},
    syscall::{CommandRunner, SystemRunner},
    vcs::{GitBridge, VcsError},
};

use std::path::PathBuf;
use tracing::{info, instrument, warn};

/// Handle to the managed store.
#[derive(Debug)]
pub struct Store<R = SystemRunner>
where
    R: CommandRunner,
{
    layout: StoreLayout,
    settings: Settings,
    git: GitBridge<R>,
    backups: BackupStore,
}

impl Store<SystemRunner> {
    /// Open managed store of the current user.
    ///
    /// # Errors
    ///
    /// - Return [`StoreError::Config`] if store layout cannot be resolved,
    ///   store directories cannot be created, or settings are malformed.
    pub fn open() -> Result<Self> {
        Self::open_with(StoreLayout::from_env()?, SystemRunner)
    }
}

impl<R> Store<R>
where
    R: CommandRunner,
{
    /// Open managed store at a given layout, running commands through
    /// `runner`.
    ///
    /// Creates the store root and configs directory if missing, then loads
    /// the settings file.
    ///
    /// # Errors
    ///
    /// - Return [`StoreError::Config`] if store directories cannot be
    ///   created, or settings are malformed.
    pub fn open_with(layout: StoreLayout, runner: R) -> Result<Self> {
        layout.ensure_directories()?;
        let settings = layout.load_settings()?;
        let git = GitBridge::new(runner, layout.store_root(), settings.git.clone());
        let backups = BackupStore::new(layout.backups_dir());

        Ok(Self {
            layout,
            settings,
            git,
            backups,
        })
    }

    pub fn layout(&self) -> &StoreLayout {
        &self.layout
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Check if managed store is already under version control.
    pub fn is_repository(&self) -> bool {
        self.git.is_repository()
    }

    /// Turn managed store into a brand new repository published under
    /// `repo_name`, then link every tracked file.
    ///
    /// Visibility falls back to the one in the settings file.
    ///
    /// # Errors
    ///
    /// - Return [`StoreError::AlreadyInitialized`] if store is already a
    ///   repository.
    /// - Return [`StoreError::Vcs`] if repository setup fails.
    /// - Return [`StoreError::Link`] if linking fails.
    #[instrument(skip(self), level = "debug")]
    pub fn init_new(
        &self,
        repo_name: &str,
        visibility: Option<Visibility>,
    ) -> Result<Vec<PathBuf>> {
        self.require_fresh()?;
        let visibility = visibility.unwrap_or(self.settings.git.visibility);
        self.git.init_repo(repo_name, visibility)?;
        info!("created repository {repo_name}");

        self.link()
    }

    /// Populate managed store from an existing repository, then link every
    /// tracked file it brought along.
    ///
    /// # Errors
    ///
    /// - Return [`StoreError::AlreadyInitialized`] if store is already a
    ///   repository.
    /// - Return [`StoreError::Vcs`] if cloning fails.
    /// - Return [`StoreError::Link`] if linking fails.
    #[instrument(skip(self), level = "debug")]
    pub fn init_clone(&self, url: &str) -> Result<Vec<PathBuf>> {
        self.require_fresh()?;
        self.git.clone_repo(url)?;
        info!("initialized from {url}");

        self.link()
    }

    /// Start tracking a file, and record it in version control if the store is
    /// a repository.
    ///
    /// Returns path of the new tracked file relative to the configs
    /// directory.
    ///
    /// # Errors
    ///
    /// - Return [`StoreError::Path`] if path cannot be expanded.
    /// - Return [`StoreError::Link`] if file cannot be tracked.
    /// - Return [`StoreError::Vcs`] if recording the file fails.
    #[instrument(skip(self), level = "debug")]
    pub fn add(&self, path: &str) -> Result<PathBuf> {
        let source = expand_user_path(path)?;
        let relative = Linker::new(&self.layout).add_file(source)?;

        if self.git.is_repository() {
            self.git.record_file(&relative)?;
        } else {
            warn!("store is not a repository, {} is not committed", relative.display());
        }

        Ok(relative)
    }

    /// Link every tracked file into the home directory.
    ///
    /// # Errors
    ///
    /// - Return [`StoreError::Link`] if linking fails.
    pub fn link(&self) -> Result<Vec<PathBuf>> {
        Ok(Linker::new(&self.layout).link_all()?)
    }

    /// List every tracked file relative to the configs directory.
    ///
    /// # Errors
    ///
    /// - Return [`StoreError::Registry`] if tracked files cannot be listed.
    pub fn list(&self) -> Result<Vec<PathBuf>> {
        Ok(registry::list_tracked_files(&self.layout)?)
    }

    /// Commit every change in the store and push it.
    ///
    /// # Errors
    ///
    /// - Return [`StoreError::Vcs`] if any step fails.
    pub fn commit(&self, message: &str) -> Result<()> {
        Ok(self.git.stage_commit_push(message)?)
    }

    /// Pull latest changes, then relink every tracked file.
    ///
    /// # Errors
    ///
    /// - Return [`StoreError::Vcs`] if pulling fails.
    /// - Return [`StoreError::Link`] if linking fails.
    #[instrument(skip(self), level = "debug")]
    pub fn update(&self) -> Result<Vec<PathBuf>> {
        self.git.pull()?;
        self.link()
    }

    /// Back up a file.
    ///
    /// # Errors
    ///
    /// - Return [`StoreError::Path`] if path cannot be expanded.
    /// - Return [`StoreError::Backup`] if backup fails.
    pub fn backup(&self, path: &str) -> Result<BackupRecord> {
        let source = expand_user_path(path)?;
        Ok(self.backups.backup(source)?)
    }

    /// List every readable backup, sorted by identifier.
    ///
    /// # Errors
    ///
    /// - Return [`StoreError::Backup`] if backups directory cannot be read.
    pub fn list_backups(&self) -> Result<Vec<BackupRecord>> {
        Ok(self.backups.list_backups()?)
    }

    /// Restore backup to its original path.
    ///
    /// # Errors
    ///
    /// - Return [`StoreError::Backup`] if backup is unusable, or cannot be
    ///   written back.
    pub fn restore(&self, id: &str) -> Result<BackupRecord> {
        Ok(self.backups.restore(id)?)
    }

    /// Run every health check.
    pub fn check(&self) -> HealthReport {
        HealthScanner::new(&self.layout, &self.settings.health, &self.git).scan()
    }

    /// Generate documentation for every tracked file.
    ///
    /// # Errors
    ///
    /// - Return [`StoreError::Docs`] if generation fails.
    pub fn docs(&self) -> Result<Vec<PathBuf>> {
        Ok(docs::generate(&self.layout)?)
    }

    /// Stop tracking a file, putting a regular copy back in the home
    /// directory.
    ///
    /// # Errors
    ///
    /// - Return [`StoreError::Path`] if path cannot be expanded.
    /// - Return [`StoreError::Link`] if file cannot be untracked.
    pub fn remove(&self, path: &str) -> Result<PathBuf> {
        let target = expand_user_path(path)?;
        Ok(Linker::new(&self.layout).remove_file(target)?)
    }

    fn require_fresh(&self) -> Result<()> {
        if self.git.is_repository() {
            return Err(StoreError::AlreadyInitialized {
                path: self.layout.store_root().to_path_buf(),
            });
        }

        Ok(())
    }
}

/// Managed store error types.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Store is already under version control.
    #[error("managed store {:?} is already initialized", path.display())]
    AlreadyInitialized { path: PathBuf },

    #[error(transparent)]
    Path(#[from] PathError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Link(#[from] LinkError),

    #[error(transparent)]
    Vcs(#[from] VcsError),

    #[error(transparent)]
    Backup(#[from] BackupError),

    #[error(transparent)]
    Docs(#[from] DocsError),
}

/// Friendly result alias :3
pub type Result<T, E = StoreError> = std::result::Result<T, E>;
