// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Configuration layout.
//!
//! Dotman derives everything it needs from two sources: the __store layout__,
//! which is a set of paths computed fresh on every invocation, and the
//! optional __settings__ file that lives at the top-level of the managed
//! store. Both are plain values that get passed explicitly to whatever needs
//! them.
//!
//! # Store Layout
//!
//! ```text
//! ~/.dotman/
//! ├── configs/        tracked files, mirroring the home directory
//! ├── backups/<id>/   content + metadata.json per backup
//! ├── health/         timestamped health check snapshots
//! ├── docs/           generated documentation
//! ├── .git/           version control metadata
//! └── dotman.toml     optional settings
//! ```

use crate::path::{self, PathError, STORE_DIR_ENV, STORE_DIR_NAME};

use serde::{Deserialize, Serialize};
use std::{
    fmt::{Display, Error as FmtError, Formatter, Result as FmtResult},
    fs,
    path::{Path, PathBuf},
    str::FromStr,
    time::Duration,
};
use tracing::{debug, instrument};

/// Paths of the managed store.
///
/// # Invariants
///
/// - Configs directory is always a subpath of the store root.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct StoreLayout {
    home: PathBuf,
    store_root: PathBuf,
    configs: PathBuf,
}

impl StoreLayout {
    /// Construct store layout from explicit home and store root paths.
    pub fn new(home: impl Into<PathBuf>, store_root: impl Into<PathBuf>) -> Self {
        let store_root = store_root.into();
        let configs = store_root.join("configs");
        Self {
            home: home.into(),
            store_root,
            configs,
        }
    }

    /// Resolve store layout through a home directory lookup.
    ///
    /// The store root is placed at `<home>/.dotman`.
    ///
    /// # Errors
    ///
    /// - Return [`ConfigError::Path`] if home directory lookup fails.
    pub fn resolve(home_lookup: impl FnOnce() -> Result<PathBuf, PathError>) -> Result<Self> {
        let home = home_lookup()?;
        let store_root = home.join(STORE_DIR_NAME);
        Ok(Self::new(home, store_root))
    }

    /// Resolve store layout for the current user.
    ///
    /// Honors `$DOTMAN_DIR` as an override of the store root.
    ///
    /// # Errors
    ///
    /// - Return [`ConfigError::Path`] if home directory cannot be determined,
    ///   or `$DOTMAN_DIR` cannot be expanded.
    pub fn from_env() -> Result<Self> {
        let layout = Self::resolve(path::home_dir)?;
        match std::env::var(STORE_DIR_ENV) {
            Ok(dir) if !dir.trim().is_empty() => {
                let store_root = path::expand_user_path(dir.trim())?;
                debug!("store root overridden to {}", store_root.display());
                Ok(Self::new(layout.home, store_root))
            }
            _ => Ok(layout),
        }
    }

    /// Create store root and configs directory if missing.
    ///
    /// Idempotent.
    ///
    /// # Errors
    ///
    /// - Return [`ConfigError::CreateDir`] if a directory cannot be created.
    #[instrument(skip(self), level = "debug")]
    pub fn ensure_directories(&self) -> Result<()> {
        for dir in [&self.store_root, &self.configs] {
            fs::create_dir_all(dir).map_err(|err| ConfigError::CreateDir {
                source: err,
                path: dir.clone(),
            })?;
        }

        Ok(())
    }

    /// Home directory that tracked files are linked into.
    pub fn home(&self) -> &Path {
        &self.home
    }

    /// Root of the managed store.
    pub fn store_root(&self) -> &Path {
        &self.store_root
    }

    /// Directory holding tracked files.
    pub fn configs_dir(&self) -> &Path {
        &self.configs
    }

    pub fn backups_dir(&self) -> PathBuf {
        self.store_root.join("backups")
    }

    pub fn health_dir(&self) -> PathBuf {
        self.store_root.join("health")
    }

    pub fn docs_dir(&self) -> PathBuf {
        self.store_root.join("docs")
    }

    pub fn git_dir(&self) -> PathBuf {
        self.store_root.join(".git")
    }

    pub fn settings_path(&self) -> PathBuf {
        self.store_root.join("dotman.toml")
    }

    /// Path inside home directory that mirrors a tracked file.
    pub fn mirrored_path(&self, relative: impl AsRef<Path>) -> PathBuf {
        self.home.join(relative)
    }

    /// Path inside configs directory that holds a tracked file.
    pub fn stored_path(&self, relative: impl AsRef<Path>) -> PathBuf {
        self.configs.join(relative)
    }

    /// Load settings file from store root.
    ///
    /// Missing settings file means default settings.
    ///
    /// # Errors
    ///
    /// - Return [`ConfigError::ReadSettings`] if settings file exists but
    ///   cannot be read.
    /// - Return [`ConfigError::Deserialize`] if settings file is malformed.
    pub fn load_settings(&self) -> Result<Settings> {
        let settings_path = self.settings_path();
        match fs::read_to_string(&settings_path) {
            Ok(data) => data.parse(),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(Settings::default()),
            Err(err) => Err(ConfigError::ReadSettings {
                source: err,
                settings_path,
            }),
        }
    }
}

/// Settings layout of `dotman.toml`.
///
/// Every field is optional in the file itself.
#[derive(Default, Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct Settings {
    /// Version control settings.
    pub git: GitSettings,

    /// Health check settings.
    pub health: HealthSettings,
}

impl FromStr for Settings {
    type Err = ConfigError;

    fn from_str(data: &str) -> Result<Self, Self::Err> {
        toml::de::from_str(data).map_err(ConfigError::Deserialize)
    }
}

impl Display for Settings {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(
            toml::ser::to_string_pretty(self)
                .map_err(ConfigError::Serialize)?
                .as_str(),
        )
    }
}

/// Version control settings.
#[derive(Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct GitSettings {
    /// Name of remote to push to.
    pub remote: String,

    /// Branch that new repositories are pushed to.
    pub branch: String,

    /// Number of push attempts before giving up.
    pub push_attempts: u32,

    /// Base delay between push attempts, multiplied by attempt number.
    pub retry_delay_secs: u64,

    /// Visibility of repositories created on the hosting platform.
    pub visibility: Visibility,
}

impl GitSettings {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_secs)
    }
}

impl Default for GitSettings {
    fn default() -> Self {
        Self {
            remote: "origin".into(),
            branch: "main".into(),
            push_attempts: 3,
            retry_delay_secs: 1,
            visibility: Visibility::default(),
        }
    }
}

/// Visibility of a repository created on the hosting platform.
#[derive(Default, Debug, PartialEq, Eq, Clone, Copy, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    #[default]
    Public,
    Private,
}

impl Visibility {
    /// Flag understood by `gh repo create`.
    pub fn as_flag(&self) -> &'static str {
        match self {
            Self::Public => "--public",
            Self::Private => "--private",
        }
    }
}

/// Health check settings.
#[derive(Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HealthSettings {
    /// Stored files untouched for longer than this are reported as outdated.
    pub stale_after_days: u64,

    /// Free space below this amount is reported as low.
    pub min_free_space_mb: u64,

    /// Write a JSON snapshot of every health check run.
    pub save_snapshots: bool,
}

impl HealthSettings {
    pub fn stale_after(&self) -> Duration {
        Duration::from_secs(self.stale_after_days.saturating_mul(24 * 60 * 60))
    }

    pub fn min_free_space_bytes(&self) -> u64 {
        self.min_free_space_mb.saturating_mul(1024 * 1024)
    }
}

impl Default for HealthSettings {
    fn default() -> Self {
        Self {
            stale_after_days: 30,
            min_free_space_mb: 1024,
            save_snapshots: true,
        }
    }
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to resolve paths.
    #[error(transparent)]
    Path(#[from] PathError),

    /// Failed to create a store directory.
    #[error("failed to create directory {:?}", path.display())]
    CreateDir {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Failed to read settings file.
    #[error("failed to read settings at {:?}", settings_path.display())]
    ReadSettings {
        #[source]
        source: std::io::Error,
        settings_path: PathBuf,
    },

    /// Failed to deserialize settings.
    #[error(transparent)]
    Deserialize(#[from] toml::de::Error),

    /// Failed to serialize settings.
    #[error(transparent)]
    Serialize(#[from] toml::ser::Error),
}

impl From<ConfigError> for FmtError {
    fn from(_: ConfigError) -> Self {
        FmtError
    }
}

/// Friendly result alias :3
type Result<T, E = ConfigError> = std::result::Result<T, E>;
