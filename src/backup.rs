// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Backup and restore of individual files.
//!
//! Every backup gets its own directory under `<store>/backups`, named after
//! the backup identifier. That directory holds exactly two artifacts: the raw
//! bytes of the file in `content`, and a JSON record describing where the
//! bytes came from in `metadata.json`.
//!
//! Backup identifiers are timestamps at one second resolution, e.g.,
//! `2024-02-20-123456`. A second backup taken within the same second gets a
//! numeric suffix, e.g., `2024-02-20-123456-1`, instead of overwriting the
//! first one.

use crate::path::{absolutize, remove_any, symlink};

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::{
    fs,
    io,
    path::{Component, Path, PathBuf},
};
use tracing::{debug, info, instrument, warn};

const CONTENT_FILE: &str = "content";
const METADATA_FILE: &str = "metadata.json";
const ID_FORMAT: &str = "%Y-%m-%d-%H%M%S";

/// Metadata record of a backup.
#[derive(Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
pub struct BackupRecord {
    /// Unique identifier of backup.
    pub id: String,

    /// Absolute path the backup was taken from.
    pub original_path: PathBuf,

    /// Link target, if original path was a symbolic link at backup time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub symlink_path: Option<PathBuf>,

    /// Time the backup was taken.
    pub timestamp: DateTime<Local>,
}

/// Store of file backups.
#[derive(Debug, Clone)]
pub struct BackupStore {
    backups_dir: PathBuf,
}

impl BackupStore {
    /// Construct new backup store rooted at a backups directory.
    pub fn new(backups_dir: impl Into<PathBuf>) -> Self {
        Self {
            backups_dir: backups_dir.into(),
        }
    }

    pub fn backups_dir(&self) -> &Path {
        &self.backups_dir
    }

    /// Back up a file.
    ///
    /// Reads the current bytes of the file, following links, and records the
    /// link target if the file itself is a link.
    ///
    /// # Errors
    ///
    /// - Return [`BackupError::ReadSource`] if file cannot be read.
    /// - Return [`BackupError::Write`] if backup artifacts cannot be written.
    #[instrument(skip(self, path), level = "debug")]
    pub fn backup(&self, path: impl AsRef<Path>) -> Result<BackupRecord> {
        let path = path.as_ref();
        let original_path = absolutize(path).map_err(|err| BackupError::ReadSource {
            source: err,
            path: path.to_path_buf(),
        })?;

        let content = fs::read(&original_path).map_err(|err| BackupError::ReadSource {
            source: err,
            path: original_path.clone(),
        })?;

        let symlink_path = match fs::symlink_metadata(&original_path) {
            Ok(meta) if meta.file_type().is_symlink() => {
                Some(fs::read_link(&original_path).map_err(|err| BackupError::ReadSource {
                    source: err,
                    path: original_path.clone(),
                })?)
            }
            _ => None,
        };

        let timestamp = Local::now();
        let (id, backup_dir) = self.allocate(&timestamp)?;
        let record = BackupRecord {
            id,
            original_path,
            symlink_path,
            timestamp,
        };

        fill(&backup_dir, &record, &content)?;
        info!("backed up {} as {}", record.original_path.display(), record.id);

        Ok(record)
    }

    /// List every readable backup, sorted by identifier.
    ///
    /// Backups with missing or malformed metadata are skipped. A missing
    /// backups directory simply means there are no backups yet.
    ///
    /// # Errors
    ///
    /// - Return [`BackupError::Read`] if backups directory exists but
    ///   cannot be read.
    pub fn list_backups(&self) -> Result<Vec<BackupRecord>> {
        let entries = match fs::read_dir(&self.backups_dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => {
                return Err(BackupError::Read {
                    source: err,
                    path: self.backups_dir.clone(),
                })
            }
        };

        let mut backups = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|err| BackupError::Read {
                source: err,
                path: self.backups_dir.clone(),
            })?;

            if !entry.file_type().is_ok_and(|kind| kind.is_dir()) {
                continue;
            }

            match read_record(&entry.path().join(METADATA_FILE)) {
                Ok(record) => backups.push(record),
                Err(error) => debug!("skip backup {:?}: {error}", entry.file_name()),
            }
        }
        backups.sort_by(|a, b| a.id.cmp(&b.id));

        Ok(backups)
    }

    /// Restore a backup to its original path.
    ///
    /// Writes the backed up bytes to the original path, creating parent
    /// directories. If the original path was a link, whatever is there now is
    /// replaced by a link with the recorded target. This restores link
    /// structure, not necessarily the file the link pointed to.
    ///
    /// # Errors
    ///
    /// - Return [`BackupError::InvalidId`] if identifier is not a single
    ///   path component.
    /// - Return [`BackupError::ReadMetadata`] if metadata is missing or
    ///   unreadable.
    /// - Return [`BackupError::ReadContent`] if content is missing.
    /// - Return [`BackupError::Write`] if original path cannot be written.
    #[instrument(skip(self), level = "debug")]
    pub fn restore(&self, id: &str) -> Result<BackupRecord> {
        let backup_dir = self.backup_dir(id)?;
        let record = read_record(&backup_dir.join(METADATA_FILE)).map_err(|err| {
            BackupError::ReadMetadata {
                source: Box::new(err),
                id: id.into(),
            }
        })?;

        let content_path = backup_dir.join(CONTENT_FILE);
        let content = fs::read(&content_path).map_err(|err| BackupError::ReadContent {
            source: err,
            id: id.into(),
        })?;

        if let Some(parent) = record.original_path.parent() {
            fs::create_dir_all(parent).map_err(|err| BackupError::Write {
                source: err,
                path: parent.to_path_buf(),
            })?;
        }
        write_artifact(&record.original_path, &content)?;

        if let Some(target) = &record.symlink_path {
            remove_any(&record.original_path).map_err(|err| BackupError::Write {
                source: err,
                path: record.original_path.clone(),
            })?;
            symlink(target, &record.original_path).map_err(|err| BackupError::Write {
                source: err,
                path: record.original_path.clone(),
            })?;
            debug!("relinked {} -> {}", record.original_path.display(), target.display());
        }
        info!("restored {} from {}", record.original_path.display(), record.id);

        Ok(record)
    }

    fn backup_dir(&self, id: &str) -> Result<PathBuf> {
        let mut components = Path::new(id).components();
        match (components.next(), components.next()) {
            (Some(Component::Normal(_)), None) => Ok(self.backups_dir.join(id)),
            _ => Err(BackupError::InvalidId { id: id.into() }),
        }
    }

    /// Pick an unused identifier for a timestamp and create its directory.
    fn allocate(&self, timestamp: &DateTime<Local>) -> Result<(String, PathBuf)> {
        fs::create_dir_all(&self.backups_dir).map_err(|err| BackupError::Write {
            source: err,
            path: self.backups_dir.clone(),
        })?;

        let base = timestamp.format(ID_FORMAT).to_string();
        let mut id = base.clone();
        let mut suffix = 0;
        loop {
            let backup_dir = self.backups_dir.join(&id);
            match fs::create_dir(&backup_dir) {
                Ok(()) => return Ok((id, backup_dir)),
                Err(err) if err.kind() == io::ErrorKind::AlreadyExists => {
                    suffix += 1;
                    warn!("backup {id} already exists, trying suffix {suffix}");
                    id = format!("{base}-{suffix}");
                }
                Err(err) => {
                    return Err(BackupError::Write {
                        source: err,
                        path: backup_dir,
                    })
                }
            }
        }
    }
}

/// Write both artifacts of a freshly allocated backup directory.
///
/// Removes the directory again if either write fails.
fn fill(backup_dir: &Path, record: &BackupRecord, content: &[u8]) -> Result<()> {
    let written = write_artifact(&backup_dir.join(CONTENT_FILE), content).and_then(|()| {
        let metadata = serde_json::to_vec_pretty(record)?;
        write_artifact(&backup_dir.join(METADATA_FILE), &metadata)
    });

    if written.is_err() {
        if let Err(err) = remove_any(backup_dir) {
            warn!("failed to clean up {}: {err}", backup_dir.display());
        }
    }

    written
}

fn read_record(path: &Path) -> Result<BackupRecord> {
    let data = fs::read(path).map_err(|err| BackupError::Read {
        source: err,
        path: path.to_path_buf(),
    })?;
    Ok(serde_json::from_slice(&data)?)
}

fn write_artifact(path: &Path, data: &[u8]) -> Result<()> {
    fs::write(path, data).map_err(|err| BackupError::Write {
        source: err,
        path: path.to_path_buf(),
    })
}

/// Backup store error types.
#[derive(Debug, thiserror::Error)]
pub enum BackupError {
    /// File to back up cannot be read.
    #[error("failed to read {:?}", path.display())]
    ReadSource {
        #[source]
        source: io::Error,
        path: PathBuf,
    },

    /// Backup directory or metadata cannot be read.
    #[error("failed to read {:?}", path.display())]
    Read {
        #[source]
        source: io::Error,
        path: PathBuf,
    },

    /// Backup identifier is not a plain directory name.
    #[error("invalid backup identifier {id:?}")]
    InvalidId { id: String },

    /// Backup metadata is missing or malformed.
    #[error("failed to read metadata of backup {id:?}")]
    ReadMetadata {
        #[source]
        source: Box<BackupError>,
        id: String,
    },

    /// Backup content is missing.
    #[error("failed to read content of backup {id:?}")]
    ReadContent {
        #[source]
        source: io::Error,
        id: String,
    },

    /// Backup artifact or restored file cannot be written.
    #[error("failed to write {:?}", path.display())]
    Write {
        #[source]
        source: io::Error,
        path: PathBuf,
    },

    /// Metadata cannot be encoded or decoded.
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Friendly result alias :3
pub type Result<T, E = BackupError> = std::result::Result<T, E>;
