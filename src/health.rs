// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Health checks over the managed store.
//!
//! A health run executes a fixed sequence of checks. No check stops the ones
//! after it, so a run always yields exactly one [`HealthCheckResult`] per
//! check, in order:
//!
//! 1. Symlink Check
//! 2. Permission Check
//! 3. Git Status
//! 4. Backup Check
//! 5. Conflict Check
//! 6. Outdated Check
//! 7. Disk Space
//! 8. File Changes
//!
//! Severity and failure are separate things. Every error carries a failure,
//! but only some warnings do. Stale files, low disk space, and uncommitted
//! changes in the File Changes check are advisory. The run as a whole fails
//! if at least one result carries a failure.

use crate::{
    config::{HealthSettings, StoreLayout},
    link::{LinkState, Linker},
    registry::walk_files,
    syscall::CommandRunner,
    vcs::GitBridge,
};

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::{
    fmt::{Display, Formatter, Result as FmtResult},
    fs,
    io,
    path::{Path, PathBuf},
};
use tracing::{debug, info, instrument, warn};

const GIB: f64 = 1024.0 * 1024.0 * 1024.0;

/// Severity of a health check result.
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Clone, Copy, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

impl Display for Severity {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        match self {
            Self::Info => fmt.write_str("info"),
            Self::Warning => fmt.write_str("warning"),
            Self::Error => fmt.write_str("error"),
        }
    }
}

/// Outcome of a single health check.
#[derive(Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
pub struct HealthCheckResult {
    /// Name of the check that produced this result.
    pub status: String,

    /// Human readable summary.
    pub message: String,

    /// Reason this result fails the run, if it does.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    pub timestamp: DateTime<Local>,

    pub severity: Severity,
}

impl HealthCheckResult {
    fn new(
        status: &str,
        message: impl Into<String>,
        error: Option<String>,
        severity: Severity,
    ) -> Self {
        Self {
            status: status.into(),
            message: message.into(),
            error,
            timestamp: Local::now(),
            severity,
        }
    }

    fn info(status: &str, message: impl Into<String>) -> Self {
        Self::new(status, message, None, Severity::Info)
    }

    /// Warning that does not fail the run.
    fn advisory(status: &str, message: impl Into<String>) -> Self {
        Self::new(status, message, None, Severity::Warning)
    }

    /// Warning that fails the run.
    fn failing(status: &str, message: impl Into<String>, error: impl Into<String>) -> Self {
        Self::new(status, message, Some(error.into()), Severity::Warning)
    }

    fn error(status: &str, message: impl Into<String>, error: impl Display) -> Self {
        Self::new(status, message, Some(error.to_string()), Severity::Error)
    }

    /// Check if this result fails the run.
    pub fn is_failure(&self) -> bool {
        self.error.is_some()
    }
}

impl Display for HealthCheckResult {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        let label = if self.is_failure() {
            "FAIL"
        } else if self.severity == Severity::Warning {
            "WARN"
        } else {
            " OK "
        };
        write!(fmt, "[{label}] {}: {}", self.status, self.message)
    }
}

/// Ordered results of one health run.
#[derive(Debug, Default, PartialEq, Eq, Clone)]
pub struct HealthReport {
    results: Vec<HealthCheckResult>,
}

impl HealthReport {
    pub fn results(&self) -> &[HealthCheckResult] {
        &self.results
    }

    /// Check if any result fails the run.
    pub fn has_failures(&self) -> bool {
        self.results.iter().any(HealthCheckResult::is_failure)
    }

    /// Find result of a check by name.
    pub fn get(&self, status: &str) -> Option<&HealthCheckResult> {
        self.results.iter().find(|result| result.status == status)
    }
}

impl Display for HealthReport {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        for result in &self.results {
            writeln!(fmt, "{result}")?;
        }
        Ok(())
    }
}

/// Run health checks against a managed store.
#[derive(Debug)]
pub struct HealthScanner<'store, R>
where
    R: CommandRunner,
{
    layout: &'store StoreLayout,
    settings: &'store HealthSettings,
    git: &'store GitBridge<R>,
}

impl<'store, R> HealthScanner<'store, R>
where
    R: CommandRunner,
{
    /// Construct new health scanner.
    pub fn new(
        layout: &'store StoreLayout,
        settings: &'store HealthSettings,
        git: &'store GitBridge<R>,
    ) -> Self {
        Self {
            layout,
            settings,
            git,
        }
    }

    /// Run every check, and save a snapshot of the results if enabled.
    ///
    /// Failing to save the snapshot only logs a warning.
    #[instrument(skip(self), level = "debug")]
    pub fn scan(&self) -> HealthReport {
        let report = HealthReport {
            results: vec![
                self.check_symlinks(),
                self.check_permissions(),
                self.check_git_status(),
                self.check_backups(),
                self.check_conflicts(),
                self.check_outdated(),
                self.check_disk_space(),
                self.check_file_changes(),
            ],
        };

        if self.settings.save_snapshots {
            match save_snapshot(&self.layout.health_dir(), &report) {
                Ok(path) => debug!("saved health snapshot to {}", path.display()),
                Err(error) => warn!("failed to save health check results: {error}"),
            }
        }

        report
    }

    fn check_symlinks(&self) -> HealthCheckResult {
        const STATUS: &str = "Symlink Check";
        let linker = Linker::new(self.layout);
        match self.flag_tracked(|relative, _| Ok(linker.inspect(relative)? == LinkState::Missing)) {
            Err(error) => HealthCheckResult::error(
                STATUS,
                format!("Error checking symlinks: {error}"),
                error,
            ),
            Ok(broken) if !broken.is_empty() => HealthCheckResult::failing(
                STATUS,
                format!("Found {} broken symlinks: {}", broken.len(), broken.join(", ")),
                "broken symlinks found",
            ),
            Ok(_) => HealthCheckResult::info(STATUS, "All symlinks are valid"),
        }
    }

    fn check_permissions(&self) -> HealthCheckResult {
        const STATUS: &str = "Permission Check";
        let result = self.flag_tracked(|_, absolute| {
            let meta = fs::symlink_metadata(absolute).map_err(|err| HealthError::Inspect {
                source: err,
                path: absolute.to_path_buf(),
            })?;
            Ok(owner_unreadable(&meta))
        });

        match result {
            Err(error) => HealthCheckResult::error(
                STATUS,
                format!("Error checking permissions: {error}"),
                error,
            ),
            Ok(invalid) if !invalid.is_empty() => HealthCheckResult::failing(
                STATUS,
                format!(
                    "Found {} files with invalid permissions: {}",
                    invalid.len(),
                    invalid.join(", ")
                ),
                "invalid permissions found",
            ),
            Ok(_) => HealthCheckResult::info(STATUS, "All files have correct permissions"),
        }
    }

    fn check_git_status(&self) -> HealthCheckResult {
        const STATUS: &str = "Git Status";
        if !self.git.is_repository() {
            return HealthCheckResult::error(STATUS, "Not a git repository", "not a git repository");
        }

        match self.git.status() {
            Err(error) => {
                return HealthCheckResult::error(
                    STATUS,
                    format!("Error checking git status: {error}"),
                    error,
                )
            }
            Ok(status) if !status.trim().is_empty() => {
                return HealthCheckResult::failing(
                    STATUS,
                    "Found uncommitted changes",
                    "uncommitted changes found",
                )
            }
            Ok(_) => {}
        }

        match self.git.has_remote() {
            Ok(true) => {
                HealthCheckResult::info(STATUS, "Repository is clean and properly configured")
            }
            Ok(false) => HealthCheckResult::error(
                STATUS,
                "No remote repository configured",
                "no remote repository",
            ),
            Err(error) => HealthCheckResult::error(
                STATUS,
                format!("Error checking remote: {error}"),
                error,
            ),
        }
    }

    fn check_backups(&self) -> HealthCheckResult {
        const STATUS: &str = "Backup Check";
        let backups_dir = self.layout.backups_dir();
        let entries = match fs::read_dir(&backups_dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return HealthCheckResult::info(STATUS, "No backups yet")
            }
            Err(err) => {
                return HealthCheckResult::error(
                    STATUS,
                    format!("Error reading backups directory: {err}"),
                    err,
                )
            }
        };

        let mut invalid = Vec::new();
        for entry in entries {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    return HealthCheckResult::error(
                        STATUS,
                        format!("Error reading backups directory: {err}"),
                        err,
                    )
                }
            };

            if !entry.file_type().is_ok_and(|kind| kind.is_dir()) {
                continue;
            }

            let path = entry.path();
            if !path.join("metadata.json").exists() || !path.join("content").exists() {
                invalid.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        invalid.sort();

        if invalid.is_empty() {
            HealthCheckResult::info(STATUS, "All backups are valid")
        } else {
            HealthCheckResult::failing(
                STATUS,
                format!("Found {} invalid backups: {}", invalid.len(), invalid.join(", ")),
                "invalid backups found",
            )
        }
    }

    fn check_conflicts(&self) -> HealthCheckResult {
        const STATUS: &str = "Conflict Check";
        let linker = Linker::new(self.layout);
        let conflicts = self.flag_tracked(|relative, _| {
            Ok(linker.inspect(relative)? == LinkState::Conflict)
        });
        match conflicts {
            Err(error) => HealthCheckResult::error(
                STATUS,
                format!("Error checking conflicts: {error}"),
                error,
            ),
            Ok(conflicts) if !conflicts.is_empty() => HealthCheckResult::failing(
                STATUS,
                format!(
                    "Found {} potential conflicts: {}",
                    conflicts.len(),
                    conflicts.join(", ")
                ),
                "conflicts found",
            ),
            Ok(_) => HealthCheckResult::info(STATUS, "No conflicts found"),
        }
    }

    fn check_outdated(&self) -> HealthCheckResult {
        const STATUS: &str = "Outdated Check";
        let stale_after = self.settings.stale_after();
        let result = self.flag_tracked(|_, absolute| {
            let modified = fs::symlink_metadata(absolute)
                .and_then(|meta| meta.modified())
                .map_err(|err| HealthError::Inspect {
                    source: err,
                    path: absolute.to_path_buf(),
                })?;

            // INVARIANT: Timestamps from the future are never stale.
            Ok(modified.elapsed().is_ok_and(|age| age > stale_after))
        });

        match result {
            Err(error) => HealthCheckResult::error(
                STATUS,
                format!("Error checking outdated files: {error}"),
                error,
            ),
            Ok(outdated) if !outdated.is_empty() => HealthCheckResult::advisory(
                STATUS,
                format!(
                    "Found {} potentially outdated files: {}",
                    outdated.len(),
                    outdated.join(", ")
                ),
            ),
            Ok(_) => HealthCheckResult::info(STATUS, "No outdated files found"),
        }
    }

    fn check_disk_space(&self) -> HealthCheckResult {
        const STATUS: &str = "Disk Space";
        let available = match fs2::available_space(self.layout.store_root()) {
            Ok(available) => available,
            Err(err) => {
                return HealthCheckResult::error(
                    STATUS,
                    format!("Error checking disk space: {err}"),
                    err,
                )
            }
        };

        let gib = available as f64 / GIB;
        if available < self.settings.min_free_space_bytes() {
            HealthCheckResult::advisory(STATUS, format!("Low disk space: {gib:.2} GB available"))
        } else {
            HealthCheckResult::info(STATUS, format!("Sufficient disk space: {gib:.2} GB available"))
        }
    }

    fn check_file_changes(&self) -> HealthCheckResult {
        const STATUS: &str = "File Changes";
        if !self.git.is_repository() {
            return HealthCheckResult::info(STATUS, "Not a git repository");
        }

        match self.git.status() {
            Err(error) => HealthCheckResult::error(
                STATUS,
                format!("Error checking file changes: {error}"),
                error,
            ),
            Ok(status) if !status.trim().is_empty() => {
                HealthCheckResult::advisory(STATUS, "Found uncommitted changes")
            }
            Ok(_) => HealthCheckResult::info(STATUS, "No uncommitted changes"),
        }
    }

    /// Collect relative paths of tracked files matching a predicate.
    ///
    /// Predicate receives relative and absolute path of each tracked file.
    fn flag_tracked<F>(&self, mut predicate: F) -> Result<Vec<String>>
    where
        F: FnMut(&Path, &Path) -> Result<bool>,
    {
        let mut flagged = Vec::new();
        for (relative, absolute) in walk_files(self.layout.configs_dir())? {
            if predicate(&relative, &absolute)? {
                flagged.push(relative.display().to_string());
            }
        }

        Ok(flagged)
    }
}

/// Write results of a health run as pretty JSON into the health directory.
///
/// Returns path of the written snapshot.
///
/// # Errors
///
/// - Return [`HealthError::Snapshot`] if the snapshot cannot be written.
/// - Return [`HealthError::Json`] if results cannot be encoded.
pub fn save_snapshot(health_dir: &Path, report: &HealthReport) -> Result<PathBuf> {
    fs::create_dir_all(health_dir).map_err(|err| HealthError::Snapshot {
        source: err,
        path: health_dir.to_path_buf(),
    })?;

    let name = format!("health-check-{}.json", Local::now().format("%Y-%m-%d-%H-%M-%S"));
    let path = health_dir.join(name);
    let data = serde_json::to_vec_pretty(report.results())?;
    fs::write(&path, data).map_err(|err| HealthError::Snapshot {
        source: err,
        path: path.clone(),
    })?;
    info!("health check results saved to {}", path.display());

    Ok(path)
}

#[cfg(unix)]
fn owner_unreadable(meta: &fs::Metadata) -> bool {
    use std::os::unix::fs::PermissionsExt;

    meta.permissions().mode() & 0o400 == 0
}

#[cfg(not(unix))]
fn owner_unreadable(_meta: &fs::Metadata) -> bool {
    false
}

/// Health scanner error types.
#[derive(Debug, thiserror::Error)]
pub enum HealthError {
    #[error(transparent)]
    Registry(#[from] crate::registry::RegistryError),

    #[error(transparent)]
    Link(#[from] crate::link::LinkError),

    /// Tracked file cannot be inspected.
    #[error("failed to inspect {:?}", path.display())]
    Inspect {
        #[source]
        source: io::Error,
        path: PathBuf,
    },

    /// Snapshot cannot be written.
    #[error("failed to write health snapshot {:?}", path.display())]
    Snapshot {
        #[source]
        source: io::Error,
        path: PathBuf,
    },

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Friendly result alias :3
pub type Result<T, E = HealthError> = std::result::Result<T, E>;

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::{config::GitSettings, syscall::fake::FakeRunner, syscall::CommandOutput};

    use pretty_assertions::assert_eq;
    use std::time::{Duration, SystemTime};

    struct Fixture {
        _root: tempfile::TempDir,
        layout: StoreLayout,
    }

    impl Fixture {
        fn new() -> anyhow::Result<Self> {
            let root = tempfile::tempdir()?;
            let layout = StoreLayout::resolve(|| Ok(root.path().to_path_buf()))?;
            layout.ensure_directories()?;
            fs::create_dir_all(layout.git_dir())?;
            Ok(Self { _root: root, layout })
        }

        fn track(&self, relative: &str) -> anyhow::Result<()> {
            let stored = self.layout.stored_path(relative);
            fs::create_dir_all(stored.parent().unwrap())?;
            fs::write(stored, relative)?;
            Ok(())
        }

        fn git(&self, runner: FakeRunner) -> GitBridge<FakeRunner> {
            GitBridge::new(runner, self.layout.store_root(), GitSettings::default())
        }
    }

    fn quiet_settings() -> HealthSettings {
        HealthSettings {
            save_snapshots: false,
            min_free_space_mb: 0,
            ..HealthSettings::default()
        }
    }

    #[test]
    fn scan_runs_every_check_in_order() -> anyhow::Result<()> {
        let fixture = Fixture::new()?;
        let git = fixture.git(FakeRunner::succeeding());
        let settings = quiet_settings();

        let report = HealthScanner::new(&fixture.layout, &settings, &git).scan();
        let names = report
            .results()
            .iter()
            .map(|result| result.status.as_str())
            .collect::<Vec<_>>();
        assert_eq!(
            names,
            vec![
                "Symlink Check",
                "Permission Check",
                "Git Status",
                "Backup Check",
                "Conflict Check",
                "Outdated Check",
                "Disk Space",
                "File Changes",
            ]
        );
        assert!(!report.has_failures(), "{report}");
        Ok(())
    }

    #[test]
    fn broken_symlink_detected_then_cleared() -> anyhow::Result<()> {
        let fixture = Fixture::new()?;
        fixture.track(".bashrc")?;
        let git = fixture.git(FakeRunner::succeeding());
        let settings = quiet_settings();
        let scanner = HealthScanner::new(&fixture.layout, &settings, &git);

        let report = scanner.scan();
        let result = report.get("Symlink Check").unwrap();
        assert_eq!(result.severity, Severity::Warning);
        assert!(result.is_failure());
        assert!(result.message.contains(".bashrc"));
        assert!(report.has_failures());

        Linker::new(&fixture.layout).link_all()?;
        let report = scanner.scan();
        assert_eq!(report.get("Symlink Check").unwrap().severity, Severity::Info);
        assert!(!report.has_failures(), "{report}");
        Ok(())
    }

    #[test]
    fn conflict_detected_then_cleared() -> anyhow::Result<()> {
        let fixture = Fixture::new()?;
        fixture.track(".config/i3/config")?;
        let mirrored = fixture.layout.mirrored_path(".config/i3/config");
        fs::create_dir_all(mirrored.parent().unwrap())?;
        fs::write(&mirrored, "local edit")?;
        let git = fixture.git(FakeRunner::succeeding());
        let settings = quiet_settings();
        let scanner = HealthScanner::new(&fixture.layout, &settings, &git);

        let report = scanner.scan();
        let result = report.get("Conflict Check").unwrap();
        assert!(result.is_failure());
        assert!(result.message.contains(".config/i3/config"));
        assert_eq!(report.get("Symlink Check").unwrap().severity, Severity::Info);

        Linker::new(&fixture.layout).link_all()?;
        let report = scanner.scan();
        assert!(!report.get("Conflict Check").unwrap().is_failure());
        Ok(())
    }

    #[test]
    fn advisory_warnings_do_not_fail_run() -> anyhow::Result<()> {
        let fixture = Fixture::new()?;
        fixture.track(".vimrc")?;
        Linker::new(&fixture.layout).link_all()?;

        let old = SystemTime::now() - Duration::from_secs(90 * 24 * 60 * 60);
        fs::File::options()
            .write(true)
            .open(fixture.layout.stored_path(".vimrc"))?
            .set_modified(old)?;

        let settings = HealthSettings {
            save_snapshots: false,
            min_free_space_mb: 1 << 40,
            ..HealthSettings::default()
        };
        let git = fixture.git(FakeRunner::succeeding());
        let report = HealthScanner::new(&fixture.layout, &settings, &git).scan();

        assert_eq!(report.get("Outdated Check").unwrap().severity, Severity::Warning);
        assert_eq!(report.get("Disk Space").unwrap().severity, Severity::Warning);
        assert!(!report.has_failures(), "{report}");
        Ok(())
    }

    #[test]
    fn uncommitted_changes_fail_only_git_status() -> anyhow::Result<()> {
        let fixture = Fixture::new()?;
        let git = fixture.git(FakeRunner::new(|_, args| {
            if args.iter().any(|arg| arg == "status") {
                CommandOutput::success(" M configs/.bashrc\n")
            } else {
                CommandOutput::success("")
            }
        }));
        let settings = quiet_settings();
        let report = HealthScanner::new(&fixture.layout, &settings, &git).scan();

        assert!(report.get("Git Status").unwrap().is_failure());
        let changes = report.get("File Changes").unwrap();
        assert_eq!(changes.severity, Severity::Warning);
        assert!(!changes.is_failure());
        Ok(())
    }

    #[test]
    fn missing_remote_is_an_error() -> anyhow::Result<()> {
        let fixture = Fixture::new()?;
        let git = fixture.git(FakeRunner::new(|_, args| {
            if args.iter().any(|arg| arg == "get-url") {
                CommandOutput::failure(2, "error: No such remote 'origin'")
            } else {
                CommandOutput::success("")
            }
        }));
        let settings = quiet_settings();
        let report = HealthScanner::new(&fixture.layout, &settings, &git).scan();

        let result = report.get("Git Status").unwrap();
        assert_eq!(result.severity, Severity::Error);
        assert_eq!(result.message, "No remote repository configured");
        Ok(())
    }

    #[test]
    fn not_a_repository() -> anyhow::Result<()> {
        let fixture = Fixture::new()?;
        fs::remove_dir(fixture.layout.git_dir())?;
        let git = fixture.git(FakeRunner::succeeding());
        let settings = quiet_settings();
        let report = HealthScanner::new(&fixture.layout, &settings, &git).scan();

        assert_eq!(report.get("Git Status").unwrap().severity, Severity::Error);
        let changes = report.get("File Changes").unwrap();
        assert_eq!(changes.severity, Severity::Info);
        assert!(report.has_failures());
        Ok(())
    }

    #[test]
    fn incomplete_backup_is_invalid() -> anyhow::Result<()> {
        let fixture = Fixture::new()?;
        let backup = fixture.layout.backups_dir().join("2024-02-20-123456");
        fs::create_dir_all(&backup)?;
        fs::write(backup.join("metadata.json"), "{}")?;
        let git = fixture.git(FakeRunner::succeeding());
        let settings = quiet_settings();
        let report = HealthScanner::new(&fixture.layout, &settings, &git).scan();

        let result = report.get("Backup Check").unwrap();
        assert!(result.is_failure());
        assert!(result.message.contains("2024-02-20-123456"));
        Ok(())
    }

    #[test]
    fn unreadable_stored_file_fails_permission_check() -> anyhow::Result<()> {
        use std::os::unix::fs::PermissionsExt;

        let fixture = Fixture::new()?;
        fixture.track(".netrc")?;
        fs::set_permissions(
            fixture.layout.stored_path(".netrc"),
            fs::Permissions::from_mode(0o200),
        )?;
        let git = fixture.git(FakeRunner::succeeding());
        let settings = quiet_settings();
        let report = HealthScanner::new(&fixture.layout, &settings, &git).scan();

        assert!(report.get("Permission Check").unwrap().is_failure());
        Ok(())
    }

    #[test]
    fn scan_saves_snapshot() -> anyhow::Result<()> {
        let fixture = Fixture::new()?;
        let git = fixture.git(FakeRunner::succeeding());
        let settings = HealthSettings {
            min_free_space_mb: 0,
            ..HealthSettings::default()
        };
        let report = HealthScanner::new(&fixture.layout, &settings, &git).scan();

        let snapshots = fs::read_dir(fixture.layout.health_dir())?.collect::<io::Result<Vec<_>>>()?;
        assert_eq!(snapshots.len(), 1);
        let name = snapshots[0].file_name().to_string_lossy().into_owned();
        assert!(name.starts_with("health-check-") && name.ends_with(".json"));

        let saved: Vec<HealthCheckResult> =
            serde_json::from_slice(&fs::read(snapshots[0].path())?)?;
        assert_eq!(saved, report.results());
        Ok(())
    }
}
