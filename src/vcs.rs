// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Version control bridge.
//!
//! The managed store root doubles as a regular Git repository. Dotman drives
//! it by calling the `git` binary with `-C <store_root>`, and optionally calls
//! the GitHub `gh` binary to create the remote repository during
//! initialization. Both binaries are black boxes: exit code and captured
//! output are all that dotman looks at.
//!
//! # Ignore Rules
//!
//! Only tracked files are versioned. Backups, health snapshots, generated
//! documentation, and local settings stay out of the repository through the
//! `.gitignore` file written at initialization.
//!
//! # Retry Policy
//!
//! Pushing is the only operation that is ever retried. A failed push is tried
//! again up to the configured number of attempts, waiting a little longer
//! after each failure.

use crate::{
    config::{GitSettings, Visibility},
    syscall::{CommandOutput, CommandRunner},
};

use std::{
    ffi::OsString,
    fs,
    path::{Path, PathBuf},
    thread,
    time::Duration,
};
use tracing::{debug, info, instrument, warn};

const GITIGNORE: &str = "\
# Managed by dotman: only tracked files are versioned.
/*
!/.gitignore
!/README.md
!/configs/
";

const README: &str = "\
# Dotman Managed Dotfiles

This is my dotman-managed dotfiles repository.
";

/// Author identity that Git commits are made with.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct Identity {
    pub name: String,
    pub email: String,
}

/// Bridge between the managed store and external version control tooling.
#[derive(Debug)]
pub struct GitBridge<R>
where
    R: CommandRunner,
{
    runner: R,
    store_root: PathBuf,
    settings: GitSettings,
}

impl<R> GitBridge<R>
where
    R: CommandRunner,
{
    /// Construct new bridge for a managed store root.
    pub fn new(runner: R, store_root: impl Into<PathBuf>, settings: GitSettings) -> Self {
        Self {
            runner,
            store_root: store_root.into(),
            settings,
        }
    }

    /// Check if managed store is a repository.
    ///
    /// Only checks that the metadata directory exists. Does not validate it.
    pub fn is_repository(&self) -> bool {
        self.store_root.join(".git").exists()
    }

    /// Determine configured author identity.
    ///
    /// # Errors
    ///
    /// - Return [`VcsError::MissingIdentity`] if `user.name` or `user.email`
    ///   is not configured.
    pub fn identity(&self) -> Result<Identity> {
        let name = self.config_value("user.name")?;
        let email = self.config_value("user.email")?;
        Ok(Identity { name, email })
    }

    /// Initialize managed store as a new repository, and publish it.
    ///
    /// Creates the remote repository through the hosting platform CLI, makes
    /// the initial commit, and pushes it to the configured branch.
    ///
    /// # Errors
    ///
    /// - Return [`VcsError::MissingIdentity`] if author identity is missing.
    /// - Return [`VcsError::HostingPlatform`] if remote repository creation
    ///   fails. This is attempted exactly once.
    /// - Return [`VcsError::Command`] if any Git call fails.
    /// - Return [`VcsError::PushExhausted`] if every push attempt fails.
    #[instrument(skip(self), level = "debug")]
    pub fn init_repo(&self, repo_name: &str, visibility: Visibility) -> Result<()> {
        self.identity()?;

        info!("initialize repository at {}", self.store_root.display());
        self.git(["init"])?;
        self.write_store_file(".gitignore", GITIGNORE)?;
        self.write_store_file("README.md", README)?;

        info!("create remote repository {repo_name}");
        let output = self.call(
            "gh",
            [
                OsString::from("repo"),
                "create".into(),
                repo_name.into(),
                visibility.as_flag().into(),
                "--source".into(),
                self.store_root.clone().into_os_string(),
                "--remote".into(),
                self.settings.remote.as_str().into(),
            ],
        )?;
        if !output.is_success() {
            return Err(VcsError::HostingPlatform {
                repo_name: repo_name.into(),
                message: output.message(),
            });
        }

        self.git(["add", "."])?;
        self.git(["commit", "-m", "Initial commit"])?;
        self.git(["branch", "-M", self.settings.branch.as_str()])?;
        self.push_with_retry([
            "push",
            "-u",
            self.settings.remote.as_str(),
            self.settings.branch.as_str(),
        ])?;

        Ok(())
    }

    /// Populate managed store by cloning an existing repository.
    ///
    /// The store root must be empty, save for an empty configs directory.
    /// After cloning, the configs directory and ignore rules are put in place,
    /// the author identity is recorded in the repository, and the result is
    /// committed. Failing to push that commit is only a warning, because the
    /// clone itself already succeeded.
    ///
    /// # Errors
    ///
    /// - Return [`VcsError::MissingIdentity`] if author identity is missing.
    /// - Return [`VcsError::StoreNotEmpty`] if store root holds anything else.
    /// - Return [`VcsError::Command`] if any Git call fails.
    #[instrument(skip(self, url), level = "debug")]
    pub fn clone_repo(&self, url: &str) -> Result<()> {
        let identity = self.identity()?;
        self.prepare_clone_target()?;

        let url = normalize_remote_url(url);
        info!("clone {url}");
        let output = self.call(
            "git",
            [
                OsString::from("clone"),
                url.into(),
                self.store_root.clone().into_os_string(),
            ],
        )?;
        if !output.is_success() {
            return Err(VcsError::Command {
                command: "git clone".into(),
                code: output.to_string(),
                message: output.message(),
            });
        }

        let configs = self.store_root.join("configs");
        fs::create_dir_all(&configs).map_err(|err| VcsError::Io {
            source: err,
            path: configs,
        })?;
        self.write_store_file(".gitignore", GITIGNORE)?;

        self.git(["config", "user.name", identity.name.as_str()])?;
        self.git(["config", "user.email", identity.email.as_str()])?;
        self.git(["add", "configs", ".gitignore"])?;

        let output = self.git_output(["commit", "-m", "Add configs directory"])?;
        match output.code {
            Some(0) => {
                if let Err(error) = self.push_with_retry(["push"]) {
                    warn!("failed to push changes: {error}");
                }
            }
            // INVARIANT: Exit code 1 means nothing to commit.
            Some(1) => info!("no changes to commit"),
            _ => {
                return Err(VcsError::Command {
                    command: "git commit".into(),
                    code: output.to_string(),
                    message: output.message(),
                })
            }
        }

        Ok(())
    }

    /// Stage and commit one tracked file if it changed anything.
    ///
    /// Returns whether a commit was made.
    ///
    /// # Errors
    ///
    /// - Return [`VcsError::Command`] if any Git call fails.
    #[instrument(skip(self, relative), level = "debug")]
    pub fn record_file(&self, relative: &Path) -> Result<bool> {
        let stored = Path::new("configs").join(relative);
        self.git([OsString::from("add"), "-f".into(), stored.into_os_string()])?;

        if self.status()?.trim().is_empty() {
            info!("no changes to commit");
            return Ok(false);
        }

        self.git([
            OsString::from("commit"),
            "-m".into(),
            format!("Add {}", relative.display()).into(),
        ])?;

        Ok(true)
    }

    /// Stage everything, commit it, and push it.
    ///
    /// Each step must succeed before the next one runs.
    ///
    /// # Errors
    ///
    /// - Return [`VcsError::NotARepository`] if store is not a repository.
    /// - Return [`VcsError::Command`] if staging or committing fails.
    /// - Return [`VcsError::PushExhausted`] if every push attempt fails.
    #[instrument(skip(self), level = "debug")]
    pub fn stage_commit_push(&self, message: &str) -> Result<()> {
        self.require_repository()?;
        self.git(["add", "."])?;
        self.git(["commit", "-m", message])?;
        self.push_with_retry(["push"])?;

        Ok(())
    }

    /// Pull latest changes from remote.
    ///
    /// # Errors
    ///
    /// - Return [`VcsError::NotARepository`] if store is not a repository.
    /// - Return [`VcsError::Command`] if pull fails.
    #[instrument(skip(self), level = "debug")]
    pub fn pull(&self) -> Result<String> {
        self.require_repository()?;
        self.git(["pull"])
    }

    /// Porcelain status output of the repository.
    ///
    /// # Errors
    ///
    /// - Return [`VcsError::Command`] if status cannot be obtained.
    pub fn status(&self) -> Result<String> {
        self.git(["status", "--porcelain"])
    }

    /// Check if configured remote exists.
    ///
    /// # Errors
    ///
    /// - Return [`VcsError::Spawn`] if Git cannot be executed at all.
    pub fn has_remote(&self) -> Result<bool> {
        let output = self.git_output(["remote", "get-url", self.settings.remote.as_str()])?;
        Ok(output.is_success())
    }

    /// Push with bounded retries and linear backoff.
    ///
    /// Returns the number of attempts that were needed.
    ///
    /// # Errors
    ///
    /// - Return [`VcsError::PushExhausted`] if every attempt fails.
    /// - Return [`VcsError::Spawn`] if Git cannot be executed at all.
    pub fn push_with_retry<I, S>(&self, args: I) -> Result<u32>
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        let args = args.into_iter().map(Into::into).collect::<Vec<_>>();
        let attempts = self.settings.push_attempts.max(1);
        let mut last = CommandOutput::default();

        for attempt in 1..=attempts {
            let output = self.git_output(args.clone())?;
            if output.is_success() {
                debug!("push succeeded on attempt {attempt}");
                return Ok(attempt);
            }

            warn!("push attempt {attempt}/{attempts} failed: {}", output.message());
            last = output;
            if attempt < attempts {
                thread::sleep(self.backoff(attempt));
            }
        }

        Err(VcsError::PushExhausted {
            attempts,
            message: last.message(),
        })
    }

    /// Delay to wait after a failed push attempt.
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.settings.retry_delay().checked_mul(attempt).unwrap_or(Duration::MAX)
    }

    fn require_repository(&self) -> Result<()> {
        if !self.is_repository() {
            return Err(VcsError::NotARepository {
                path: self.store_root.clone(),
            });
        }

        Ok(())
    }

    fn config_value(&self, key: &'static str) -> Result<String> {
        let output = self.call("git", ["config", "--get", key])?;
        let value = output.stdout.trim();
        if !output.is_success() || value.is_empty() {
            return Err(VcsError::MissingIdentity { key });
        }

        Ok(value.to_string())
    }

    fn prepare_clone_target(&self) -> Result<()> {
        let entries = match fs::read_dir(&self.store_root) {
            Ok(entries) => entries.collect::<std::io::Result<Vec<_>>>(),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(err) => Err(err),
        }
        .map_err(|err| VcsError::Io {
            source: err,
            path: self.store_root.clone(),
        })?;

        for entry in entries {
            let path = entry.path();

            // INVARIANT: Git only clones into empty directories, so clear out
            // the empty configs directory that store setup leaves behind.
            let is_empty_configs = entry.file_name() == "configs"
                && fs::read_dir(&path).is_ok_and(|mut dir| dir.next().is_none());
            if !is_empty_configs {
                return Err(VcsError::StoreNotEmpty {
                    path: self.store_root.clone(),
                });
            }

            fs::remove_dir(&path).map_err(|err| VcsError::Io { source: err, path })?;
        }

        Ok(())
    }

    fn write_store_file(&self, name: &str, contents: &str) -> Result<()> {
        let path = self.store_root.join(name);
        fs::write(&path, contents).map_err(|err| VcsError::Io { source: err, path })
    }

    fn git<I, S>(&self, args: I) -> Result<String>
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        let args = args.into_iter().map(Into::into).collect::<Vec<_>>();
        let command = format!(
            "git {}",
            args.first().map(|arg| arg.to_string_lossy()).unwrap_or_default()
        );
        let output = self.git_output(args)?;
        if !output.is_success() {
            return Err(VcsError::Command {
                command,
                code: output.to_string(),
                message: output.message(),
            });
        }

        Ok(output.stdout)
    }

    fn git_output<I, S>(&self, args: I) -> Result<CommandOutput>
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        let mut bin_args: Vec<OsString> =
            vec!["-C".into(), self.store_root.clone().into_os_string()];
        bin_args.extend(args.into_iter().map(Into::into));
        self.call("git", bin_args)
    }

    fn call<I, S>(&self, program: &str, args: I) -> Result<CommandOutput>
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        let args = args.into_iter().map(Into::into).collect::<Vec<_>>();
        self.runner
            .run(program, &args, None)
            .map_err(|err| VcsError::Spawn {
                source: err,
                program: program.into(),
            })
    }
}

/// Give scheme-less remote URLs an `https://` scheme.
///
/// URLs that already carry a scheme, SCP-like SSH addresses, and local paths
/// are left alone.
pub fn normalize_remote_url(url: &str) -> String {
    let url = url.trim();
    if url.contains("://") || url.starts_with("git@") || Path::new(url).exists() {
        return url.to_string();
    }

    format!("https://{url}")
}

/// Version control error types.
#[derive(Debug, thiserror::Error)]
pub enum VcsError {
    /// Managed store is not a repository.
    #[error("{:?} is not a git repository, run `dotman init` first", path.display())]
    NotARepository { path: PathBuf },

    /// Required author identity is not configured.
    #[error("git {key} not configured, run: git config --global {key} <value>")]
    MissingIdentity { key: &'static str },

    /// Managed store has content that cloning would clobber.
    #[error("managed store {:?} is not empty, move its contents elsewhere first", path.display())]
    StoreNotEmpty { path: PathBuf },

    /// External program could not be executed.
    #[error("failed to execute {program:?}")]
    Spawn {
        #[source]
        source: std::io::Error,
        program: String,
    },

    /// Git exited unsuccessfully.
    #[error("command {command:?} failed with {code}:\n{message}")]
    Command {
        command: String,
        code: String,
        message: String,
    },

    /// Remote repository creation through the hosting platform failed.
    #[error(
        "failed to create repository {repo_name:?}, make sure the GitHub CLI (gh) is installed \
         and authenticated:\n{message}"
    )]
    HostingPlatform { repo_name: String, message: String },

    /// Every push attempt failed.
    #[error("failed to push after {attempts} attempts:\n{message}")]
    PushExhausted { attempts: u32, message: String },

    /// Store file could not be written or read.
    #[error("failed to access {:?}", path.display())]
    Io {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },
}

/// Friendly result alias :3
pub type Result<T, E = VcsError> = std::result::Result<T, E>;
