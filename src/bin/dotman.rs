// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use dotman::{config::Visibility, store::Store};

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use inquire::{Confirm, Text};
use std::{
    fs::OpenOptions,
    path::{Path, PathBuf},
    process::exit,
    sync::Mutex,
    time::Duration,
};
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Debug, Clone, Parser)]
#[command(
    about,
    override_usage = "dotman [options] <command>",
    subcommand_help_heading = "Commands",
    version
)]
struct Cli {
    /// Enable debug logging.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Append logs to a file as well.
    #[arg(long, global = true, value_name = "path")]
    pub log_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    fn run(self) -> Result<()> {
        match self.command {
            Command::Init(opts) => run_init(opts),
            Command::Add(opts) => run_add(opts),
            Command::Link => run_link(),
            Command::List => run_list(),
            Command::Commit(opts) => run_commit(opts),
            Command::Update => run_update(),
            Command::Backup(opts) => run_backup(opts),
            Command::Restore(opts) => run_restore(opts),
            Command::Check => run_check(),
            Command::Docs => run_docs(),
            Command::Remove(opts) => run_remove(opts),
        }
    }
}

#[derive(Debug, Clone, Subcommand)]
enum Command {
    /// Initialize managed store as a new or cloned repository.
    #[command(override_usage = "dotman init [options]")]
    Init(InitOptions),

    /// Start tracking a file.
    #[command(override_usage = "dotman add <file>")]
    Add(FileOptions),

    /// Link every tracked file into the home directory.
    Link,

    /// List tracked files.
    List,

    /// Commit and push every change in the managed store.
    #[command(override_usage = "dotman commit <message>")]
    Commit(CommitOptions),

    /// Pull latest changes and relink tracked files.
    Update,

    /// Back up a file.
    #[command(override_usage = "dotman backup <file>")]
    Backup(FileOptions),

    /// Restore a backup, or list backups when no identifier is given.
    #[command(override_usage = "dotman restore [<backup_id>]")]
    Restore(RestoreOptions),

    /// Run health checks over the managed store.
    Check,

    /// Generate documentation for tracked files.
    Docs,

    /// Stop tracking a file and put a regular copy back in its place.
    #[command(override_usage = "dotman remove <file>")]
    Remove(FileOptions),
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct InitOptions {
    /// URL of existing repository to clone into the managed store.
    #[arg(short, long, value_name = "url", conflicts_with = "name")]
    pub url: Option<String>,

    /// Name of new repository to create on the hosting platform.
    #[arg(short, long, value_name = "name")]
    pub name: Option<String>,

    /// Create new repository as private.
    #[arg(short, long, conflicts_with = "url")]
    pub private: bool,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct FileOptions {
    /// Path to target file.
    #[arg(required = true, value_name = "file")]
    pub file: String,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct CommitOptions {
    /// Commit message.
    #[arg(required = true, value_name = "message")]
    pub message: String,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct RestoreOptions {
    /// Identifier of backup to restore.
    #[arg(value_name = "backup_id")]
    pub id: Option<String>,
}

fn main() {
    let cli = Cli::parse();
    if let Err(error) = init_logging(cli.verbose, cli.log_file.as_deref()) {
        eprintln!("failed to set up logging: {error:?}");
        exit(1);
    }

    if let Err(error) = cli.run() {
        error!("{error:?}");
        exit(1);
    }

    exit(0)
}

fn init_logging(verbose: bool, log_file: Option<&Path>) -> Result<()> {
    let level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(level))?;
    let layer = fmt::layer().compact().with_target(false).without_time();

    let file_layer = match log_file {
        Some(path) => {
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            Some(fmt::layer().with_writer(Mutex::new(file)).with_ansi(false))
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(layer)
        .with(file_layer)
        .init();

    Ok(())
}

/// Run a long operation behind a spinner.
fn with_spinner<T>(message: impl Into<String>, job: impl FnOnce() -> Result<T>) -> Result<T> {
    let bar = ProgressBar::new_spinner();
    let style = ProgressStyle::with_template("{spinner:.green} {elapsed_precise:.green}  {msg}")?;
    bar.set_style(style);
    bar.set_message(message.into());
    bar.enable_steady_tick(Duration::from_millis(100));

    let result = job();
    bar.finish_and_clear();
    result
}

enum InitTarget {
    New(String),
    Clone(String),
}

fn prompt_init_target() -> Result<InitTarget> {
    let existing = Confirm::new("Use an existing repository?")
        .with_default(false)
        .prompt()?;

    if existing {
        let url = Text::new("Repository URL:").prompt()?;
        Ok(InitTarget::Clone(url))
    } else {
        let name = Text::new("New repository name:")
            .with_default("dotfiles")
            .prompt()?;
        Ok(InitTarget::New(name))
    }
}

fn run_init(opts: InitOptions) -> Result<()> {
    let target = match (opts.url, opts.name) {
        (Some(url), _) => InitTarget::Clone(url),
        (None, Some(name)) => InitTarget::New(name),
        (None, None) => prompt_init_target()?,
    };
    let visibility = opts.private.then_some(Visibility::Private);

    let store = Store::open()?;
    info!("initialized managed store at {}", store.layout().store_root().display());

    let linked = match target {
        InitTarget::Clone(url) => {
            with_spinner(format!("cloning {url}"), || Ok(store.init_clone(&url)?))?
        }
        InitTarget::New(name) => with_spinner(format!("creating repository {name}"), || {
            Ok(store.init_new(&name, visibility)?)
        })?,
    };
    info!("linked {} tracked files", linked.len());

    Ok(())
}

fn run_add(opts: FileOptions) -> Result<()> {
    let store = Store::open()?;
    let relative = store.add(&opts.file)?;
    info!("now tracking {}", relative.display());

    Ok(())
}

fn run_link() -> Result<()> {
    let store = Store::open()?;
    let linked = store.link()?;
    info!("linked {} tracked files", linked.len());

    Ok(())
}

fn run_list() -> Result<()> {
    let store = Store::open()?;
    let files = store.list()?;
    if files.is_empty() {
        println!("No files are currently being managed");
        return Ok(());
    }

    println!("Managed files:");
    for file in files {
        println!("  - {}", file.display());
    }

    Ok(())
}

fn run_commit(opts: CommitOptions) -> Result<()> {
    let store = Store::open()?;
    with_spinner("pushing changes", || Ok(store.commit(&opts.message)?))?;
    info!("committed and pushed changes");

    Ok(())
}

fn run_update() -> Result<()> {
    let store = Store::open()?;
    let linked = with_spinner("pulling changes", || Ok(store.update()?))?;
    info!("updated and relinked {} tracked files", linked.len());

    Ok(())
}

fn run_backup(opts: FileOptions) -> Result<()> {
    let store = Store::open()?;
    let record = store.backup(&opts.file)?;
    println!("{}", record.id);

    Ok(())
}

fn run_restore(opts: RestoreOptions) -> Result<()> {
    let store = Store::open()?;
    let Some(id) = opts.id else {
        let backups = store.list_backups()?;
        if backups.is_empty() {
            println!("No backups available");
            return Ok(());
        }

        println!("Available backups:");
        for backup in backups {
            println!("  {} - {}", backup.id, backup.original_path.display());
        }
        return Ok(());
    };

    let record = store.restore(&id)?;
    info!("restored {} to {}", record.id, record.original_path.display());

    Ok(())
}

fn run_check() -> Result<()> {
    let store = Store::open()?;
    let report = store.check();
    print!("{report}");

    if report.has_failures() {
        bail!("health check found issues");
    }

    Ok(())
}

fn run_docs() -> Result<()> {
    let store = Store::open()?;
    let written = store.docs()?;
    info!("wrote {} documents to {}", written.len(), store.layout().docs_dir().display());

    Ok(())
}

fn run_remove(opts: FileOptions) -> Result<()> {
    let store = Store::open()?;
    let relative = store.remove(&opts.file)?;
    info!("stopped tracking {}", relative.display());

    Ok(())
}
