// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Documentation generation for tracked files.
//!
//! Generated documentation lives in `<store>/docs`. It consists of an index
//! `README.md` linking to one markdown page per tracked file, and a JSON
//! sibling of every page carrying the same information for tooling.
//!
//! Tags and dependencies are guessed with cheap heuristics over the file
//! name and content. They are hints, nothing more.

use crate::{config::StoreLayout, registry::walk_files};

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::{
    fmt::Write as _,
    fs,
    io,
    path::{Path, PathBuf},
};
use tracing::{debug, info, instrument};

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Documentation record of one tracked file.
#[derive(Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
pub struct ConfigDoc {
    /// Path relative to the configs directory.
    pub path: PathBuf,
    pub description: String,
    pub last_updated: DateTime<Local>,
    pub tags: Vec<String>,
    pub dependencies: Vec<String>,
    pub notes: String,
}

impl ConfigDoc {
    /// Build documentation record for a tracked file.
    ///
    /// # Errors
    ///
    /// - Return [`DocsError::Inspect`] if stored file cannot be inspected.
    pub fn inspect(relative: impl Into<PathBuf>, stored: &Path) -> Result<Self> {
        let modified = fs::symlink_metadata(stored)
            .and_then(|meta| meta.modified())
            .map_err(|err| DocsError::Inspect {
                source: err,
                path: stored.to_path_buf(),
            })?;

        // INVARIANT: Unreadable content just means no dependencies detected.
        let content = fs::read(stored)
            .map(|data| String::from_utf8_lossy(&data).into_owned())
            .unwrap_or_default();

        Ok(Self {
            path: relative.into(),
            description: String::new(),
            last_updated: DateTime::from(modified),
            tags: detect_tags(stored),
            dependencies: detect_dependencies(&content),
            notes: String::new(),
        })
    }

    /// Render record as a markdown page.
    pub fn to_markdown(&self) -> String {
        let mut page = String::new();
        let _ = writeln!(page, "# {}\n", self.path.display());
        let _ = writeln!(page, "Last Updated: {}\n", self.last_updated.format(TIME_FORMAT));
        push_list(&mut page, "Tags", &self.tags);
        push_list(&mut page, "Dependencies", &self.dependencies);
        push_section(&mut page, "Description", &self.description);
        push_section(&mut page, "Notes", &self.notes);
        page
    }
}

fn push_list(page: &mut String, heading: &str, items: &[String]) {
    if items.is_empty() {
        return;
    }

    let _ = writeln!(page, "## {heading}\n");
    for item in items {
        let _ = writeln!(page, "- {item}");
    }
    page.push('\n');
}

fn push_section(page: &mut String, heading: &str, body: &str) {
    if body.is_empty() {
        return;
    }

    let _ = writeln!(page, "## {heading}\n\n{body}\n");
}

/// Guess tags of a file from its extension and name.
///
/// Extension means everything from the last dot of the file name onward, so
/// `.vimrc` has extension `.vimrc`.
pub fn detect_tags(path: &Path) -> Vec<String> {
    let name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    let extension = name.rfind('.').map(|idx| &name[idx..]).unwrap_or_default();

    let mut tags = Vec::new();
    match extension {
        ".rc" | ".conf" | ".config" => tags.push("configuration"),
        ".sh" | ".bash" | ".zsh" => tags.push("shell"),
        ".vim" | ".vimrc" => tags.push("vim"),
        ".gitconfig" => tags.push("git"),
        _ => {}
    }

    for (needle, tag) in [("i3", "i3"), ("tmux", "tmux"), ("nvim", "neovim")] {
        if name.contains(needle) {
            tags.push(tag);
        }
    }

    tags.into_iter().map(String::from).collect()
}

/// Guess tooling a file depends on from its content.
pub fn detect_dependencies(content: &str) -> Vec<String> {
    [("require", "lua"), ("plugin", "vim-plug"), ("source", "shell")]
        .into_iter()
        .filter(|(needle, _)| content.contains(needle))
        .map(|(_, dependency)| dependency.to_string())
        .collect()
}

/// Generate documentation for every tracked file.
///
/// Writes the index first, then one markdown page and one JSON record per
/// tracked file. Returns every written path. Stops at the first failure,
/// leaving already written documents in place.
///
/// # Errors
///
/// - Return [`DocsError::Registry`] if tracked files cannot be listed.
/// - Return [`DocsError::Inspect`] if a tracked file cannot be inspected.
/// - Return [`DocsError::Write`] if a document cannot be written.
#[instrument(skip(layout), level = "debug")]
pub fn generate(layout: &StoreLayout) -> Result<Vec<PathBuf>> {
    let docs_dir = layout.docs_dir();
    create_dir(&docs_dir)?;

    let tracked = walk_files(layout.configs_dir())?;
    let mut written = Vec::with_capacity(tracked.len() * 2 + 1);

    let relatives = tracked.iter().map(|(relative, _)| relative.as_path()).collect::<Vec<_>>();
    let index = docs_dir.join("README.md");
    write_doc(&index, render_index(&relatives, Local::now()))?;
    written.push(index);

    for (relative, stored) in &tracked {
        let doc = ConfigDoc::inspect(relative, stored)?;

        let page = docs_dir.join(format!("{}.md", relative.display()));
        write_doc(&page, doc.to_markdown())?;
        written.push(page);

        let record = docs_dir.join(format!("{}.json", relative.display()));
        write_doc(&record, serde_json::to_string_pretty(&doc)?)?;
        written.push(record);
        debug!("documented {}", relative.display());
    }
    info!("generated documentation for {} files in {}", tracked.len(), docs_dir.display());

    Ok(written)
}

/// Render index page linking to every tracked file's page.
pub fn render_index(tracked: &[&Path], generated: DateTime<Local>) -> String {
    let mut index = String::from("# Dotman Configuration Documentation\n\n");
    let _ = writeln!(index, "Generated on: {}\n", generated.format(TIME_FORMAT));

    index.push_str("## Managed Configuration Files\n\n");
    for path in tracked {
        let _ = writeln!(index, "- [{0}]({0}.md)", path.display());
    }

    index.push_str(concat!(
        "\n## Quick Start\n\n",
        "1. Clone this repository\n",
        "2. Run `dotman link` to create symbolic links\n",
        "3. Run `dotman check` to verify your configuration\n\n",
        "## Maintenance\n\n",
        "- Run `dotman check` regularly to monitor configuration health\n",
        "- Use `dotman backup` before making significant changes\n",
        "- Keep your configuration up to date with `dotman update`\n",
    ));

    index
}

fn create_dir(path: &Path) -> Result<()> {
    fs::create_dir_all(path).map_err(|err| DocsError::Write {
        source: err,
        path: path.to_path_buf(),
    })
}

fn write_doc(path: &Path, content: String) -> Result<()> {
    if let Some(parent) = path.parent() {
        create_dir(parent)?;
    }

    fs::write(path, content).map_err(|err| DocsError::Write {
        source: err,
        path: path.to_path_buf(),
    })
}

/// Documentation generation error types.
#[derive(Debug, thiserror::Error)]
pub enum DocsError {
    #[error(transparent)]
    Registry(#[from] crate::registry::RegistryError),

    /// Tracked file cannot be inspected.
    #[error("failed to inspect {:?}", path.display())]
    Inspect {
        #[source]
        source: io::Error,
        path: PathBuf,
    },

    /// Document cannot be written.
    #[error("failed to write {:?}", path.display())]
    Write {
        #[source]
        source: io::Error,
        path: PathBuf,
    },

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Friendly result alias :3
pub type Result<T, E = DocsError> = std::result::Result<T, E>;
