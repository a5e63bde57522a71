// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Path resolution utilities.
//!
//! Determine relevent path information for external files that need to be
//! interacted with, or managed in some way. Paths handed to dotman by the user
//! go through [`expand_user_path`] so `~/.bashrc`, `$HOME/.bashrc`, and
//! `.bashrc` relative to the current directory all mean the same thing.

use std::{
    io,
    path::{Component, Path, PathBuf},
};

/// Name of the managed store directory placed inside the home directory.
pub const STORE_DIR_NAME: &str = ".dotman";

/// Environment variable that overrides the managed store location.
pub const STORE_DIR_ENV: &str = "DOTMAN_DIR";

/// Determine absolute path to user's home directory.
///
/// Does not check if the path returned actually exists.
///
/// # Errors
///
/// - Return [`PathError::NoWayHome`] if home directory path cannot be
///   determined.
pub fn home_dir() -> Result<PathBuf> {
    dirs::home_dir().ok_or(PathError::NoWayHome)
}

/// Expand and absolutize a path given by the user.
///
/// Performs shell expansion (tilde and environment variables), then resolves
/// relative paths against the current working directory. Symbolic links are
/// __not__ resolved, because dotman needs to see the link itself.
///
/// # Errors
///
/// - Return [`PathError::ShellExpansion`] if an environment variable in the
///   path is not defined.
/// - Return [`PathError::Absolute`] if the current directory cannot be read.
pub fn expand_user_path(path: impl AsRef<str>) -> Result<PathBuf> {
    let expanded = shellexpand::full(path.as_ref())?;
    let expanded = PathBuf::from(expanded.as_ref());
    absolutize(&expanded).map_err(|err| PathError::Absolute {
        source: err,
        path: expanded,
    })
}

/// Make path absolute, then lexically drop `.` and `..` components.
///
/// A `..` pops the component before it, so `/home/blah/projects/../.bashrc`
/// becomes `/home/blah/.bashrc`. Symbolic links are __not__ resolved.
///
/// # Errors
///
/// - Return [`io::Error`] if the current directory cannot be read.
pub fn absolutize(path: impl AsRef<Path>) -> io::Result<PathBuf> {
    let absolute = std::path::absolute(path.as_ref())?;
    let mut clean = PathBuf::new();
    for component in absolute.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                clean.pop();
            }
            other => clean.push(other),
        }
    }

    Ok(clean)
}

/// Create a symbolic link at `link` that points to `original`.
#[cfg(unix)]
pub fn symlink(original: impl AsRef<Path>, link: impl AsRef<Path>) -> io::Result<()> {
    std::os::unix::fs::symlink(original, link)
}

/// Create a symbolic link at `link` that points to `original`.
#[cfg(windows)]
pub fn symlink(original: impl AsRef<Path>, link: impl AsRef<Path>) -> io::Result<()> {
    std::os::windows::fs::symlink_file(original, link)
}

/// Remove whatever occupies a path: file, directory tree, or symbolic link.
///
/// Symbolic links are removed themselves, never followed. A missing path is
/// not an error.
pub fn remove_any(path: impl AsRef<Path>) -> io::Result<()> {
    let path = path.as_ref();
    match std::fs::symlink_metadata(path) {
        Ok(meta) if meta.is_dir() => std::fs::remove_dir_all(path),
        Ok(_) => std::fs::remove_file(path),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err),
    }
}

/// Path resolution error types.
#[derive(Debug, thiserror::Error)]
pub enum PathError {
    /// No way to determine user's home directory.
    ///
    /// # See Also
    ///
    /// - [`dirs::home_dir`](https://docs.rs/dirs/latest/dirs/fn.home_dir.html)
    #[error("cannot determine absolute path to user's home directory")]
    NoWayHome,

    /// Failed to perform shell expansion on user path.
    #[error(transparent)]
    ShellExpansion(#[from] shellexpand::LookupError<std::env::VarError>),

    /// Failed to turn user path into an absolute path.
    #[error("failed to make {:?} absolute", path.display())]
    Absolute {
        #[source]
        source: io::Error,
        path: PathBuf,
    },
}

/// Friendly result alias :3
pub type Result<T, E = PathError> = std::result::Result<T, E>;
