// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Dotman: a dotfile manager built on symbolic links and Git.
//!
//! Dotman keeps the real copies of your configuration files inside one
//! __managed store__ directory, and deploys them into your home directory as
//! symbolic links. The managed store is an ordinary Git repository, so the
//! same set of dotfiles can be pushed from one machine and pulled onto
//! another.
//!
//! # Tracked Files
//!
//! A tracked file is identified purely by its path relative to the configs
//! directory of the managed store. That same relative path, taken from the
//! home directory, is where its link gets deployed. So tracking
//! `~/.config/nvim/init.lua` stores it at
//! `~/.dotman/configs/.config/nvim/init.lua`, and links the former to the
//! latter.
//!
//! # Supporting Features
//!
//! Besides tracking and linking, dotman can back up and restore single files,
//! run a set of health checks over the managed store, and generate
//! documentation for every tracked file.
//!
//! [`store::Store`] is the entry point that ties all of this together.

pub mod backup;
pub mod config;
pub mod docs;
pub mod health;
pub mod link;
pub mod path;
pub mod registry;
pub mod store;
pub mod syscall;
pub mod vcs;
