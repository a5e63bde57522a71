// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

#[cfg(unix)]
mod integration;

use dotman::{
    config::StoreLayout,
    store::Store,
    syscall::{CommandOutput, CommandRunner},
};

use anyhow::Result;
use std::{
    cell::RefCell,
    ffi::OsString,
    fs,
    path::{Path, PathBuf},
};
use tempfile::TempDir;

type Script = Box<dyn Fn(&str, &[String]) -> Option<CommandOutput>>;

/// Command runner that answers through scripted rules, and records calls.
///
/// The first rule returning an answer wins. Unanswered commands succeed with
/// no output.
#[derive(Default)]
pub(crate) struct ScriptedRunner {
    rules: Vec<Script>,
    calls: RefCell<Vec<Vec<String>>>,
}

impl ScriptedRunner {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Answer `git config --get user.*` with a valid identity.
    pub(crate) fn with_identity(self) -> Self {
        self.rule(|_, args| {
            if !args.iter().any(|arg| arg == "--get") {
                return None;
            }

            match args.last().map(String::as_str) {
                Some("user.name") => Some(CommandOutput::success("John Doe\n")),
                Some("user.email") => Some(CommandOutput::success("john@doe.com\n")),
                _ => None,
            }
        })
    }

    /// Add rule that answers some commands.
    pub(crate) fn rule(
        mut self,
        rule: impl Fn(&str, &[String]) -> Option<CommandOutput> + 'static,
    ) -> Self {
        self.rules.push(Box::new(rule));
        self
    }

    /// Fail first `failures` pushes, then let pushes succeed.
    pub(crate) fn failing_pushes(self, failures: usize) -> Self {
        let pushes = RefCell::new(0);
        self.rule(move |_, args| {
            if !args.iter().any(|arg| arg == "push") {
                return None;
            }

            *pushes.borrow_mut() += 1;
            (*pushes.borrow() <= failures)
                .then(|| CommandOutput::failure(128, "fatal: could not read from remote\n"))
        })
    }

    /// Number of recorded calls whose arguments contain every given word.
    pub(crate) fn count(&self, words: &[&str]) -> usize {
        self.calls
            .borrow()
            .iter()
            .filter(|call| words.iter().all(|word| call.iter().any(|arg| arg == word)))
            .count()
    }

    pub(crate) fn calls(&self) -> Vec<Vec<String>> {
        self.calls.borrow().clone()
    }
}

impl CommandRunner for ScriptedRunner {
    fn run(
        &self,
        program: &str,
        args: &[OsString],
        _cwd: Option<&Path>,
    ) -> std::io::Result<CommandOutput> {
        let mut call = vec![program.to_string()];
        call.extend(args.iter().map(|arg| arg.to_string_lossy().into_owned()));
        self.calls.borrow_mut().push(call.clone());

        let answer = self
            .rules
            .iter()
            .find_map(|rule| rule(program, &call[1..]))
            .unwrap_or_else(|| CommandOutput::success(""));
        Ok(answer)
    }
}

/// Scratch home directory with a managed store inside of it.
pub(crate) struct HomeFixture {
    home: TempDir,
    layout: StoreLayout,
}

impl HomeFixture {
    pub(crate) fn new() -> Result<Self> {
        let fixture = Self::without_settings()?;

        // INVARIANT: Never wait between push attempts in tests.
        fs::create_dir_all(fixture.layout.store_root())?;
        fs::write(fixture.layout.settings_path(), "[git]\nretry_delay_secs = 0\n")?;

        Ok(fixture)
    }

    /// Fixture whose managed store does not exist yet.
    pub(crate) fn without_settings() -> Result<Self> {
        let home = tempfile::tempdir()?;
        let layout = StoreLayout::new(home.path(), home.path().join(".dotman"));
        Ok(Self { home, layout })
    }

    pub(crate) fn home(&self) -> &Path {
        self.home.path()
    }

    pub(crate) fn layout(&self) -> &StoreLayout {
        &self.layout
    }

    /// Open managed store through a scripted runner.
    pub(crate) fn store<'runner>(
        &self,
        runner: &'runner ScriptedRunner,
    ) -> Result<Store<&'runner ScriptedRunner>> {
        Ok(Store::open_with(self.layout.clone(), runner)?)
    }

    /// Write a file relative to the home directory.
    pub(crate) fn write_home_file(
        &self,
        relative: impl AsRef<Path>,
        contents: impl AsRef<str>,
    ) -> Result<PathBuf> {
        let path = self.home.path().join(relative);
        fs::create_dir_all(path.parent().unwrap())?;
        fs::write(&path, contents.as_ref())?;
        Ok(path)
    }

    /// Pretend managed store is a repository.
    pub(crate) fn mark_repository(&self) -> Result<()> {
        fs::create_dir_all(self.layout.git_dir())?;
        Ok(())
    }
}
