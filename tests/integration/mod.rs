// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use crate::{HomeFixture, ScriptedRunner};

use anyhow::Result;
use dotman::{
    config::Visibility,
    health::Severity,
    store::StoreError,
    syscall::CommandOutput,
    vcs::VcsError,
};
use pretty_assertions::assert_eq;
use std::{fs, path::PathBuf};

#[test]
fn add_link_list_remove_cycle() -> Result<()> {
    let fixture = HomeFixture::new()?;
    let runner = ScriptedRunner::new();
    let store = fixture.store(&runner)?;
    let bashrc = fixture.write_home_file(".bashrc", "export EDITOR=nvim\n")?;
    let i3 = fixture.write_home_file(".config/i3/config", "bindsym $mod+Return exec kitty\n")?;

    store.add(bashrc.to_str().unwrap())?;
    store.add(i3.to_str().unwrap())?;
    assert_eq!(
        store.list()?,
        vec![PathBuf::from(".bashrc"), PathBuf::from(".config/i3/config")]
    );
    assert_eq!(fs::read_link(&i3)?, fixture.layout().stored_path(".config/i3/config"));
    assert_eq!(fs::read_to_string(&i3)?, "bindsym $mod+Return exec kitty\n");

    store.remove(i3.to_str().unwrap())?;
    assert_eq!(store.list()?, vec![PathBuf::from(".bashrc")]);
    assert!(!fs::symlink_metadata(&i3)?.file_type().is_symlink());
    assert_eq!(fs::read_to_string(&i3)?, "bindsym $mod+Return exec kitty\n");
    assert!(!fixture.layout().stored_path(".config").exists());
    Ok(())
}

#[test]
fn link_points_every_mirrored_path_at_stored_file() -> Result<()> {
    let fixture = HomeFixture::new()?;
    let runner = ScriptedRunner::new();
    let store = fixture.store(&runner)?;
    for file in [".zshrc", ".config/nvim/init.lua", ".local/share/a/b/c/deep"] {
        let stored = fixture.layout().stored_path(file);
        fs::create_dir_all(stored.parent().unwrap())?;
        fs::write(stored, file)?;
    }
    fixture.write_home_file(".zshrc", "old local copy")?;
    fs::create_dir_all(fixture.home().join(".config/nvim/init.lua"))?;

    let linked = store.link()?;

    assert_eq!(linked.len(), 3);
    for relative in store.list()? {
        let mirrored = fixture.home().join(&relative);
        assert_eq!(fs::read_link(&mirrored)?, fixture.layout().stored_path(&relative));
    }
    Ok(())
}

#[test]
fn init_new_publishes_and_links() -> Result<()> {
    let fixture = HomeFixture::new()?;
    let runner = ScriptedRunner::new().with_identity().failing_pushes(1);
    let store = fixture.store(&runner)?;
    let stored = fixture.layout().stored_path(".gitconfig");
    fs::write(&stored, "[user]\n")?;

    let linked = store.init_new("dotfiles", Some(Visibility::Private))?;

    assert_eq!(linked, vec![fixture.home().join(".gitconfig")]);
    assert_eq!(runner.count(&["gh", "repo", "create", "dotfiles", "--private"]), 1);
    assert_eq!(runner.count(&["commit", "Initial commit"]), 1);
    assert_eq!(runner.count(&["push", "-u", "origin", "main"]), 2);
    assert!(fixture.layout().store_root().join(".gitignore").is_file());
    Ok(())
}

#[test]
fn init_clone_links_cloned_files() -> Result<()> {
    let fixture = HomeFixture::without_settings()?;
    let runner = ScriptedRunner::new().with_identity().rule(|_, args| {
        if args.first().map(String::as_str) != Some("clone") {
            return None;
        }

        // INVARIANT: Simulate what a real clone leaves behind.
        let dest = PathBuf::from(args.last()?);
        fs::create_dir_all(dest.join(".git")).ok()?;
        fs::create_dir_all(dest.join("configs/.config/tmux")).ok()?;
        fs::write(dest.join("configs/.config/tmux/tmux.conf"), "set -g mouse on").ok()?;
        Some(CommandOutput::success(""))
    });
    let store = fixture.store(&runner)?;

    let linked = store.init_clone("github.com/john/dotfiles")?;

    let mirrored = fixture.home().join(".config/tmux/tmux.conf");
    assert_eq!(linked, vec![mirrored.clone()]);
    assert_eq!(fs::read_to_string(mirrored)?, "set -g mouse on");
    assert_eq!(runner.count(&["clone", "https://github.com/john/dotfiles"]), 1);
    assert_eq!(runner.count(&["config", "user.email", "john@doe.com"]), 1);
    Ok(())
}

#[test]
fn commit_retries_push_until_it_succeeds() -> Result<()> {
    let fixture = HomeFixture::new()?;
    fixture.mark_repository()?;
    let runner = ScriptedRunner::new().failing_pushes(2);
    let store = fixture.store(&runner)?;

    store.commit("update shell aliases")?;

    assert_eq!(runner.count(&["push"]), 3);
    Ok(())
}

#[test]
fn commit_gives_up_after_every_push_fails() -> Result<()> {
    let fixture = HomeFixture::new()?;
    fixture.mark_repository()?;
    let runner = ScriptedRunner::new().failing_pushes(3);
    let store = fixture.store(&runner)?;

    let error = store.commit("update shell aliases").unwrap_err();

    assert!(matches!(
        error,
        StoreError::Vcs(VcsError::PushExhausted { attempts: 3, .. })
    ));
    assert!(error.to_string().contains("3 attempts"));
    assert_eq!(runner.count(&["push"]), 3);
    Ok(())
}

#[test]
fn commit_requires_repository() -> Result<()> {
    let fixture = HomeFixture::new()?;
    let runner = ScriptedRunner::new();
    let store = fixture.store(&runner)?;

    assert!(matches!(
        store.commit("msg"),
        Err(StoreError::Vcs(VcsError::NotARepository { .. }))
    ));
    assert!(runner.calls().is_empty());
    Ok(())
}

#[test]
fn backup_and_restore_through_store() -> Result<()> {
    let fixture = HomeFixture::new()?;
    let runner = ScriptedRunner::new();
    let store = fixture.store(&runner)?;
    let vimrc = fixture.write_home_file(".vimrc", "set number\n")?;
    store.add(vimrc.to_str().unwrap())?;

    let record = store.backup(vimrc.to_str().unwrap())?;
    assert_eq!(
        record.symlink_path,
        Some(fixture.layout().stored_path(".vimrc"))
    );
    assert_eq!(store.list_backups()?, vec![record.clone()]);

    fs::remove_file(&vimrc)?;
    store.restore(&record.id)?;

    assert_eq!(fs::read_link(&vimrc)?, fixture.layout().stored_path(".vimrc"));
    assert_eq!(fs::read_to_string(&vimrc)?, "set number\n");
    Ok(())
}

#[test]
fn check_reports_broken_links_until_relinked() -> Result<()> {
    let fixture = HomeFixture::new()?;
    fixture.mark_repository()?;
    let runner = ScriptedRunner::new();
    let store = fixture.store(&runner)?;
    let tmux = fixture.write_home_file(".tmux.conf", "set -g mouse on")?;
    store.add(tmux.to_str().unwrap())?;
    fs::remove_file(&tmux)?;

    let report = store.check();
    let symlinks = report.get("Symlink Check").unwrap();
    assert_eq!(symlinks.severity, Severity::Warning);
    assert!(symlinks.message.contains(".tmux.conf"));
    assert!(report.has_failures());

    store.link()?;
    let report = store.check();
    assert_eq!(report.get("Symlink Check").unwrap().severity, Severity::Info);
    assert_eq!(report.get("Conflict Check").unwrap().severity, Severity::Info);
    assert!(fixture.layout().health_dir().read_dir()?.count() >= 1);
    Ok(())
}

#[test]
fn docs_cover_every_tracked_file() -> Result<()> {
    let fixture = HomeFixture::new()?;
    let runner = ScriptedRunner::new();
    let store = fixture.store(&runner)?;
    let init = fixture.write_home_file(".config/nvim/init.lua", "require('lazy').setup()")?;
    store.add(init.to_str().unwrap())?;

    store.docs()?;

    let docs = fixture.layout().docs_dir();
    let index = fs::read_to_string(docs.join("README.md"))?;
    assert!(index.contains("- [.config/nvim/init.lua](.config/nvim/init.lua.md)"));
    let page = fs::read_to_string(docs.join(".config/nvim/init.lua.md"))?;
    assert!(page.contains("## Dependencies\n\n- lua\n"));
    assert!(docs.join(".config/nvim/init.lua.json").is_file());
    Ok(())
}
