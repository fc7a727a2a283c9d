//! Shared helpers: local git "remotes" and a test `Deps`

#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use plugdeps::config::{Config, PathConfig};
use plugdeps::{Confirm, Deps, Notifier};

/// Run git in `dir`, panicking on failure; returns trimmed stdout
pub fn git(dir: &Path, args: &[&str]) -> String {
    let output = Command::new("git")
        .args(args)
        .current_dir(dir)
        .env("GIT_TERMINAL_PROMPT", "0")
        .output()
        .expect("git runs");
    assert!(
        output.status.success(),
        "git {:?} failed: {}",
        args,
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8_lossy(&output.stdout).trim().to_string()
}

/// A repository with `main` as default branch and one commit adding `doc/<name>.txt`
pub fn setup_git_repo(dir: &Path) -> String {
    fs::create_dir_all(dir).unwrap();
    git(dir, &["init", "--quiet", "-b", "main"]);
    git(dir, &["config", "user.email", "test@test.com"]);
    git(dir, &["config", "user.name", "Test"]);
    let name = dir.file_name().unwrap().to_string_lossy().to_string();
    commit(dir, &format!("doc/{}.txt", name), &format!("*{}*  help for {}\n", name, name), "initial")
}

/// Write `file` and commit it; returns the new commit hash
pub fn commit(repo: &Path, file: &str, content: &str, message: &str) -> String {
    let path = repo.join(file);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(&path, content).unwrap();
    git(repo, &["add", "--all"]);
    git(repo, &["commit", "--quiet", "-m", message]);
    head(repo)
}

pub fn head(repo: &Path) -> String {
    git(repo, &["rev-parse", "HEAD"])
}

pub fn remote_path(root: &Path, name: &str) -> PathBuf {
    root.join("remotes").join(name)
}

/// Config rooted in `root` with every path inside it
pub fn test_config(root: &Path) -> Config {
    Config {
        n_threads: 2,
        timeout_ms: 20_000,
        path: PathConfig {
            package: root.join("site"),
            snapshot: root.join("snapshot.yml"),
            log: root.join("update.log"),
        },
        ..Config::default()
    }
}

pub fn test_deps(root: &Path, notifier: Notifier, confirm: impl Confirm + 'static) -> Deps {
    Deps::new(&test_config(root), notifier).with_confirm(confirm)
}

pub fn source_of(path: &Path) -> String {
    path.to_string_lossy().to_string()
}
