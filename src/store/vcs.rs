use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Mutex;

use tracing::debug;

use crate::error::{ConfigError, Result};
use crate::ports::VersionControl;

// ── GitVersionControl ──

/// Drives the `git` command line in an existing working tree.
#[derive(Debug, Clone)]
pub struct GitVersionControl {
    repo: PathBuf,
}

impl GitVersionControl {
    pub fn new(repo: impl Into<PathBuf>) -> Self {
        Self { repo: repo.into() }
    }

    fn git(&self, args: &[&str]) -> Result<()> {
        debug!(repo = %self.repo.display(), ?args, "git");
        let output = Command::new("git")
            .arg("-C")
            .arg(&self.repo)
            .args(args)
            .output()
            .map_err(|e| ConfigError::VersionControl(format!("failed to run git: {}", e)))?;

        if output.status.success() {
            Ok(())
        } else {
            Err(ConfigError::VersionControl(format!(
                "git {} failed: {}",
                args.first().copied().unwrap_or_default(),
                String::from_utf8_lossy(&output.stderr).trim()
            )))
        }
    }

    fn path_arg(path: &Path) -> Result<&str> {
        path.to_str().ok_or_else(|| {
            ConfigError::VersionControl(format!("path is not valid UTF-8: {}", path.display()))
        })
    }
}

impl VersionControl for GitVersionControl {
    fn add(&self, path: &Path) -> Result<()> {
        self.git(&["add", "--all", "--", Self::path_arg(path)?])
    }

    fn commit(&self, message: &str) -> Result<()> {
        self.git(&["commit", "--allow-empty", "--quiet", "-m", message])
    }

    fn remove(&self, path: &Path) -> Result<()> {
        self.git(&[
            "rm",
            "-r",
            "--cached",
            "--quiet",
            "--ignore-unmatch",
            "--",
            Self::path_arg(path)?,
        ])
    }

    fn revert_to_head(&self) -> Result<()> {
        self.git(&["checkout", "--", "."])
    }
}

// ── NullVersionControl ──

/// Used when version control is switched off. Every call succeeds.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullVersionControl;

impl VersionControl for NullVersionControl {
    fn add(&self, _path: &Path) -> Result<()> {
        Ok(())
    }

    fn commit(&self, _message: &str) -> Result<()> {
        Ok(())
    }

    fn remove(&self, _path: &Path) -> Result<()> {
        Ok(())
    }

    fn revert_to_head(&self) -> Result<()> {
        Ok(())
    }
}

// ── MemoryVersionControl ──

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VcsOp {
    Add(PathBuf),
    Commit(String),
    Remove(PathBuf),
    RevertToHead,
}

/// Records operations in order. Can be told to fail, for testing the
/// best-effort paths.
#[derive(Debug, Default)]
pub struct MemoryVersionControl {
    ops: Mutex<Vec<VcsOp>>,
    failing: Mutex<bool>,
}

impl MemoryVersionControl {
    pub fn new() -> Self {
        Self::default()
    }

    /// A recorder whose every call fails.
    pub fn failing() -> Self {
        let vcs = Self::default();
        vcs.set_failing(true);
        vcs
    }

    pub fn set_failing(&self, failing: bool) {
        if let Ok(mut flag) = self.failing.lock() {
            *flag = failing;
        }
    }

    pub fn ops(&self) -> Vec<VcsOp> {
        self.ops.lock().map(|ops| ops.clone()).unwrap_or_default()
    }

    pub fn commits(&self) -> Vec<String> {
        self.ops()
            .into_iter()
            .filter_map(|op| match op {
                VcsOp::Commit(message) => Some(message),
                _ => None,
            })
            .collect()
    }

    fn record(&self, op: VcsOp) -> Result<()> {
        if *self.failing.lock().map_err(ConfigError::lock)? {
            return Err(ConfigError::VersionControl(format!("refused {:?}", op)));
        }
        self.ops.lock().map_err(ConfigError::lock)?.push(op);
        Ok(())
    }
}

impl VersionControl for MemoryVersionControl {
    fn add(&self, path: &Path) -> Result<()> {
        self.record(VcsOp::Add(path.to_path_buf()))
    }

    fn commit(&self, message: &str) -> Result<()> {
        self.record(VcsOp::Commit(message.to_string()))
    }

    fn remove(&self, path: &Path) -> Result<()> {
        self.record(VcsOp::Remove(path.to_path_buf()))
    }

    fn revert_to_head(&self) -> Result<()> {
        self.record(VcsOp::RevertToHead)
    }
}
