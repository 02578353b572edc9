//! Keeps local clones of operator repositories in sync with their remotes.

use std::ffi::OsStr;
use std::path::Path;
use std::process::Command;

use crate::error::SyncError;

/// Brings a local clone to the latest remote state. Blocking; callers run it
/// off the async runtime.
pub trait RepoSyncer: Send + Sync + 'static {
    fn sync(&self, local: &Path, remote: &str, branch: Option<&str>) -> Result<(), SyncError>;
}

/// [`RepoSyncer`] backed by the `git` binary.
#[derive(Debug, Clone, Default)]
pub struct GitSyncer;

impl RepoSyncer for GitSyncer {
    fn sync(&self, local: &Path, remote: &str, branch: Option<&str>) -> Result<(), SyncError> {
        if !local.exists() {
            let mut args = vec![OsStr::new("clone"), OsStr::new("--quiet")];
            if let Some(branch) = branch {
                args.push(OsStr::new("--branch"));
                args.push(OsStr::new(branch));
            }
            args.push(OsStr::new(remote));
            args.push(local.as_os_str());
            git(None, &args)?;
            tracing::info!(path = %local.display(), remote, "cloned repository");
            return Ok(());
        }

        git(Some(local), &["fetch", "--quiet", "--prune", "origin"])?;
        if let Some(branch) = branch {
            let current = git(Some(local), &["rev-parse", "--abbrev-ref", "HEAD"])?;
            if current != branch {
                git(Some(local), &["switch", "--quiet", branch])?;
                tracing::info!(path = %local.display(), from = %current, to = branch, "switched branch");
            }
        }
        git(Some(local), &["pull", "--quiet", "--ff-only"])?;
        Ok(())
    }
}

/// Run git and return its trimmed stdout.
fn git<S: AsRef<OsStr>>(cwd: Option<&Path>, args: &[S]) -> Result<String, SyncError> {
    let display = args
        .iter()
        .map(|a| a.as_ref().to_string_lossy())
        .collect::<Vec<_>>()
        .join(" ");

    let mut cmd = Command::new("git");
    if let Some(cwd) = cwd {
        cmd.current_dir(cwd);
    }
    let output = cmd
        .args(args)
        .env("GIT_TERMINAL_PROMPT", "0")
        .output()
        .map_err(|source| SyncError::Spawn {
            args: display.clone(),
            source,
        })?;

    if !output.status.success() {
        return Err(SyncError::Git {
            args: display,
            status: output.status,
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }
    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}
