use async_trait::async_trait;
use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, info};

use super::RecordStore;
use crate::config::RepositoryConfig;
use crate::error::{Result, SyncError};

/// Record store backed by a shallow clone of one branch, driven through the
/// `git` command line. Every failing command is a persistence error.
pub struct GitStore {
    worktree: PathBuf,
    records_dir: PathBuf,
    commit_message: String,
}

impl GitStore {
    /// Clone `config.branch` into `worktree` (which must not exist or be
    /// empty) and set the committer identity.
    pub async fn clone_into(config: &RepositoryConfig, worktree: &Path) -> Result<Self> {
        info!(
            "Cloning repo={} branch={} into {}",
            redact_url(&config.url),
            config.branch,
            worktree.display()
        );

        run_git(
            None,
            [
                OsStr::new("clone"),
                OsStr::new("--depth"),
                OsStr::new("1"),
                OsStr::new("--branch"),
                OsStr::new(&config.branch),
                OsStr::new(&config.url),
                worktree.as_os_str(),
            ],
        )
        .await?;
        run_git(Some(worktree), ["config", "user.email", config.committer.as_str()]).await?;
        run_git(Some(worktree), ["config", "user.name", config.committer.as_str()]).await?;

        let records_dir = worktree.join(&config.messages_dir);
        tokio::fs::create_dir_all(&records_dir).await.map_err(|e| {
            SyncError::persistence(format!("Failed to create {}", records_dir.display()), e)
        })?;

        Ok(Self {
            worktree: worktree.to_path_buf(),
            records_dir,
            commit_message: config.commit_message.clone(),
        })
    }

    pub fn worktree(&self) -> &Path {
        &self.worktree
    }

    /// True when the index differs from HEAD.
    async fn has_staged_changes(&self) -> Result<bool> {
        let status = git_command(Some(&self.worktree))
            .args(["diff", "--cached", "--quiet"])
            .status()
            .await
            .map_err(|e| SyncError::persistence("Failed to spawn git diff", e))?;
        match status.code() {
            Some(0) => Ok(false),
            Some(1) => Ok(true),
            code => Err(SyncError::Persistence(format!(
                "git diff exited with status {}",
                code.unwrap_or(-1)
            ))),
        }
    }
}

#[async_trait]
impl RecordStore for GitStore {
    fn records_dir(&self) -> &Path {
        &self.records_dir
    }

    async fn sync(&self) -> Result<()> {
        run_git(Some(&self.worktree), ["pull"]).await
    }

    async fn publish(&self) -> Result<()> {
        run_git(Some(&self.worktree), ["add", "."]).await?;
        if self.has_staged_changes().await? {
            run_git(Some(&self.worktree), ["commit", "-m", self.commit_message.as_str()]).await?;
        } else {
            debug!("Nothing changed in the working copy, skipping commit");
        }
        run_git(Some(&self.worktree), ["push"]).await
    }
}

fn git_command(cwd: Option<&Path>) -> Command {
    let mut cmd = Command::new("git");
    // Fail instead of waiting on a credential prompt nobody can answer.
    cmd.env("GIT_TERMINAL_PROMPT", "0")
        .stdin(Stdio::null())
        .stdout(Stdio::from(std::io::stderr()));
    if let Some(dir) = cwd {
        cmd.current_dir(dir);
    }
    cmd
}

async fn run_git<I, S>(cwd: Option<&Path>, args: I) -> Result<()>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let args: Vec<OsString> = args
        .into_iter()
        .map(|arg| arg.as_ref().to_os_string())
        .collect();
    // Only the subcommand goes into messages; other arguments may hold credentials.
    let subcommand = args
        .first()
        .map(|arg| arg.to_string_lossy().into_owned())
        .unwrap_or_default();

    let status = git_command(cwd)
        .args(&args)
        .status()
        .await
        .map_err(|e| SyncError::persistence(format!("Failed to spawn git {}", subcommand), e))?;

    if !status.success() {
        return Err(SyncError::Persistence(format!(
            "git {} exited with status {}",
            subcommand,
            status.code().unwrap_or(-1)
        )));
    }
    Ok(())
}

/// Drop `user:password@` from a URL before it is logged.
fn redact_url(url: &str) -> String {
    let Some((scheme, rest)) = url.split_once("://") else {
        return url.to_string();
    };
    let authority_end = rest.find('/').unwrap_or(rest.len());
    match rest[..authority_end].rfind('@') {
        Some(at) => format!("{}://***@{}", scheme, &rest[at + 1..]),
        None => url.to_string(),
    }
}
