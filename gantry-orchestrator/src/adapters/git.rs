//! Git source control
//!
//! Shells out to `git`. Snapshots are fresh clones checked out at the
//! requested ref, one directory per resolution.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::debug;
use uuid::Uuid;

use crate::ports::{CollaboratorError, ContentSnapshot, SourceControl};

pub struct GitSourceControl {
    checkout_root: PathBuf,
}

impl GitSourceControl {
    pub fn new(artifact_root: &Path) -> Self {
        Self {
            checkout_root: artifact_root.join("sources"),
        }
    }
}

#[async_trait]
impl SourceControl for GitSourceControl {
    async fn resolve_ref(
        &self,
        repository: &str,
        git_ref: &str,
    ) -> Result<ContentSnapshot, CollaboratorError> {
        tokio::fs::create_dir_all(&self.checkout_root).await?;
        let dest = self.checkout_root.join(Uuid::new_v4().to_string());
        let dest_str = dest.to_string_lossy().into_owned();

        debug!("Cloning {} into {}", repository, dest_str);
        run_git(&["clone", "--quiet", "--no-checkout", repository, &dest_str]).await?;
        run_git(&["-C", &dest_str, "checkout", "--quiet", git_ref]).await?;
        let commit = run_git(&["-C", &dest_str, "rev-parse", "HEAD"]).await?;

        Ok(ContentSnapshot {
            commit,
            location: dest_str,
        })
    }

    async fn head(&self, repository: &str, git_ref: &str) -> Result<String, CollaboratorError> {
        if is_commit_id(git_ref) {
            return Ok(git_ref.to_string());
        }

        let listing = run_git(&["ls-remote", repository, git_ref]).await?;
        parse_ls_remote(&listing).ok_or_else(|| {
            CollaboratorError::Rejected(format!("ref {} not found in {}", git_ref, repository))
        })
    }
}

async fn run_git(args: &[&str]) -> Result<String, CollaboratorError> {
    let output = Command::new("git")
        .args(args)
        .kill_on_drop(true)
        .output()
        .await?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(CollaboratorError::Command(format!(
            "git {}: {}",
            args.first().copied().unwrap_or_default(),
            stderr.trim()
        )));
    }

    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

/// First commit id of `git ls-remote` output
fn parse_ls_remote(listing: &str) -> Option<String> {
    listing
        .lines()
        .filter_map(|line| line.split_whitespace().next())
        .find(|id| is_commit_id(id))
        .map(str::to_string)
}

fn is_commit_id(value: &str) -> bool {
    value.len() == 40 && value.chars().all(|c| c.is_ascii_hexdigit())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_ls_remote_takes_first_commit() {
        let listing = "\
3f786850e387550fdab836ed7e6dc881de23001b\trefs/heads/main
89e6c98d92887913cadf06b2adb97f26cde4849b\trefs/remotes/origin/main";

        assert_eq!(
            parse_ls_remote(listing).as_deref(),
            Some("3f786850e387550fdab836ed7e6dc881de23001b")
        );
    }

    #[test]
    fn test_parse_ls_remote_empty_listing() {
        assert_eq!(parse_ls_remote(""), None);
    }

    #[test]
    fn test_is_commit_id() {
        assert!(is_commit_id("3f786850e387550fdab836ed7e6dc881de23001b"));
        assert!(!is_commit_id("main"));
        assert!(!is_commit_id("3f786850"));
    }
}
