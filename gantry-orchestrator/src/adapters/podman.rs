//! Podman execution environment
//!
//! Each isolated run gets:
//! - a fresh workspace directory seeded with the input artifact
//! - one detached container with the workspace mounted at /workspace
//! - one `podman exec` per command, stopping at the first non-zero exit
//! - a log file holding every command's output
//!
//! The container is force-removed when the run ends, including when the
//! driving task is dropped mid-run.

use anyhow::{Context, Result};
use async_trait::async_trait;
use gantry_core::domain::buildspec::ArtifactPaths;
use std::path::{Path, PathBuf};
use std::process::Command;
use tokio::io::AsyncWriteExt;
use tracing::{debug, error, info, warn};

use crate::ports::{CollaboratorError, ExecutionEnvironment, IsolatedOutcome, IsolatedRun};

/// Checks if podman is installed and available
pub fn check_podman_available() -> Result<()> {
    let output = Command::new("podman")
        .arg("--version")
        .output()
        .context("Failed to execute 'podman --version'. Is podman installed?")?;

    if !output.status.success() {
        anyhow::bail!("Podman is not working correctly");
    }

    let version = String::from_utf8_lossy(&output.stdout);
    info!("Podman is available: {}", version.trim());

    Ok(())
}

pub struct PodmanEnvironment {
    /// Prefix for container names
    project: String,
    artifact_root: PathBuf,
    log_root: PathBuf,
}

impl PodmanEnvironment {
    pub fn new(project: String, artifact_root: PathBuf, log_root: PathBuf) -> Self {
        Self {
            project,
            artifact_root,
            log_root,
        }
    }

    fn workspace_dir(&self, label: &str) -> PathBuf {
        self.artifact_root.join("workspaces").join(label)
    }

    fn output_dir(&self, label: &str) -> PathBuf {
        self.artifact_root.join("artifacts").join(label)
    }
}

#[async_trait]
impl ExecutionEnvironment for PodmanEnvironment {
    async fn run_isolated(&self, run: IsolatedRun) -> Result<IsolatedOutcome, CollaboratorError> {
        let workspace = self.workspace_dir(&run.label);
        let log_path = self.log_root.join(format!("{}.log", run.label));

        tokio::fs::create_dir_all(&workspace).await?;
        tokio::fs::create_dir_all(&self.log_root).await?;

        if let Some(input) = &run.input_location {
            let from = PathBuf::from(input);
            let to = workspace.clone();
            blocking(move || copy_dir_all(&from, &to)).await?;
        }

        let mut log = tokio::fs::File::create(&log_path).await?;
        let container = RunningContainer::start(
            format!("{}-{}", self.project, run.label),
            &run.image,
            &workspace,
        )
        .await?;

        let mut exit_code = 0;
        let mut commands_run = 0;

        for command in &run.commands {
            commands_run += 1;
            debug!("[{}] $ {}", container.name, command);

            let output = tokio::process::Command::new("podman")
                .arg("exec")
                .arg("-w")
                .arg("/workspace")
                .arg(&container.name)
                .arg("/bin/sh")
                .arg("-c")
                .arg(command)
                .kill_on_drop(true)
                .output()
                .await?;

            exit_code = output.status.code().unwrap_or(1);

            log.write_all(format!("$ {}\n", command).as_bytes()).await?;
            log.write_all(&output.stdout).await?;
            log.write_all(&output.stderr).await?;
            log.write_all(format!("[exit code {}]\n", exit_code).as_bytes())
                .await?;

            if exit_code != 0 {
                warn!(
                    "[{}] command {} exited with {}",
                    container.name, commands_run, exit_code
                );
                break;
            }
        }
        log.flush().await?;
        drop(container);

        let output_location = if exit_code == 0 {
            let source = workspace.clone();
            let dest = self.output_dir(&run.label);
            let outputs = run.outputs.clone();
            let collected = blocking(move || collect_outputs(&source, &outputs, &dest)).await?;
            Some(collected.to_string_lossy().into_owned())
        } else {
            None
        };

        Ok(IsolatedOutcome {
            exit_code,
            log_ref: log_path.to_string_lossy().into_owned(),
            commands_run,
            output_location,
        })
    }
}

/// Detached container that is force-removed on drop
struct RunningContainer {
    name: String,
}

impl RunningContainer {
    async fn start(name: String, image: &str, workspace: &Path) -> Result<Self, CollaboratorError> {
        info!("Creating container {} for image {}", name, image);

        // Entrypoint is overridden so images with custom entrypoints still idle
        let output = tokio::process::Command::new("podman")
            .arg("run")
            .arg("-d")
            .arg("--name")
            .arg(&name)
            .arg("--entrypoint")
            .arg("/bin/sh")
            .arg("-v")
            .arg(format!("{}:/workspace", workspace.display()))
            .arg("-w")
            .arg("/workspace")
            .arg(image)
            .arg("-c")
            .arg("sleep infinity")
            .output()
            .await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            error!("Failed to start container {}: {}", name, stderr.trim());
            // A half-created container may still hold the name
            let _ = tokio::process::Command::new("podman")
                .arg("rm")
                .arg("-f")
                .arg(&name)
                .output()
                .await;
            return Err(CollaboratorError::Command(format!(
                "podman run {}: {}",
                image,
                stderr.trim()
            )));
        }

        Ok(Self { name })
    }
}

impl Drop for RunningContainer {
    fn drop(&mut self) {
        let name = std::mem::take(&mut self.name);
        // Keep the podman call off the async worker threads
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn_blocking(move || remove_container(&name));
            }
            Err(_) => remove_container(&name),
        }
    }
}

fn remove_container(name: &str) {
    match Command::new("podman").arg("rm").arg("-f").arg(name).output() {
        Ok(output) if output.status.success() => {
            debug!("Container {} removed", name);
        }
        Ok(output) => {
            let stderr = String::from_utf8_lossy(&output.stderr);
            warn!("Failed to remove container {}: {}", name, stderr.trim());
        }
        Err(e) => {
            warn!("Failed to remove container {}: {}", name, e);
        }
    }
}

async fn blocking<T, F>(f: F) -> Result<T, CollaboratorError>
where
    F: FnOnce() -> std::io::Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| CollaboratorError::Command(format!("file task failed: {}", e)))?
        .map_err(CollaboratorError::from)
}

/// Recursively copies a directory tree, or a single file into `to`
pub fn copy_dir_all(from: &Path, to: &Path) -> std::io::Result<()> {
    if from.is_file() {
        std::fs::create_dir_all(to)?;
        let name = from
            .file_name()
            .ok_or_else(|| std::io::Error::other("input has no file name"))?;
        std::fs::copy(from, to.join(name))?;
        return Ok(());
    }

    std::fs::create_dir_all(to)?;
    for entry in std::fs::read_dir(from)? {
        let entry = entry?;
        let target = to.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            copy_dir_all(&entry.path(), &target)?;
        } else {
            std::fs::copy(entry.path(), target)?;
        }
    }
    Ok(())
}

/// Copies the files matching `outputs` out of a workspace into `dest`
///
/// Paths are kept relative to the base directory. With no patterns, the whole
/// base directory is collected.
pub fn collect_outputs(
    workspace: &Path,
    outputs: &ArtifactPaths,
    dest: &Path,
) -> std::io::Result<PathBuf> {
    let base = match &outputs.base_directory {
        Some(dir) => workspace.join(dir),
        None => workspace.to_path_buf(),
    };

    std::fs::create_dir_all(dest)?;

    if outputs.files.is_empty() {
        copy_dir_all(&base, dest)?;
        return Ok(dest.to_path_buf());
    }

    for pattern in &outputs.files {
        let full = base.join(pattern);
        let matches = glob::glob(&full.to_string_lossy())
            .map_err(|e| std::io::Error::other(format!("bad pattern '{}': {}", pattern, e)))?;

        for path in matches.flatten() {
            if !path.is_file() {
                continue;
            }
            let relative = path
                .strip_prefix(&base)
                .map_err(|e| std::io::Error::other(e.to_string()))?;
            let target = dest.join(relative);
            if let Some(parent) = target.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::copy(&path, &target)?;
        }
    }

    Ok(dest.to_path_buf())
}
