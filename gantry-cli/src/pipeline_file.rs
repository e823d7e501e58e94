//! Pipeline files
//!
//! A pipeline file describes the stages of a pipeline in YAML. Build stages
//! point at a build spec file (relative to the pipeline file) or carry the
//! spec inline; either way the spec is resolved here, once, and sent to the
//! orchestrator as part of the definition.
//!
//! ```yaml
//! name: web
//! stages:
//!   - name: Source
//!     kind: source
//!     repository: https://git.example.com/web.git
//!     branch: main
//!   - name: Build
//!     kind: build
//!     buildspec: buildspec.yml
//!   - name: Approve
//!     kind: approval
//!     topic: releases
//!     timeout_seconds: 3600
//!   - name: Deploy
//!     kind: deploy
//!     fleet: web
//! ```

use anyhow::{Context, Result, bail};
use gantry_core::domain::buildspec::BuildSpec;
use gantry_core::domain::pipeline::{
    ApprovalConfig, BuildConfig, DeployConfig, SourceConfig, StageDescriptor, StageKind,
    validate_stages,
};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Pipeline as written on disk
#[derive(Debug, Deserialize)]
struct PipelineDocument {
    #[serde(default)]
    name: Option<String>,
    stages: Vec<StageEntry>,
}

#[derive(Debug, Deserialize)]
struct StageEntry {
    name: String,
    #[serde(flatten)]
    kind: StageEntryKind,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum StageEntryKind {
    Source(SourceConfig),
    Build { buildspec: BuildSpecRef },
    Approval(ApprovalConfig),
    Deploy(DeployConfig),
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum BuildSpecRef {
    File(PathBuf),
    Inline(serde_yml::Value),
}

/// A pipeline file with every build spec resolved
#[derive(Debug)]
pub struct PipelineFile {
    pub name: Option<String>,
    pub stages: Vec<StageDescriptor>,
}

impl PipelineFile {
    /// Reads a pipeline file and the build specs it references
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read pipeline file: {}", path.display()))?;
        let base_dir = path.parent().unwrap_or_else(|| Path::new("."));

        Self::parse(&content, base_dir)
            .with_context(|| format!("Invalid pipeline file: {}", path.display()))
    }

    /// Parses pipeline YAML, resolving build spec paths against `base_dir`
    pub fn parse(content: &str, base_dir: &Path) -> Result<Self> {
        let document: PipelineDocument = serde_yml::from_str(content)?;

        let stages = document
            .stages
            .into_iter()
            .map(|entry| resolve_stage(entry, base_dir))
            .collect::<Result<Vec<_>>>()?;

        validate_stages(&stages)?;

        Ok(Self {
            name: document.name,
            stages,
        })
    }

    /// Pipeline name, preferring an explicit override
    pub fn name_or(&self, name_override: Option<String>) -> Result<String> {
        match name_override.or_else(|| self.name.clone()) {
            Some(name) => Ok(name),
            None => bail!("Pipeline file has no name; pass --name"),
        }
    }
}

fn resolve_stage(entry: StageEntry, base_dir: &Path) -> Result<StageDescriptor> {
    let kind = match entry.kind {
        StageEntryKind::Source(config) => StageKind::Source(config),
        StageEntryKind::Approval(config) => StageKind::Approval(config),
        StageEntryKind::Deploy(config) => StageKind::Deploy(config),
        StageEntryKind::Build { buildspec } => {
            let buildspec = load_buildspec(&buildspec, base_dir)
                .with_context(|| format!("Stage '{}': could not load build spec", entry.name))?;
            StageKind::Build(BuildConfig { buildspec })
        }
    };

    Ok(StageDescriptor {
        name: entry.name,
        kind,
    })
}

fn load_buildspec(reference: &BuildSpecRef, base_dir: &Path) -> Result<BuildSpec> {
    let source = match reference {
        BuildSpecRef::File(path) => {
            let path = base_dir.join(path);
            std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read build spec: {}", path.display()))?
        }
        BuildSpecRef::Inline(value) => serde_yml::to_string(value)?,
    };

    Ok(BuildSpec::from_yaml(&source)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    const BUILDSPEC: &str = r#"
phases:
  install:
    commands: ["npm ci"]
  build:
    commands: ["npm run build"]
artifacts:
  files: ["**/*"]
  base-directory: dist
"#;

    #[test]
    fn test_load_resolves_buildspec_relative_to_pipeline_file() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("ci")).unwrap();
        fs::write(dir.path().join("ci/buildspec.yml"), BUILDSPEC).unwrap();
        fs::write(
            dir.path().join("ci/pipeline.yml"),
            r#"
name: web
stages:
  - name: Source
    kind: source
    repository: https://git.example.com/web.git
  - name: Build
    kind: build
    buildspec: buildspec.yml
  - name: Approve
    kind: approval
    topic: releases
    timeout_seconds: 3600
  - name: Deploy
    kind: deploy
    fleet: web
"#,
        )
        .unwrap();

        let file = PipelineFile::load(&dir.path().join("ci/pipeline.yml")).unwrap();

        assert_eq!(file.name.as_deref(), Some("web"));
        let kinds: Vec<_> = file.stages.iter().map(|s| s.kind.label()).collect();
        assert_eq!(kinds, vec!["source", "build", "approval", "deploy"]);

        match &file.stages[0].kind {
            StageKind::Source(config) => assert_eq!(config.branch, "main"),
            other => panic!("expected source stage, got {:?}", other),
        }
        match &file.stages[1].kind {
            StageKind::Build(config) => {
                assert_eq!(
                    config.buildspec.commands(),
                    vec!["npm ci".to_string(), "npm run build".to_string()]
                );
                assert_eq!(config.buildspec.artifacts.base_directory.as_deref(), Some("dist"));
            }
            other => panic!("expected build stage, got {:?}", other),
        }
    }

    #[test]
    fn test_inline_buildspec() {
        let file = PipelineFile::parse(
            r#"
stages:
  - name: Build
    kind: build
    buildspec:
      phases:
        - name: test
          commands: ["cargo test"]
"#,
            Path::new("."),
        )
        .unwrap();

        assert!(file.name.is_none());
        assert!(file.name_or(None).is_err());
        assert_eq!(file.name_or(Some("svc".to_string())).unwrap(), "svc");
        match &file.stages[0].kind {
            StageKind::Build(config) => {
                assert_eq!(config.buildspec.phase_of_command(0), Some("test"))
            }
            other => panic!("expected build stage, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_buildspec_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let err = PipelineFile::parse(
            r#"
stages:
  - name: Build
    kind: build
    buildspec: nowhere.yml
"#,
            dir.path(),
        )
        .unwrap_err();

        assert!(format!("{:#}", err).contains("nowhere.yml"));
    }

    #[test]
    fn test_duplicate_stage_names_are_rejected_locally() {
        let result = PipelineFile::parse(
            r#"
stages:
  - name: Ship
    kind: deploy
    fleet: web
  - name: Ship
    kind: deploy
    fleet: canary
"#,
            Path::new("."),
        );

        assert!(result.is_err());
    }
}
