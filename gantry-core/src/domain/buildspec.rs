//! Declarative build specification
//!
//! A build spec is an ordered list of named phases, each an ordered list of
//! shell commands, plus the output paths to collect once every command has
//! succeeded. It is resolved once when a pipeline is defined and stored inline
//! in the definition; executions never re-read the source file.
//!
//! Two YAML layouts are accepted:
//!
//! ```yaml
//! # ordered list
//! phases:
//!   - name: test
//!     commands: ["cargo test"]
//! ```
//!
//! ```yaml
//! # canonical map, always run as install, pre_build, build, post_build
//! phases:
//!   install:
//!     commands: ["npm ci"]
//!   build:
//!     commands: ["npm run build"]
//! artifacts:
//!   files: ["**/*"]
//!   base-directory: dist
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Image used when a build spec does not name one
pub const DEFAULT_BUILD_IMAGE: &str = "docker.io/library/ubuntu:22.04";

/// Normalized build specification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildSpec {
    /// Container image the commands run in
    #[serde(default = "default_image")]
    pub image: String,
    pub phases: Vec<Phase>,
    #[serde(default)]
    pub artifacts: ArtifactPaths,
}

/// A named group of commands
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Phase {
    pub name: String,
    #[serde(default)]
    pub commands: Vec<String>,
}

/// Output paths collected into the build artifact
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactPaths {
    /// Glob patterns relative to the base directory
    #[serde(default)]
    pub files: Vec<String>,
    /// Directory (relative to the workspace) the patterns are evaluated in
    #[serde(default, rename = "base-directory", alias = "base_directory")]
    pub base_directory: Option<String>,
}

/// Errors raised while loading a build spec
#[derive(Debug, Error)]
pub enum BuildSpecError {
    #[error("invalid build spec YAML: {0}")]
    Parse(#[from] serde_yml::Error),

    #[error("build spec declares no commands")]
    NoCommands,

    #[error("phase '{0}' contains an empty command")]
    EmptyCommand(String),

    #[error("phase name cannot be empty")]
    EmptyPhaseName,
}

fn default_image() -> String {
    DEFAULT_BUILD_IMAGE.to_string()
}

impl BuildSpec {
    /// Parses and validates a YAML build spec
    pub fn from_yaml(source: &str) -> Result<Self, BuildSpecError> {
        let document: BuildSpecDocument = serde_yml::from_str(source)?;

        let phases = match document.phases {
            PhasesDocument::Ordered(phases) => phases,
            PhasesDocument::Canonical(canonical) => canonical.into_ordered(),
        };

        let spec = BuildSpec {
            image: document.image.unwrap_or_else(default_image),
            phases,
            artifacts: document.artifacts.unwrap_or_default(),
        };
        spec.validate()?;

        Ok(spec)
    }

    /// Checks the structural invariants of the spec
    pub fn validate(&self) -> Result<(), BuildSpecError> {
        for phase in &self.phases {
            if phase.name.trim().is_empty() {
                return Err(BuildSpecError::EmptyPhaseName);
            }
            if phase.commands.iter().any(|c| c.trim().is_empty()) {
                return Err(BuildSpecError::EmptyCommand(phase.name.clone()));
            }
        }

        if self.command_count() == 0 {
            return Err(BuildSpecError::NoCommands);
        }

        Ok(())
    }

    /// All commands in execution order
    pub fn commands(&self) -> Vec<String> {
        self.phases
            .iter()
            .flat_map(|phase| phase.commands.iter().cloned())
            .collect()
    }

    pub fn command_count(&self) -> usize {
        self.phases.iter().map(|p| p.commands.len()).sum()
    }

    /// Name of the phase owning the command at `index` in [`BuildSpec::commands`]
    pub fn phase_of_command(&self, index: usize) -> Option<&str> {
        let mut remaining = index;
        for phase in &self.phases {
            if remaining < phase.commands.len() {
                return Some(&phase.name);
            }
            remaining -= phase.commands.len();
        }
        None
    }
}

// =============================================================================
// YAML document layouts
// =============================================================================

#[derive(Debug, Deserialize)]
struct BuildSpecDocument {
    #[serde(default)]
    image: Option<String>,
    phases: PhasesDocument,
    #[serde(default)]
    artifacts: Option<ArtifactPaths>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum PhasesDocument {
    Ordered(Vec<Phase>),
    Canonical(CanonicalPhases),
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct CanonicalPhases {
    #[serde(default)]
    install: Option<PhaseBody>,
    #[serde(default)]
    pre_build: Option<PhaseBody>,
    #[serde(default)]
    build: Option<PhaseBody>,
    #[serde(default)]
    post_build: Option<PhaseBody>,
}

#[derive(Debug, Deserialize)]
struct PhaseBody {
    #[serde(default)]
    commands: Vec<String>,
}

impl CanonicalPhases {
    fn into_ordered(self) -> Vec<Phase> {
        [
            ("install", self.install),
            ("pre_build", self.pre_build),
            ("build", self.build),
            ("post_build", self.post_build),
        ]
        .into_iter()
        .filter_map(|(name, body)| {
            body.map(|b| Phase {
                name: name.to_string(),
                commands: b.commands,
            })
        })
        .collect()
    }
}
