//! Init command handler
//!
//! Writes a starter pipeline file and build spec that `gantry pipeline
//! create` accepts as-is.

use anyhow::{Context, Result};
use clap::Args;
use colored::*;
use std::fs;
use std::path::Path;

#[derive(Args)]
pub struct InitArgs {
    /// Output directory for generated files
    #[arg(short, long, default_value = ".")]
    output: String,

    /// Pipeline name written into the pipeline file
    #[arg(short, long, default_value = "my-service")]
    name: String,

    /// Overwrite existing files
    #[arg(long)]
    force: bool,
}

const BUILDSPEC_TEMPLATE: &str = r#"image: docker.io/library/ubuntu:22.04

phases:
  install:
    commands:
      - echo "install dependencies"
  build:
    commands:
      - mkdir -p dist
      - echo "build output" > dist/app.txt

artifacts:
  base-directory: dist
  files:
    - "**/*"
"#;

pub fn handle_init(args: InitArgs) -> Result<()> {
    let output = Path::new(&args.output);
    fs::create_dir_all(output)
        .with_context(|| format!("Failed to create directory {:?}", output))?;

    write_template(output, "pipeline.yml", &pipeline_template(&args.name), args.force)?;
    write_template(output, "buildspec.yml", BUILDSPEC_TEMPLATE, args.force)?;

    println!();
    println!("{}", "Next steps:".bold());
    println!("  1. Point the source stage at your repository");
    println!("  2. Adjust the build commands in buildspec.yml");
    println!(
        "  3. Run {}",
        "gantry pipeline create --file pipeline.yml".cyan()
    );

    Ok(())
}

fn pipeline_template(name: &str) -> String {
    format!(
        r#"name: {name}
stages:
  - name: Source
    kind: source
    repository: https://git.example.com/{name}.git
    branch: main
  - name: Build
    kind: build
    buildspec: buildspec.yml
  - name: Approve
    kind: approval
    topic: releases
    timeout_seconds: 86400
    message: Ready to ship {name}?
  - name: Deploy
    kind: deploy
    fleet: {name}
"#
    )
}

/// Writes `content` unless the file exists and `force` is off
fn write_template(dir: &Path, file_name: &str, content: &str, force: bool) -> Result<bool> {
    let path = dir.join(file_name);
    if path.exists() && !force {
        println!("  {} {} (already exists)", "Skipped".yellow(), file_name);
        return Ok(false);
    }

    fs::write(&path, content).with_context(|| format!("Failed to write {:?}", path))?;
    println!("  {} {}", "Created".green(), file_name);
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline_file::PipelineFile;

    #[test]
    fn test_generated_files_load_as_a_pipeline() {
        let dir = tempfile::tempdir().unwrap();
        handle_init(InitArgs {
            output: dir.path().to_string_lossy().into_owned(),
            name: "billing".to_string(),
            force: false,
        })
        .unwrap();

        let file = PipelineFile::load(&dir.path().join("pipeline.yml")).unwrap();
        assert_eq!(file.name.as_deref(), Some("billing"));
        assert_eq!(file.stages.len(), 4);
    }

    #[test]
    fn test_existing_files_are_kept_without_force() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("buildspec.yml"), "custom").unwrap();

        assert!(!write_template(dir.path(), "buildspec.yml", BUILDSPEC_TEMPLATE, false).unwrap());
        assert_eq!(
            fs::read_to_string(dir.path().join("buildspec.yml")).unwrap(),
            "custom"
        );

        assert!(write_template(dir.path(), "buildspec.yml", BUILDSPEC_TEMPLATE, true).unwrap());
        assert_eq!(
            fs::read_to_string(dir.path().join("buildspec.yml")).unwrap(),
            BUILDSPEC_TEMPLATE
        );
    }
}
