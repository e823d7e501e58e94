//! Prefix lookup
//!
//! Turns a short ID typed on the command line into the full ID of a
//! pipeline, execution or pending approval known to the orchestrator.

use anyhow::{Context, Result, anyhow};
use gantry_client::OrchestratorClient;
use uuid::Uuid;

use crate::types::IdOrPrefix;

/// Resolve a pipeline ID or prefix to a full UUID
///
/// If the input is already a full UUID, returns it immediately.
/// Otherwise, fetches all pipelines and finds the one matching the prefix.
pub async fn resolve_pipeline_id(
    client: &OrchestratorClient,
    id_or_prefix: &IdOrPrefix,
) -> Result<Uuid> {
    if let Some(uuid) = id_or_prefix.as_uuid() {
        return Ok(uuid);
    }

    let pipelines = client
        .list_pipelines()
        .await
        .context("Failed to fetch pipelines for ID resolution")?;

    match_prefix("pipeline", id_or_prefix, pipelines.iter().map(|p| p.id))
}

/// Resolve an execution ID or prefix to a full UUID
///
/// Executions are listed per pipeline, so a prefix is matched against the
/// executions of every pipeline.
pub async fn resolve_execution_id(
    client: &OrchestratorClient,
    id_or_prefix: &IdOrPrefix,
) -> Result<Uuid> {
    if let Some(uuid) = id_or_prefix.as_uuid() {
        return Ok(uuid);
    }

    let pipelines = client
        .list_pipelines()
        .await
        .context("Failed to fetch pipelines for ID resolution")?;

    let mut ids = Vec::new();
    for pipeline in pipelines {
        let executions = client
            .list_executions(pipeline.id)
            .await
            .context("Failed to fetch executions for ID resolution")?;
        ids.extend(executions.into_iter().map(|e| e.id));
    }

    match_prefix("execution", id_or_prefix, ids.into_iter())
}

/// Resolve an approval ID or prefix to a full UUID
///
/// Only pending requests are searched; decided ones need the full ID.
pub async fn resolve_approval_id(
    client: &OrchestratorClient,
    id_or_prefix: &IdOrPrefix,
) -> Result<Uuid> {
    if let Some(uuid) = id_or_prefix.as_uuid() {
        return Ok(uuid);
    }

    let pending = client
        .list_pending_approvals()
        .await
        .context("Failed to fetch approvals for ID resolution")?;

    match_prefix(
        "pending approval",
        id_or_prefix,
        pending.iter().map(|a| a.id),
    )
}

/// Finds the single ID `reference` points at
fn match_prefix(
    kind: &str,
    reference: &IdOrPrefix,
    ids: impl Iterator<Item = Uuid>,
) -> Result<Uuid> {
    let matches: Vec<Uuid> = ids.filter(|id| reference.matches(id)).collect();

    match matches.len() {
        0 => Err(anyhow!("No {} found with ID starting with '{}'", kind, reference)),
        1 => Ok(matches[0]),
        _ => {
            let ids: Vec<String> = matches.iter().map(|id| id.to_string()).collect();
            Err(anyhow!(
                "Ambiguous prefix '{}' matches multiple {}s: {}",
                reference,
                kind,
                ids.join(", ")
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids() -> Vec<Uuid> {
        vec![
            Uuid::parse_str("1f0c2a4e-0000-4000-8000-000000000001").unwrap(),
            Uuid::parse_str("1f0c9b7d-0000-4000-8000-000000000002").unwrap(),
            Uuid::parse_str("a9e3d100-0000-4000-8000-000000000003").unwrap(),
        ]
    }

    fn prefix(input: &str) -> IdOrPrefix {
        IdOrPrefix::parse(input).unwrap()
    }

    #[test]
    fn test_unique_prefix_resolves() {
        let id = match_prefix("pipeline", &prefix("A9E"), ids().into_iter()).unwrap();
        assert_eq!(id, ids()[2]);
    }

    #[test]
    fn test_ambiguous_prefix_lists_candidates() {
        let err = match_prefix("pipeline", &prefix("1f0c"), ids().into_iter()).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("Ambiguous"));
        assert!(message.contains(&ids()[0].to_string()));
        assert!(message.contains(&ids()[1].to_string()));
    }

    #[test]
    fn test_unknown_prefix() {
        let err = match_prefix("execution", &prefix("ffff"), ids().into_iter()).unwrap_err();
        assert!(err.to_string().contains("No execution found"));
    }
}
