//! Approval command handlers
//!
//! Lists pending approval requests and submits decisions on them.

use anyhow::{Result, bail};
use clap::Subcommand;
use colored::*;
use gantry_client::OrchestratorClient;
use gantry_core::domain::approval::{ApprovalRequest, Decision, Verdict};

use crate::config::Config;
use crate::id_resolver::resolve_approval_id;
use crate::types::IdOrPrefix;

/// Approval subcommands
#[derive(Subcommand)]
pub enum ApprovalCommands {
    /// List requests waiting for a decision
    Pending,
    /// Show an approval request
    Get {
        /// Approval ID or unambiguous prefix of a pending request
        id: String,
    },
    /// Approve a pending request
    Approve {
        /// Approval ID or unambiguous prefix of a pending request
        id: String,

        /// Who is deciding
        #[arg(long = "as", env = "GANTRY_DECIDER")]
        decider: String,
    },
    /// Reject a pending request
    Reject {
        /// Approval ID or unambiguous prefix of a pending request
        id: String,

        /// Who is deciding
        #[arg(long = "as", env = "GANTRY_DECIDER")]
        decider: String,
    },
}

/// Handle approval commands
pub async fn handle_approval_command(command: ApprovalCommands, config: &Config) -> Result<()> {
    let client = config.client();

    match command {
        ApprovalCommands::Pending => list_pending(&client).await,
        ApprovalCommands::Get { id } => get_approval(&client, &id).await,
        ApprovalCommands::Approve { id, decider } => {
            decide(&client, &id, Verdict::Approve, &decider).await
        }
        ApprovalCommands::Reject { id, decider } => {
            decide(&client, &id, Verdict::Reject, &decider).await
        }
    }
}

async fn list_pending(client: &OrchestratorClient) -> Result<()> {
    let pending = client.list_pending_approvals().await?;

    if pending.is_empty() {
        println!("{}", "No approvals pending.".yellow());
    } else {
        println!(
            "{}",
            format!("{} approval(s) pending:", pending.len()).bold()
        );
        println!();
        for request in pending {
            print_approval(&request);
            println!();
        }
    }

    Ok(())
}

async fn get_approval(client: &OrchestratorClient, id: &str) -> Result<()> {
    let uuid = resolve_approval_id(client, &IdOrPrefix::parse(id)?).await?;

    let request = client.get_approval(uuid).await?;
    print_approval(&request);

    Ok(())
}

async fn decide(
    client: &OrchestratorClient,
    id: &str,
    verdict: Verdict,
    decider: &str,
) -> Result<()> {
    if decider.trim().is_empty() {
        bail!("A decider is required (--as or GANTRY_DECIDER)");
    }

    let uuid = resolve_approval_id(client, &IdOrPrefix::parse(id)?).await?;

    let request = match client.decide(uuid, verdict, decider).await {
        Ok(request) => request,
        Err(err) if err.is_conflict() => {
            bail!("Approval {} is no longer pending; nothing was changed", uuid)
        }
        Err(err) => return Err(err.into()),
    };

    let verb = match verdict {
        Verdict::Approve => "approved".green(),
        Verdict::Reject => "rejected".red(),
    };
    println!(
        "{} Stage {} {} by {}",
        "✓".green().bold(),
        request.stage_name.bold(),
        verb,
        decider.cyan()
    );

    Ok(())
}

fn print_approval(request: &ApprovalRequest) {
    println!(
        "  {} {} {}",
        "▸".cyan(),
        request.stage_name.bold(),
        colorize_decision(request.decision)
    );
    println!("    ID:        {}", request.id.to_string().dimmed());
    println!(
        "    Execution: {}",
        request.execution_id.to_string().dimmed()
    );
    if let Some(artifact) = request.artifact_id {
        println!("    Artifact:  {}", artifact.to_string().dimmed());
    }
    println!(
        "    Notified:  {}",
        request.notified_at.format("%Y-%m-%d %H:%M:%S")
    );
    if let (Some(by), Some(at)) = (&request.decided_by, request.decided_at) {
        println!(
            "    Decided:   {} by {}",
            at.format("%Y-%m-%d %H:%M:%S"),
            by.cyan()
        );
    }
}

fn colorize_decision(decision: Decision) -> ColoredString {
    let label = decision.to_string();
    match decision {
        Decision::Pending => label.yellow(),
        Decision::Approved => label.green(),
        Decision::Rejected => label.red(),
        Decision::TimedOut => label.red(),
        Decision::Superseded => label.dimmed(),
    }
}
