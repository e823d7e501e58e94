//! Service Module
//!
//! Business logic layer for the orchestrator.
//! The orchestrator drives executions; the pipeline service manages the
//! definition registry.

pub mod orchestrator;
pub mod pipeline;

pub use orchestrator::{Orchestrator, OrchestratorError};
pub use pipeline as pipeline_service;
