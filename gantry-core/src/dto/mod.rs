//! Data Transfer Objects for the orchestrator API
//!
//! This module contains DTOs exchanged between the orchestrator and its
//! clients (CLI, automation). DTOs are lightweight request and summary shapes
//! built around the domain entities.

pub mod approval;
pub mod execution;
pub mod pipeline;
