//! Gantry Core
//!
//! Core types and abstractions for the Gantry release pipeline orchestrator.
//!
//! This crate contains:
//! - Domain types: Core business entities (Pipeline, Execution, Approval, etc.)
//! - DTOs: Data transfer objects for communication with the orchestrator API

pub mod domain;
pub mod dto;
