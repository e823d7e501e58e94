//! Core domain types
//!
//! This module contains the core domain structures used across Gantry crates.
//! These types represent the fundamental business entities and are shared between
//! the orchestrator (persists and drives them) and its clients (read and submit them).

pub mod approval;
pub mod artifact;
pub mod buildspec;
pub mod execution;
pub mod failure;
pub mod fleet;
pub mod pipeline;
