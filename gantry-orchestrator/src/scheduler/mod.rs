//! Scheduler layer for the orchestrator
//!
//! Background loops that start executions on their own. Currently the only
//! one watches source repositories for new commits.

pub mod source_watcher;

pub use source_watcher::SourceWatcher;
