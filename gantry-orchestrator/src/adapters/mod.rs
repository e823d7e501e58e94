//! Production collaborator adapters

pub mod fleet;
pub mod git;
pub mod notify;
pub mod podman;

pub use fleet::HttpFleetManager;
pub use git::GitSourceControl;
pub use notify::{LogNotifier, RecipientDirectory, WebhookNotifier};
pub use podman::{PodmanEnvironment, check_podman_available};
