//! Resource references typed on the command line

use anyhow::{Result, bail};
use std::fmt;
use uuid::Uuid;

/// A pipeline, execution or approval named by its full ID or a leading part of it
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdOrPrefix {
    Full(Uuid),
    /// Lowercased hex digits and dashes
    Prefix(String),
}

impl IdOrPrefix {
    /// Reads a full UUID, or else something that can start one
    pub fn parse(input: &str) -> Result<Self> {
        let input = input.trim();
        if let Ok(uuid) = Uuid::parse_str(input) {
            return Ok(IdOrPrefix::Full(uuid));
        }

        if input.is_empty() {
            bail!("An ID or ID prefix is required");
        }
        if !input.chars().all(|c| c.is_ascii_hexdigit() || c == '-') {
            bail!("'{}' is neither an ID nor the start of one", input);
        }
        Ok(IdOrPrefix::Prefix(input.to_ascii_lowercase()))
    }

    pub fn as_uuid(&self) -> Option<Uuid> {
        match self {
            IdOrPrefix::Full(uuid) => Some(*uuid),
            IdOrPrefix::Prefix(_) => None,
        }
    }

    /// Whether `id` is the one referred to
    pub fn matches(&self, id: &Uuid) -> bool {
        match self {
            IdOrPrefix::Full(uuid) => uuid == id,
            IdOrPrefix::Prefix(prefix) => id.to_string().starts_with(prefix.as_str()),
        }
    }
}

impl fmt::Display for IdOrPrefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IdOrPrefix::Full(uuid) => write!(f, "{}", uuid),
            IdOrPrefix::Prefix(prefix) => write!(f, "{}", prefix),
        }
    }
}
