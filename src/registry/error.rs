//! Registry error types

use super::entry::LocalId;

/// Error type for registry operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// A live subscription already uses this local id
    DuplicateId(LocalId),
}

impl std::fmt::Display for RegistryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RegistryError::DuplicateId(id) => {
                write!(f, "Subscription id already registered: {}", id)
            }
        }
    }
}

impl std::error::Error for RegistryError {}
