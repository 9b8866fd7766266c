//! Error types for the role trust registry

use thiserror::Error;

/// Errors produced by registry operations
///
/// Every failure surfaces to the immediate caller; nothing is retried
/// internally. Mutating operations validate fully before touching the
/// store, so a returned error always means the registry is unchanged.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// A role record failed structural shape checks
    #[error("Malformed role record for '{rolename}': {reason}")]
    MalformedInput {
        /// Name the record was submitted under
        rolename: String,
        /// What was wrong with the record
        reason: String,
    },

    /// A role name violates the name syntax contract
    #[error("Invalid role name '{rolename}': {reason}")]
    InvalidName {
        /// The offending name
        rolename: String,
        /// Which syntax rule was violated
        reason: String,
    },

    /// The named role is not present in the registry
    #[error("Unknown role: {rolename}")]
    UnknownRole {
        /// The name that was looked up
        rolename: String,
    },

    /// An insertion collided with an existing role
    #[error("Role already exists: {rolename}")]
    RoleAlreadyExists {
        /// The duplicated name
        rolename: String,
    },

    /// A delegation hierarchy invariant was violated
    ///
    /// Raised when a role is added before its parent, or when a bulk load
    /// discovers holes in the parent closure of the incoming name set.
    #[error("Delegation integrity violated, missing parent role(s): {missing:?}")]
    DelegationIntegrity {
        /// Parent names that were required but absent
        missing: Vec<String>,
    },
}

/// Result type alias
pub type Result<T> = std::result::Result<T, RegistryError>;
