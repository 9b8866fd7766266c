//! # Roletrust
//!
//! Role trust and delegation registry for decentralized software-update
//! security frameworks.
//!
//! The registry records, for every signing role in a hierarchy, which keys
//! may sign its metadata, how many valid signatures are required, and which
//! target-namespace authority each delegate holds. It tracks pending changes
//! across incremental multi-party signing sessions and accounts for how many
//! signatures each role still needs. Cryptographic signing and verification,
//! metadata serialization, networking and persistence all live outside this
//! crate; the registry only manipulates key identifiers, counts and
//! namespace restrictions.
//!
//! ## Quick Start
//!
//! ```
//! use roletrust::{KeyId, RegistryOptions, RoleRecord, RoleRegistry};
//! use std::collections::BTreeSet;
//!
//! fn keys(ids: &[&str]) -> BTreeSet<KeyId> {
//!     ids.iter().map(|id| KeyId::new(*id)).collect()
//! }
//!
//! let registry = RoleRegistry::with_options(RegistryOptions { track_changes: true });
//!
//! // Parents must exist before their delegates.
//! registry.add("targets", RoleRecord::targets(keys(&["a1", "b2"]), 2))?;
//! registry.add("targets/project", RoleRecord::targets(keys(&["c3"]), 1))?;
//!
//! // Edits accumulate in the change tracker until the next write.
//! let mut record = registry.get("targets/project")?;
//! record
//!     .detail
//!     .as_targets_mut()
//!     .unwrap()
//!     .paths
//!     .insert("project/app.tar.gz".to_string());
//! registry.update("targets/project", record)?;
//!
//! assert!(registry
//!     .changed_rolenames()
//!     .contains(&"targets/project".to_string()));
//!
//! // After re-signing and writing, the session confirms what is complete.
//! registry.commit(&["targets", "targets/project"]);
//! assert!(registry.changed_rolenames().is_empty());
//! # Ok::<(), roletrust::RegistryError>(())
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod changes;
pub mod error;
pub mod name;
pub mod record;
pub mod signing;
pub mod store;

pub use changes::{ChangeTracker, RoleChanges};
pub use error::{RegistryError, Result};
pub use name::{ancestor_chain, is_hierarchical, parent_of, validate_rolename, SEPARATOR};
pub use record::{
    Delegation, KeyId, RoleDetail, RoleKeys, RoleKind, RoleRecord, RootMetadata, SignatureEntry,
    TargetsDetail,
};
pub use signing::{path_covered, RestrictionStep, SigningState};
pub use store::{RegistryOptions, RoleRegistry};
