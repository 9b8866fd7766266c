//! Role name syntax and hierarchy resolution
//!
//! Role names are hierarchical identifiers with segments joined by a single
//! `/` separator. A name like `targets/project/app` denotes a role delegated
//! by `targets/project`, which in turn is delegated by `targets`. Names
//! without a separator (`root`, `timestamp`, `snapshot`, `targets`) sit at
//! the top of the hierarchy.
//!
//! Validation runs on every insertion and on every caller-supplied lookup
//! name, so malformed names never reach the store.

use crate::error::{RegistryError, Result};

/// Separator character joining role name segments
pub const SEPARATOR: char = '/';

/// Validate a role name against the name syntax contract
///
/// Fails with [`RegistryError::InvalidName`] if the name is empty, carries
/// leading or trailing whitespace, or starts or ends with the separator.
/// Names are case-sensitive; no normalization is performed.
pub fn validate_rolename(rolename: &str) -> Result<()> {
    if rolename.is_empty() {
        return Err(RegistryError::InvalidName {
            rolename: rolename.to_string(),
            reason: "must not be empty".to_string(),
        });
    }

    if rolename != rolename.trim() {
        return Err(RegistryError::InvalidName {
            rolename: rolename.to_string(),
            reason: "must not start or end with whitespace".to_string(),
        });
    }

    if rolename.starts_with(SEPARATOR) || rolename.ends_with(SEPARATOR) {
        return Err(RegistryError::InvalidName {
            rolename: rolename.to_string(),
            reason: format!("must not start or end with '{}'", SEPARATOR),
        });
    }

    Ok(())
}

/// Return the parent name of a role
///
/// Strips the last separator-delimited segment: `a/b/c/d` yields `a/b/c`.
/// A non-hierarchical name yields the empty string.
pub fn parent_of(rolename: &str) -> &str {
    match rolename.rfind(SEPARATOR) {
        Some(idx) => &rolename[..idx],
        None => "",
    }
}

/// Return every proper ancestor of a role, outermost first
///
/// `a/b/c/d` yields `["a", "a/b", "a/b/c"]`. A non-hierarchical name has no
/// proper ancestors and yields itself: `a` gives `["a"]`.
pub fn ancestor_chain(rolename: &str) -> Vec<String> {
    if !rolename.contains(SEPARATOR) {
        return vec![rolename.to_string()];
    }

    rolename
        .char_indices()
        .filter(|&(_, ch)| ch == SEPARATOR)
        .map(|(idx, _)| rolename[..idx].to_string())
        .collect()
}

/// Check whether a name is hierarchical (carries at least one separator)
pub fn is_hierarchical(rolename: &str) -> bool {
    rolename.contains(SEPARATOR)
}
