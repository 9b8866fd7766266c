//! Threshold-signature accounting for signing sessions
//!
//! The accountant answers, for every role, how far along its signing cycle
//! is and how many further signatures the local process can contribute. It
//! counts key identifiers only; producing and verifying the actual
//! signatures is the cryptographic layer's job.
//!
//! The rules are deliberately simple:
//! - a role with any pending change loses all prior signatures, so every
//!   locally available signing key must re-sign it;
//! - an unchanged role under threshold only needs the local signers not yet
//!   represented among its valid signatures;
//! - an unchanged role at or above threshold needs nothing.

use crate::error::{RegistryError, Result};
use crate::name;
use crate::record::{KeyId, RoleRecord};
use crate::store::RoleRegistry;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Where a role stands in its signing cycle
///
/// Content changes and authorized-key edits revert a role to `Unsigned`;
/// signatures accumulate through `PartiallySigned` until the threshold is
/// met.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SigningState {
    /// No valid signature counts toward the threshold
    Unsigned,
    /// Some valid signatures collected, threshold not yet met
    PartiallySigned,
    /// Threshold met by valid signatures
    FullySigned,
}

/// One ancestor's namespace restriction along a delegation chain
///
/// An authority-chain checker intersects these from the outermost ancestor
/// inward; empty `paths` and `path_hash_prefixes` mean the step imposes no
/// restriction of its own.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestrictionStep {
    /// Role imposing the restriction
    pub rolename: String,
    /// Target paths the role claims authority over
    pub paths: BTreeSet<String>,
    /// Hash prefixes bounding the role's namespace
    pub path_hash_prefixes: BTreeSet<String>,
}

/// Whether a target path falls inside a path restriction set
///
/// An empty set imposes no restriction. Otherwise the target must equal an
/// entry exactly or sit beneath an entry treated as a directory prefix.
/// Hash-prefix restrictions are not evaluated here; hashing targets is the
/// cryptographic layer's business.
pub fn path_covered(paths: &BTreeSet<String>, target: &str) -> bool {
    if paths.is_empty() {
        return true;
    }

    paths.iter().any(|path| {
        if path == target {
            return true;
        }
        let prefix = path.trim_end_matches(name::SEPARATOR);
        target
            .strip_prefix(prefix)
            .is_some_and(|rest| rest.starts_with(name::SEPARATOR))
    })
}

fn valid_signer_keyids(record: &RoleRecord) -> BTreeSet<&KeyId> {
    record
        .signatures
        .iter()
        .map(|sig| &sig.keyid)
        .filter(|keyid| record.keyids.contains(*keyid))
        .collect()
}

impl RoleRegistry {
    /// Number of collected signatures from currently authorized keys
    ///
    /// Signatures from revoked or rotated keys never count, and several
    /// signatures from the same key count once.
    pub fn valid_signature_count(&self, rolename: &str) -> Result<usize> {
        name::validate_rolename(rolename)?;

        let inner = self.inner.read();
        let record = inner
            .roles
            .get(rolename)
            .ok_or_else(|| RegistryError::UnknownRole {
                rolename: rolename.to_string(),
            })?;

        Ok(valid_signer_keyids(record).len())
    }

    /// Whether the role's valid signatures meet its threshold
    pub fn is_fully_signed(&self, rolename: &str) -> Result<bool> {
        name::validate_rolename(rolename)?;

        let inner = self.inner.read();
        let record = inner
            .roles
            .get(rolename)
            .ok_or_else(|| RegistryError::UnknownRole {
                rolename: rolename.to_string(),
            })?;

        Ok(valid_signer_keyids(record).len() >= record.threshold as usize)
    }

    /// The role's position in the signing state machine
    ///
    /// Any pending change voids prior signatures and reverts the role to
    /// [`SigningState::Unsigned`].
    pub fn signing_state(&self, rolename: &str) -> Result<SigningState> {
        name::validate_rolename(rolename)?;

        let inner = self.inner.read();
        let record = inner
            .roles
            .get(rolename)
            .ok_or_else(|| RegistryError::UnknownRole {
                rolename: rolename.to_string(),
            })?;

        let dirty = inner
            .tracker
            .as_ref()
            .is_some_and(|tracker| tracker.is_changed(rolename));
        if dirty {
            return Ok(SigningState::Unsigned);
        }

        let valid = valid_signer_keyids(record).len();
        Ok(if valid >= record.threshold as usize {
            SigningState::FullySigned
        } else if valid > 0 {
            SigningState::PartiallySigned
        } else {
            SigningState::Unsigned
        })
    }

    /// How many further signatures the local process should produce
    ///
    /// A pending change voids every prior signature, so all locally
    /// available signing keys re-sign. An unchanged role under threshold
    /// only needs the local signers not already represented among its valid
    /// signatures. An unchanged role at threshold needs none.
    pub fn needed_signature_count(&self, rolename: &str) -> Result<usize> {
        name::validate_rolename(rolename)?;

        let inner = self.inner.read();
        let record = inner
            .roles
            .get(rolename)
            .ok_or_else(|| RegistryError::UnknownRole {
                rolename: rolename.to_string(),
            })?;

        let dirty = inner
            .tracker
            .as_ref()
            .is_some_and(|tracker| tracker.is_changed(rolename));
        if dirty {
            return Ok(record.signing_keyids.len());
        }

        let valid = valid_signer_keyids(record);
        if valid.len() >= record.threshold as usize {
            return Ok(0);
        }

        Ok(record
            .signing_keyids
            .iter()
            .filter(|keyid| !valid.contains(*keyid))
            .count())
    }

    /// Unchanged roles a signing session must not silently skip
    ///
    /// Two groups, merged and sorted: roles still marked partially written
    /// from an earlier session, and unchanged delegates of changed parents
    /// whose edited delegation (authorized keys or threshold) leaves their
    /// previously collected signatures under threshold. A delegation
    /// revoked in the pending diff contributes nothing; only the parent's
    /// current delegations are consulted.
    ///
    /// # Panics
    ///
    /// Panics if the registry was built without change tracking.
    pub fn incomplete_unchanged_rolenames(&self) -> Vec<String> {
        let inner = self.inner.read();
        let tracker = inner
            .tracker
            .as_ref()
            .expect("incomplete_unchanged_rolenames requires a change-tracking registry");

        let changed: BTreeSet<String> = tracker.changed_rolenames().into_iter().collect();
        let mut incomplete = BTreeSet::new();

        for rolename in tracker.partially_written() {
            if !changed.contains(rolename) && inner.roles.contains_key(rolename) {
                incomplete.insert(rolename.clone());
            }
        }

        for parent in &changed {
            let Some(parent_record) = inner.roles.get(parent) else {
                continue;
            };

            for delegation in parent_record.delegations() {
                if changed.contains(&delegation.name) || incomplete.contains(&delegation.name) {
                    continue;
                }
                let Some(delegate) = inner.roles.get(&delegation.name) else {
                    continue;
                };

                // Count the delegate's signatures against the delegation as
                // edited, not against the delegate's stale own key set.
                let signed: BTreeSet<&KeyId> =
                    delegate.signatures.iter().map(|sig| &sig.keyid).collect();
                let valid = delegation
                    .keyids
                    .iter()
                    .filter(|keyid| signed.contains(keyid))
                    .count();

                if valid < delegation.threshold as usize {
                    incomplete.insert(delegation.name.clone());
                }
            }
        }

        incomplete.into_iter().collect()
    }

    /// Each role along a name's delegation chain with its namespace
    /// restriction, outermost ancestor first and the role itself last
    ///
    /// An authority-chain checker intersects the steps to decide whether a
    /// deep delegate's claimed target is actually within its authority.
    /// Fails with [`RegistryError::UnknownRole`] if any link of the chain is
    /// absent.
    pub fn restriction_chain(&self, rolename: &str) -> Result<Vec<RestrictionStep>> {
        name::validate_rolename(rolename)?;

        let inner = self.inner.read();

        let mut chain: Vec<String> = if name::is_hierarchical(rolename) {
            name::ancestor_chain(rolename)
        } else {
            Vec::new()
        };
        chain.push(rolename.to_string());

        chain
            .into_iter()
            .map(|link| {
                let record =
                    inner
                        .roles
                        .get(&link)
                        .ok_or_else(|| RegistryError::UnknownRole {
                            rolename: link.clone(),
                        })?;
                let (paths, prefixes) = match record.detail.as_targets() {
                    Some(detail) => (detail.paths.clone(), detail.path_hash_prefixes.clone()),
                    None => (BTreeSet::new(), BTreeSet::new()),
                };
                Ok(RestrictionStep {
                    rolename: link,
                    paths,
                    path_hash_prefixes: prefixes,
                })
            })
            .collect()
    }
}
