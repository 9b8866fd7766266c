//! Pending-change tracking across a signing session
//!
//! Metadata editing sessions mutate roles in memory, re-sign some of them,
//! write, and resume later. The tracker accumulates the diff between the
//! last successful write and the current in-memory state of every role, so
//! a signing step knows exactly which roles changed and which unchanged
//! roles are still short of their threshold.
//!
//! Diffs merge idempotently and order-independently: re-adding an item that
//! is already recorded never duplicates it, and recording an addition
//! followed by the matching removal cancels both out. A per-role entry that
//! merges down to the empty diff is dropped entirely.
//!
//! The tracker never judges cryptographic validity. Whether a written role
//! is actually fully signed is asserted by the caller at [`ChangeTracker::commit`]
//! time; the tracker only bookkeeps the claim.

use crate::record::{Delegation, KeyId, RoleRecord};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Accumulated uncommitted changes for one role
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleChanges {
    /// The role was newly added since the last write
    pub created: bool,
    /// The role was explicitly marked dirty without a content change
    pub touched: bool,
    /// Target paths added to the role
    pub targets_added: BTreeSet<String>,
    /// Target paths removed from the role
    pub targets_removed: BTreeSet<String>,
    /// Names of delegations created since the last write
    pub delegations_made: BTreeSet<String>,
    /// Names of delegations revoked since the last write
    pub delegations_revoked: BTreeSet<String>,
    /// Per-delegation authorized keys added
    pub delegation_keys_added: BTreeMap<String, BTreeSet<KeyId>>,
    /// Per-delegation authorized keys revoked
    pub delegation_keys_revoked: BTreeMap<String, BTreeSet<KeyId>>,
    /// Per-delegation net threshold change
    pub delegation_threshold_deltas: BTreeMap<String, i64>,
    /// Per-delegation namespace paths added
    pub delegation_paths_added: BTreeMap<String, BTreeSet<String>>,
    /// Per-delegation namespace paths removed
    pub delegation_paths_removed: BTreeMap<String, BTreeSet<String>>,
    /// Per-delegation path hash prefixes added
    pub delegation_prefixes_added: BTreeMap<String, BTreeSet<String>>,
    /// Per-delegation path hash prefixes removed
    pub delegation_prefixes_removed: BTreeMap<String, BTreeSet<String>>,
}

impl RoleChanges {
    /// Whether the diff records no pending change at all
    pub fn is_empty(&self) -> bool {
        !self.created
            && !self.touched
            && self.targets_added.is_empty()
            && self.targets_removed.is_empty()
            && self.delegations_made.is_empty()
            && self.delegations_revoked.is_empty()
            && self.delegation_keys_added.is_empty()
            && self.delegation_keys_revoked.is_empty()
            && self.delegation_threshold_deltas.is_empty()
            && self.delegation_paths_added.is_empty()
            && self.delegation_paths_removed.is_empty()
            && self.delegation_prefixes_added.is_empty()
            && self.delegation_prefixes_removed.is_empty()
    }

    /// Merge one old-record/new-record diff into the accumulated changes
    fn merge_update(&mut self, old: &RoleRecord, new: &RoleRecord) {
        // Target path changes.
        fold_delta(
            &mut self.targets_added,
            &mut self.targets_removed,
            old.target_paths(),
            new.target_paths(),
        );

        let old_delegations: BTreeMap<&str, &Delegation> = old
            .delegations()
            .iter()
            .map(|d| (d.name.as_str(), d))
            .collect();
        let new_delegations: BTreeMap<&str, &Delegation> = new
            .delegations()
            .iter()
            .map(|d| (d.name.as_str(), d))
            .collect();

        let old_names: BTreeSet<String> =
            old_delegations.keys().map(|n| n.to_string()).collect();
        let new_names: BTreeSet<String> =
            new_delegations.keys().map(|n| n.to_string()).collect();

        fold_delta(
            &mut self.delegations_made,
            &mut self.delegations_revoked,
            &old_names,
            &new_names,
        );

        // Detail changes are only meaningful for delegations present on both
        // sides; a revocation is already captured above, and re-creating a
        // delegation later restarts its detail diff from the new grant.
        for delegated in old_names.intersection(&new_names) {
            let old_grant = old_delegations[delegated.as_str()];
            let new_grant = new_delegations[delegated.as_str()];

            fold_keyed_delta(
                &mut self.delegation_keys_added,
                &mut self.delegation_keys_revoked,
                delegated,
                &old_grant.keyids,
                &new_grant.keyids,
            );
            fold_keyed_delta(
                &mut self.delegation_paths_added,
                &mut self.delegation_paths_removed,
                delegated,
                &old_grant.paths,
                &new_grant.paths,
            );
            fold_keyed_delta(
                &mut self.delegation_prefixes_added,
                &mut self.delegation_prefixes_removed,
                delegated,
                &old_grant.path_hash_prefixes,
                &new_grant.path_hash_prefixes,
            );

            let delta =
                i64::from(new_grant.threshold) - i64::from(old_grant.threshold);
            let net = self
                .delegation_threshold_deltas
                .remove(delegated)
                .unwrap_or(0)
                + delta;
            if net != 0 {
                self.delegation_threshold_deltas
                    .insert(delegated.clone(), net);
            }
        }
    }
}

/// Fold a before/after set difference into add/remove accumulators
///
/// A gained item cancels a pending removal if one exists, otherwise it
/// becomes a pending addition; items lost do the reverse. Applying the same
/// transition twice is a no-op, and a transition followed by its inverse
/// leaves both accumulators untouched.
fn fold_delta<T: Ord + Clone>(
    added: &mut BTreeSet<T>,
    removed: &mut BTreeSet<T>,
    old: &BTreeSet<T>,
    new: &BTreeSet<T>,
) {
    for item in new.difference(old) {
        if !removed.remove(item) {
            added.insert(item.clone());
        }
    }
    for item in old.difference(new) {
        if !added.remove(item) {
            removed.insert(item.clone());
        }
    }
}

/// [`fold_delta`] applied under one delegation's key in paired maps
///
/// Map entries that fold down to empty sets are dropped so an all-empty
/// diff is recognizable.
fn fold_keyed_delta<T: Ord + Clone>(
    added: &mut BTreeMap<String, BTreeSet<T>>,
    removed: &mut BTreeMap<String, BTreeSet<T>>,
    delegated: &str,
    old: &BTreeSet<T>,
    new: &BTreeSet<T>,
) {
    let mut added_set = added.remove(delegated).unwrap_or_default();
    let mut removed_set = removed.remove(delegated).unwrap_or_default();

    fold_delta(&mut added_set, &mut removed_set, old, new);

    if !added_set.is_empty() {
        added.insert(delegated.to_string(), added_set);
    }
    if !removed_set.is_empty() {
        removed.insert(delegated.to_string(), removed_set);
    }
}

/// Accumulates per-role diffs between committed and in-memory state
///
/// Owned by the registry and driven by its mutations; enabled or disabled
/// for the registry's whole lifetime.
#[derive(Debug, Clone, Default)]
pub struct ChangeTracker {
    changes: BTreeMap<String, RoleChanges>,
    partially_written: BTreeSet<String>,
}

impl ChangeTracker {
    /// Create an empty tracker
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that a role was newly added
    pub fn record_created(&mut self, rolename: &str) {
        self.changes
            .entry(rolename.to_string())
            .or_default()
            .created = true;
    }

    /// Merge the diff between a role's stored and replacement records
    pub fn record_update(&mut self, rolename: &str, old: &RoleRecord, new: &RoleRecord) {
        let mut entry = self.changes.remove(rolename).unwrap_or_default();
        entry.merge_update(old, new);

        if !entry.is_empty() {
            self.changes.insert(rolename.to_string(), entry);
        }
    }

    /// Force a role into (or out of) the changed set without a content diff
    ///
    /// `touch(name, true)` is idempotent. `touch(name, false)` removes the
    /// role from the changed set only when nothing else is pending for it.
    pub fn touch(&mut self, rolename: &str, dirty: bool) {
        match self.changes.get_mut(rolename) {
            Some(entry) => {
                entry.touched = dirty;
                if entry.is_empty() {
                    self.changes.remove(rolename);
                }
            }
            None if dirty => {
                self.changes
                    .entry(rolename.to_string())
                    .or_default()
                    .touched = true;
            }
            None => {}
        }
    }

    /// Drop all pending state for a role, e.g. when it is removed
    pub fn forget(&mut self, rolename: &str) {
        self.changes.remove(rolename);
        self.partially_written.remove(rolename);
    }

    /// Whether the role has any pending diff
    pub fn is_changed(&self, rolename: &str) -> bool {
        self.changes.contains_key(rolename)
    }

    /// Every role with a pending diff, sorted
    pub fn changed_rolenames(&self) -> Vec<String> {
        self.changes.keys().cloned().collect()
    }

    /// The accumulated diff for a role; empty if nothing is pending
    pub fn changes_for(&self, rolename: &str) -> RoleChanges {
        self.changes.get(rolename).cloned().unwrap_or_default()
    }

    /// Roles whose last write carried fewer valid signatures than required
    pub fn partially_written(&self) -> &BTreeSet<String> {
        &self.partially_written
    }

    /// Restore under-signed markers, e.g. when resuming a session from disk
    pub fn set_partially_written(&mut self, rolenames: impl IntoIterator<Item = impl Into<String>>) {
        self.partially_written = rolenames.into_iter().map(Into::into).collect();
    }

    /// Clear all diffs after a successful write
    ///
    /// Every role that was pending is marked partially written unless the
    /// caller names it in `fully_signed`; confirmed roles also shed any
    /// marker carried over from an earlier session. The tracker takes the
    /// caller's word for it, it never inspects signatures itself.
    pub fn commit(&mut self, fully_signed: &[&str]) {
        let confirmed: BTreeSet<&str> = fully_signed.iter().copied().collect();

        for rolename in self.changes.keys() {
            if !confirmed.contains(rolename.as_str()) {
                self.partially_written.insert(rolename.clone());
            }
        }
        for rolename in &confirmed {
            self.partially_written.remove(*rolename);
        }

        self.changes.clear();
    }

    /// Wipe every diff and marker
    pub fn clear(&mut self) {
        self.changes.clear();
        self.partially_written.clear();
    }
}
