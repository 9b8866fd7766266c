//! The authoritative role store
//!
//! [`RoleRegistry`] owns the map from role name to [`RoleRecord`] and
//! enforces the hierarchy invariants on every mutation: names are validated
//! before they reach the store, parents must exist before their delegates,
//! removal cascades to all descendants, and bulk loads are atomic.
//!
//! The registry is shared mutable state driven by one logical workflow at a
//! time. All state sits behind a single `parking_lot::RwLock`, and every
//! public operation takes the lock exactly once for its whole span, so
//! multi-entry operations (bulk load, cascade removal, diff-then-replace)
//! never interleave. No operation performs I/O or suspends.

use crate::changes::{ChangeTracker, RoleChanges};
use crate::error::{RegistryError, Result};
use crate::name;
use crate::record::{KeyId, RoleRecord, RootMetadata};
use parking_lot::RwLock;
use std::collections::{BTreeMap, BTreeSet};

/// Construction-time options for a registry
#[derive(Debug, Clone, Copy, Default)]
pub struct RegistryOptions {
    /// Keep per-role diffs of all unwritten changes
    ///
    /// Fixed for the registry's lifetime. Signing sessions need it; pure
    /// verification workflows can leave it off.
    pub track_changes: bool,
}

#[derive(Debug, Default)]
pub(crate) struct RegistryInner {
    pub(crate) roles: BTreeMap<String, RoleRecord>,
    /// Parent name to direct children, so descendant queries walk the
    /// subtree instead of scanning every stored name.
    children: BTreeMap<String, BTreeSet<String>>,
    pub(crate) tracker: Option<ChangeTracker>,
}

impl RegistryInner {
    fn descendants_of(&self, rolename: &str) -> Vec<String> {
        let mut found = Vec::new();
        let mut stack: Vec<&String> = match self.children.get(rolename) {
            Some(direct) => direct.iter().collect(),
            None => return found,
        };

        while let Some(child) = stack.pop() {
            found.push(child.clone());
            if let Some(grandchildren) = self.children.get(child) {
                stack.extend(grandchildren.iter());
            }
        }

        found.sort();
        found
    }

    fn link(&mut self, rolename: &str) {
        if name::is_hierarchical(rolename) {
            self.children
                .entry(name::parent_of(rolename).to_string())
                .or_default()
                .insert(rolename.to_string());
        }
    }

    fn unlink(&mut self, rolename: &str) {
        if !name::is_hierarchical(rolename) {
            return;
        }
        let parent = name::parent_of(rolename);
        if let Some(siblings) = self.children.get_mut(parent) {
            siblings.remove(rolename);
            if siblings.is_empty() {
                self.children.remove(parent);
            }
        }
    }

    fn delete(&mut self, rolename: &str) {
        self.roles.remove(rolename);
        self.children.remove(rolename);
        self.unlink(rolename);
        if let Some(tracker) = self.tracker.as_mut() {
            tracker.forget(rolename);
        }
    }
}

/// The role trust database
///
/// Maps every signing role in the delegation hierarchy to its record and
/// answers hierarchy, change-tracking and signature-accounting queries.
/// Construct one instance per trust context; there is no shared global
/// state.
///
/// # Examples
///
/// ```
/// use roletrust::{KeyId, RegistryOptions, RoleRecord, RoleRegistry};
/// use std::collections::BTreeSet;
///
/// let registry = RoleRegistry::with_options(RegistryOptions { track_changes: true });
///
/// let mut keyids = BTreeSet::new();
/// keyids.insert(KeyId::new("1a2b"));
/// registry.add("targets", RoleRecord::targets(keyids, 1))?;
///
/// assert_eq!(registry.list(), vec!["targets".to_string()]);
/// # Ok::<(), roletrust::RegistryError>(())
/// ```
#[derive(Debug, Default)]
pub struct RoleRegistry {
    pub(crate) inner: RwLock<RegistryInner>,
}

impl RoleRegistry {
    /// Create an empty registry without change tracking
    pub fn new() -> Self {
        Self::with_options(RegistryOptions::default())
    }

    /// Create an empty registry with the given options
    pub fn with_options(options: RegistryOptions) -> Self {
        Self {
            inner: RwLock::new(RegistryInner {
                roles: BTreeMap::new(),
                children: BTreeMap::new(),
                tracker: options.track_changes.then(ChangeTracker::new),
            }),
        }
    }

    /// Whether this registry keeps per-role change diffs
    pub fn tracks_changes(&self) -> bool {
        self.inner.read().tracker.is_some()
    }

    /// Insert a new role, requiring its parent to be present
    ///
    /// Fails with [`RegistryError::RoleAlreadyExists`] on a duplicate name
    /// regardless of record equality, [`RegistryError::InvalidName`] on bad
    /// syntax, [`RegistryError::MalformedInput`] when the record's shape
    /// does not fit the name, and [`RegistryError::DelegationIntegrity`]
    /// when the parent role is absent.
    pub fn add(&self, rolename: &str, record: RoleRecord) -> Result<()> {
        self.add_with_options(rolename, record, true)
    }

    /// Insert a new role, optionally skipping the parent-presence check
    ///
    /// Loading metadata out of order is the only sane reason to pass
    /// `require_parent = false`; the namespace invariants assume the parent
    /// eventually shows up.
    pub fn add_with_options(
        &self,
        rolename: &str,
        record: RoleRecord,
        require_parent: bool,
    ) -> Result<()> {
        name::validate_rolename(rolename)?;
        record.validate_for(rolename)?;

        let inner = &mut *self.inner.write();

        if inner.roles.contains_key(rolename) {
            return Err(RegistryError::RoleAlreadyExists {
                rolename: rolename.to_string(),
            });
        }

        if require_parent && name::is_hierarchical(rolename) {
            let parent = name::parent_of(rolename);
            if !inner.roles.contains_key(parent) {
                return Err(RegistryError::DelegationIntegrity {
                    missing: vec![parent.to_string()],
                });
            }
        }

        if !record.threshold_satisfiable() {
            tracing::warn!(
                rolename,
                threshold = record.threshold,
                keyids = record.keyids.len(),
                "role threshold exceeds its authorized key count"
            );
        }

        inner.roles.insert(rolename.to_string(), record);
        inner.link(rolename);
        if let Some(tracker) = inner.tracker.as_mut() {
            tracker.record_created(rolename);
        }

        tracing::debug!(rolename, "role added");
        Ok(())
    }

    /// Return an independently mutable copy of a role's record
    ///
    /// Mutating the returned record never affects the stored one; changes
    /// flow back through [`RoleRegistry::update`].
    pub fn get(&self, rolename: &str) -> Result<RoleRecord> {
        name::validate_rolename(rolename)?;

        self.inner
            .read()
            .roles
            .get(rolename)
            .cloned()
            .ok_or_else(|| RegistryError::UnknownRole {
                rolename: rolename.to_string(),
            })
    }

    /// Whether a role is present in the registry
    pub fn contains(&self, rolename: &str) -> Result<bool> {
        name::validate_rolename(rolename)?;
        Ok(self.inner.read().roles.contains_key(rolename))
    }

    /// Replace a role's record wholesale
    ///
    /// When change tracking is enabled the old and new records are diffed
    /// into the pending change set before the replacement happens.
    pub fn update(&self, rolename: &str, record: RoleRecord) -> Result<()> {
        name::validate_rolename(rolename)?;
        record.validate_for(rolename)?;

        let inner = &mut *self.inner.write();

        let old = inner
            .roles
            .get(rolename)
            .ok_or_else(|| RegistryError::UnknownRole {
                rolename: rolename.to_string(),
            })?;

        if !record.threshold_satisfiable() {
            tracing::warn!(
                rolename,
                threshold = record.threshold,
                keyids = record.keyids.len(),
                "role threshold exceeds its authorized key count"
            );
        }

        if let Some(tracker) = inner.tracker.as_mut() {
            tracker.record_update(rolename, old, &record);
        }

        inner.roles.insert(rolename.to_string(), record);
        tracing::debug!(rolename, "role updated");
        Ok(())
    }

    /// Remove a role and every role delegated beneath it
    pub fn remove(&self, rolename: &str) -> Result<()> {
        name::validate_rolename(rolename)?;

        let inner = &mut *self.inner.write();
        if !inner.roles.contains_key(rolename) {
            return Err(RegistryError::UnknownRole {
                rolename: rolename.to_string(),
            });
        }

        for descendant in inner.descendants_of(rolename) {
            inner.delete(&descendant);
        }
        inner.delete(rolename);

        tracing::debug!(rolename, "role removed with descendants");
        Ok(())
    }

    /// Remove every role delegated beneath a role, leaving it in place
    pub fn remove_descendants(&self, rolename: &str) -> Result<()> {
        name::validate_rolename(rolename)?;

        let inner = &mut *self.inner.write();
        if !inner.roles.contains_key(rolename) {
            return Err(RegistryError::UnknownRole {
                rolename: rolename.to_string(),
            });
        }

        for descendant in inner.descendants_of(rolename) {
            inner.delete(&descendant);
        }

        Ok(())
    }

    /// Every stored role delegated beneath a role, sorted
    ///
    /// Matches only true descendants: `a/b` yields `a/b/c` but never `a/bc`
    /// and never `a/b` itself.
    pub fn descendants(&self, rolename: &str) -> Result<Vec<String>> {
        name::validate_rolename(rolename)?;

        let inner = self.inner.read();
        if !inner.roles.contains_key(rolename) {
            return Err(RegistryError::UnknownRole {
                rolename: rolename.to_string(),
            });
        }

        Ok(inner.descendants_of(rolename))
    }

    /// Snapshot of all role names at call time, sorted
    pub fn list(&self) -> Vec<String> {
        self.inner.read().roles.keys().cloned().collect()
    }

    /// Number of roles in the registry
    pub fn len(&self) -> usize {
        self.inner.read().roles.len()
    }

    /// Whether the registry holds no roles
    pub fn is_empty(&self) -> bool {
        self.inner.read().roles.is_empty()
    }

    /// Empty the registry and all change-tracking state
    pub fn clear(&self) {
        let inner = &mut *self.inner.write();
        inner.roles.clear();
        inner.children.clear();
        if let Some(tracker) = inner.tracker.as_mut() {
            tracker.clear();
        }
        tracing::debug!("registry cleared");
    }

    /// Rebuild the registry from validated root metadata
    ///
    /// Atomic: the incoming name set is validated in full (syntax,
    /// thresholds, parent closure) before anything is mutated. On success
    /// the previous content is discarded and one record per role-map entry
    /// is absorbed; on failure the registry is left exactly as it was.
    /// Change-tracking state is reset, since the loaded roles represent
    /// committed metadata rather than pending edits.
    pub fn load_from_root_metadata(&self, metadata: &RootMetadata) -> Result<()> {
        for (rolename, keys) in &metadata.roles {
            name::validate_rolename(rolename)?;
            if keys.threshold == 0 {
                return Err(RegistryError::MalformedInput {
                    rolename: rolename.clone(),
                    reason: "threshold must be positive".to_string(),
                });
            }
        }

        let missing = metadata.missing_parents();
        if !missing.is_empty() {
            return Err(RegistryError::DelegationIntegrity { missing });
        }

        let inner = &mut *self.inner.write();
        inner.roles.clear();
        inner.children.clear();
        if let Some(tracker) = inner.tracker.as_mut() {
            tracker.clear();
        }

        for (rolename, keys) in &metadata.roles {
            let record = metadata.derive_record(rolename, keys);
            if !record.threshold_satisfiable() {
                tracing::warn!(
                    rolename,
                    "loaded role threshold exceeds its authorized key count"
                );
            }
            inner.roles.insert(rolename.clone(), record);
            inner.link(rolename);
        }

        tracing::debug!(roles = inner.roles.len(), "registry loaded from root metadata");
        Ok(())
    }

    /// The authorized key identifiers of a role
    pub fn keyids_of(&self, rolename: &str) -> Result<BTreeSet<KeyId>> {
        Ok(self.get(rolename)?.keyids)
    }

    /// The signature threshold of a role
    pub fn threshold_of(&self, rolename: &str) -> Result<u32> {
        Ok(self.get(rolename)?.threshold)
    }

    /// The target paths of a role; empty for singleton roles
    pub fn target_paths_of(&self, rolename: &str) -> Result<BTreeSet<String>> {
        Ok(self.get(rolename)?.target_paths().clone())
    }

    /// Force a role into (or out of) the changed set without a content diff
    ///
    /// Used for cascading re-signs: a parent edit can require children to
    /// re-sign even though their own content is untouched.
    ///
    /// # Panics
    ///
    /// Panics if the registry was built without change tracking.
    pub fn touch(&self, rolename: &str, dirty: bool) -> Result<()> {
        name::validate_rolename(rolename)?;

        let inner = &mut *self.inner.write();
        if !inner.roles.contains_key(rolename) {
            return Err(RegistryError::UnknownRole {
                rolename: rolename.to_string(),
            });
        }

        inner
            .tracker
            .as_mut()
            .expect("touch requires a change-tracking registry")
            .touch(rolename, dirty);
        Ok(())
    }

    /// Every role with a pending diff, sorted; empty when tracking is off
    pub fn changed_rolenames(&self) -> Vec<String> {
        self.inner
            .read()
            .tracker
            .as_ref()
            .map(ChangeTracker::changed_rolenames)
            .unwrap_or_default()
    }

    /// The accumulated diff for a role; empty if nothing is pending
    pub fn changes_for(&self, rolename: &str) -> Result<RoleChanges> {
        name::validate_rolename(rolename)?;

        let inner = self.inner.read();
        if !inner.roles.contains_key(rolename) {
            return Err(RegistryError::UnknownRole {
                rolename: rolename.to_string(),
            });
        }

        Ok(inner
            .tracker
            .as_ref()
            .map(|tracker| tracker.changes_for(rolename))
            .unwrap_or_default())
    }

    /// Clear all pending diffs after a successful metadata write
    ///
    /// Roles named in `fully_signed` shed their under-signed marker; every
    /// other role that had a pending diff is marked partially written so a
    /// later session can resume signing it.
    ///
    /// # Panics
    ///
    /// Panics if the registry was built without change tracking.
    pub fn commit(&self, fully_signed: &[&str]) {
        self.inner
            .write()
            .tracker
            .as_mut()
            .expect("commit requires a change-tracking registry")
            .commit(fully_signed);
    }

    /// Roles whose last write was under threshold, sorted
    pub fn partially_written_rolenames(&self) -> Vec<String> {
        self.inner
            .read()
            .tracker
            .as_ref()
            .map(|tracker| tracker.partially_written().iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Restore under-signed markers when resuming a session
    ///
    /// # Panics
    ///
    /// Panics if the registry was built without change tracking.
    pub fn set_partially_written(&self, rolenames: &[&str]) {
        self.inner
            .write()
            .tracker
            .as_mut()
            .expect("set_partially_written requires a change-tracking registry")
            .set_partially_written(rolenames.iter().copied());
    }
}
