//! Role records and the data model of the delegation graph
//!
//! A [`RoleRecord`] describes one signing role: the key identifiers
//! authorized to sign its metadata, the signature threshold, the signatures
//! collected so far this cycle, and kind-specific detail. The record kind is
//! a tagged variant derived from the role name, so a record can never carry
//! fields that are meaningless for its role (a snapshot role with target
//! paths, say) past construction-time validation.
//!
//! The registry never computes or checks a cryptographic signature; records
//! hold key identifiers and opaque signature blobs only.

use crate::error::{RegistryError, Result};
use crate::name;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Identifier of a signing key
///
/// Key identifiers are opaque strings (conventionally the hex digest of the
/// public key) handed to the registry by the cryptographic layer. The
/// registry compares and counts them but never interprets them.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct KeyId(String);

impl KeyId {
    /// Create a key identifier from its string form
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// View the identifier as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for KeyId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for KeyId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for KeyId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A collected signature: the key that produced it and the opaque blob
///
/// Whether the blob actually verifies is the cryptographic layer's business;
/// the registry only intersects `keyid` with the authorized key set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureEntry {
    /// Identifier of the key that produced the signature
    pub keyid: KeyId,
    /// Opaque signature bytes
    pub value: Vec<u8>,
}

impl SignatureEntry {
    /// Create a signature entry
    pub fn new(keyid: impl Into<KeyId>, value: Vec<u8>) -> Self {
        Self {
            keyid: keyid.into(),
            value,
        }
    }
}

/// One child-role grant held by a target-bearing parent
///
/// The parent keeps delegations as an ordered sequence; order matters to
/// consumers resolving a target against overlapping namespaces. An empty
/// `paths` and `path_hash_prefixes` means the delegate holds unrestricted
/// authority within the parent's own namespace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Delegation {
    /// Full hierarchical name of the delegated role
    pub name: String,
    /// Keys authorized to sign the delegate's metadata
    pub keyids: BTreeSet<KeyId>,
    /// Minimum number of valid signatures the delegate needs
    pub threshold: u32,
    /// Target paths the delegate may claim authority over
    pub paths: BTreeSet<String>,
    /// Hash prefixes bounding the delegate's target namespace
    pub path_hash_prefixes: BTreeSet<String>,
}

impl Delegation {
    /// Create an unrestricted delegation grant
    pub fn new(name: impl Into<String>, keyids: BTreeSet<KeyId>, threshold: u32) -> Self {
        Self {
            name: name.into(),
            keyids,
            threshold,
            paths: BTreeSet::new(),
            path_hash_prefixes: BTreeSet::new(),
        }
    }

    /// Restrict the delegation to the given target paths
    pub fn with_paths(mut self, paths: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.paths = paths.into_iter().map(Into::into).collect();
        self
    }

    /// Restrict the delegation to the given path hash prefixes
    pub fn with_path_hash_prefixes(
        mut self,
        prefixes: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        self.path_hash_prefixes = prefixes.into_iter().map(Into::into).collect();
        self
    }
}

/// Kind of a signing role, derived from its name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RoleKind {
    /// The root of trust
    Root,
    /// Freshness announcement role
    Timestamp,
    /// Consistency snapshot role
    Snapshot,
    /// A target-bearing role: `targets` itself or any delegated role
    Targets,
}

impl RoleKind {
    /// Derive the role kind from a role name
    ///
    /// `root`, `timestamp` and `snapshot` are the non-hierarchical
    /// singletons; every other name is target-bearing.
    pub fn from_name(rolename: &str) -> Self {
        match rolename {
            "root" => RoleKind::Root,
            "timestamp" => RoleKind::Timestamp,
            "snapshot" => RoleKind::Snapshot,
            _ => RoleKind::Targets,
        }
    }
}

/// Detail carried by target-bearing roles
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetsDetail {
    /// Target paths this role asserts authority over
    pub paths: BTreeSet<String>,
    /// Hash prefixes bounding this role's target namespace
    pub path_hash_prefixes: BTreeSet<String>,
    /// Ordered child-role grants
    pub delegations: Vec<Delegation>,
}

/// Kind-specific portion of a role record
///
/// Only the singleton roles carry `version`/`expires`; only target-bearing
/// roles carry paths and delegations. The variant must agree with the kind
/// derived from the role name, checked by [`RoleRecord::validate_for`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RoleDetail {
    /// Detail for the `root` role
    Root {
        /// Metadata version counter
        version: u64,
        /// Expiration timestamp (seconds since epoch)
        expires: i64,
    },
    /// Detail for the `timestamp` role
    Timestamp {
        /// Metadata version counter
        version: u64,
        /// Expiration timestamp (seconds since epoch)
        expires: i64,
    },
    /// Detail for the `snapshot` role
    Snapshot {
        /// Metadata version counter
        version: u64,
        /// Expiration timestamp (seconds since epoch)
        expires: i64,
    },
    /// Detail for `targets` and every delegated-targets role
    Targets(TargetsDetail),
}

impl RoleDetail {
    /// The role kind this detail belongs to
    pub fn kind(&self) -> RoleKind {
        match self {
            RoleDetail::Root { .. } => RoleKind::Root,
            RoleDetail::Timestamp { .. } => RoleKind::Timestamp,
            RoleDetail::Snapshot { .. } => RoleKind::Snapshot,
            RoleDetail::Targets(_) => RoleKind::Targets,
        }
    }

    /// Target-bearing detail, if this is a targets-kind role
    pub fn as_targets(&self) -> Option<&TargetsDetail> {
        match self {
            RoleDetail::Targets(detail) => Some(detail),
            _ => None,
        }
    }

    /// Mutable target-bearing detail, if this is a targets-kind role
    pub fn as_targets_mut(&mut self) -> Option<&mut TargetsDetail> {
        match self {
            RoleDetail::Targets(detail) => Some(detail),
            _ => None,
        }
    }
}

/// One role's full entry in the registry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleRecord {
    /// Keys currently authorized to sign this role's metadata
    pub keyids: BTreeSet<KeyId>,
    /// Minimum number of valid signatures required
    pub threshold: u32,
    /// Signatures collected so far this signing cycle
    pub signatures: Vec<SignatureEntry>,
    /// Keys the local process can sign with (distinct from `keyids`)
    pub signing_keyids: BTreeSet<KeyId>,
    /// Marks a record loaded without its full delegated content
    pub partial_loaded: bool,
    /// Kind-specific fields
    pub detail: RoleDetail,
}

impl RoleRecord {
    /// Create a record with the given authorized keys, threshold and detail
    ///
    /// Signatures and local signing keys start empty.
    pub fn new(keyids: BTreeSet<KeyId>, threshold: u32, detail: RoleDetail) -> Self {
        Self {
            keyids,
            threshold,
            signatures: Vec::new(),
            signing_keyids: BTreeSet::new(),
            partial_loaded: false,
            detail,
        }
    }

    /// Create a `root` record
    pub fn root(keyids: BTreeSet<KeyId>, threshold: u32, version: u64, expires: i64) -> Self {
        Self::new(keyids, threshold, RoleDetail::Root { version, expires })
    }

    /// Create a `timestamp` record
    pub fn timestamp(keyids: BTreeSet<KeyId>, threshold: u32, version: u64, expires: i64) -> Self {
        Self::new(keyids, threshold, RoleDetail::Timestamp { version, expires })
    }

    /// Create a `snapshot` record
    pub fn snapshot(keyids: BTreeSet<KeyId>, threshold: u32, version: u64, expires: i64) -> Self {
        Self::new(keyids, threshold, RoleDetail::Snapshot { version, expires })
    }

    /// Create a target-bearing record with empty paths and delegations
    pub fn targets(keyids: BTreeSet<KeyId>, threshold: u32) -> Self {
        Self::new(keyids, threshold, RoleDetail::Targets(TargetsDetail::default()))
    }

    /// Check that this record is structurally sound for the given name
    ///
    /// The detail variant must match the kind derived from the name, and the
    /// threshold must be positive. Runs on every insertion and update, so a
    /// mismatched record never reaches the store.
    pub fn validate_for(&self, rolename: &str) -> Result<()> {
        if self.threshold == 0 {
            return Err(RegistryError::MalformedInput {
                rolename: rolename.to_string(),
                reason: "threshold must be positive".to_string(),
            });
        }

        let expected = RoleKind::from_name(rolename);
        if self.detail.kind() != expected {
            return Err(RegistryError::MalformedInput {
                rolename: rolename.to_string(),
                reason: format!(
                    "record detail is {:?} but the name requires {:?}",
                    self.detail.kind(),
                    expected
                ),
            });
        }

        Ok(())
    }

    /// Whether the authorized key set is large enough to meet the threshold
    ///
    /// Checkable but not structurally enforced: a role may legitimately pass
    /// through states where keys have been revoked faster than replaced.
    pub fn threshold_satisfiable(&self) -> bool {
        self.keyids.len() as u64 >= u64::from(self.threshold)
    }

    /// The role's delegations; empty for singleton roles
    pub fn delegations(&self) -> &[Delegation] {
        self.detail
            .as_targets()
            .map(|d| d.delegations.as_slice())
            .unwrap_or(&[])
    }

    /// The role's target paths; empty for singleton roles
    pub fn target_paths(&self) -> &BTreeSet<String> {
        static EMPTY: BTreeSet<String> = BTreeSet::new();
        self.detail.as_targets().map(|d| &d.paths).unwrap_or(&EMPTY)
    }
}

/// Keys and threshold declared for one role in root metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleKeys {
    /// Authorized key identifiers
    pub keyids: BTreeSet<KeyId>,
    /// Minimum number of valid signatures
    pub threshold: u32,
}

/// Validated root-metadata input for bulk loading the registry
///
/// This is the already-parsed, already-signature-checked shape the metadata
/// layer hands over; the registry trusts it structurally except for role
/// names and thresholds, which it re-validates before absorbing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RootMetadata {
    /// Version of the root metadata envelope
    pub version: u64,
    /// Expiration of the root metadata envelope (seconds since epoch)
    pub expires: i64,
    /// Role name to keys/threshold map
    pub roles: BTreeMap<String, RoleKeys>,
}

impl RootMetadata {
    /// Derive the stored record for one entry of the role map
    ///
    /// The root role copies `version`/`expires` from the envelope;
    /// timestamp/snapshot start zeroed until their own metadata arrives;
    /// target-bearing roles default to empty paths and delegations.
    pub(crate) fn derive_record(&self, rolename: &str, keys: &RoleKeys) -> RoleRecord {
        let detail = match RoleKind::from_name(rolename) {
            RoleKind::Root => RoleDetail::Root {
                version: self.version,
                expires: self.expires,
            },
            RoleKind::Timestamp => RoleDetail::Timestamp {
                version: 0,
                expires: 0,
            },
            RoleKind::Snapshot => RoleDetail::Snapshot {
                version: 0,
                expires: 0,
            },
            RoleKind::Targets => RoleDetail::Targets(TargetsDetail::default()),
        };

        RoleRecord::new(keys.keyids.clone(), keys.threshold, detail)
    }

    /// Parent names required by the incoming name set but not declared in it
    pub(crate) fn missing_parents(&self) -> Vec<String> {
        let mut missing = BTreeSet::new();

        for rolename in self.roles.keys() {
            if !name::is_hierarchical(rolename) {
                continue;
            }
            for ancestor in name::ancestor_chain(rolename) {
                if !self.roles.contains_key(&ancestor) {
                    missing.insert(ancestor);
                }
            }
        }

        missing.into_iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keyset(ids: &[&str]) -> BTreeSet<KeyId> {
        ids.iter().map(|id| KeyId::from(*id)).collect()
    }

    #[test]
    fn test_role_kind_from_name() {
        assert_eq!(RoleKind::from_name("root"), RoleKind::Root);
        assert_eq!(RoleKind::from_name("timestamp"), RoleKind::Timestamp);
        assert_eq!(RoleKind::from_name("snapshot"), RoleKind::Snapshot);
        assert_eq!(RoleKind::from_name("targets"), RoleKind::Targets);
        assert_eq!(RoleKind::from_name("targets/project"), RoleKind::Targets);
        assert_eq!(RoleKind::from_name("mirrors"), RoleKind::Targets);
    }

    #[test]
    fn test_validate_for_accepts_matching_detail() {
        let record = RoleRecord::root(keyset(&["k1"]), 1, 1, 2_000_000_000);
        assert!(record.validate_for("root").is_ok());

        let record = RoleRecord::targets(keyset(&["k1"]), 1);
        assert!(record.validate_for("targets/project").is_ok());
    }

    #[test]
    fn test_validate_for_rejects_kind_mismatch() {
        let record = RoleRecord::root(keyset(&["k1"]), 1, 1, 0);
        let err = record.validate_for("targets").unwrap_err();
        assert!(matches!(err, crate::RegistryError::MalformedInput { .. }));

        let record = RoleRecord::targets(keyset(&["k1"]), 1);
        assert!(record.validate_for("snapshot").is_err());
    }

    #[test]
    fn test_validate_for_rejects_zero_threshold() {
        let record = RoleRecord::targets(keyset(&["k1"]), 0);
        let err = record.validate_for("targets").unwrap_err();
        assert!(matches!(err, crate::RegistryError::MalformedInput { .. }));
    }

    #[test]
    fn test_threshold_satisfiable() {
        let record = RoleRecord::targets(keyset(&["k1", "k2"]), 2);
        assert!(record.threshold_satisfiable());

        let record = RoleRecord::targets(keyset(&["k1"]), 2);
        assert!(!record.threshold_satisfiable());
    }

    #[test]
    fn test_delegations_empty_for_singletons() {
        let record = RoleRecord::snapshot(keyset(&["k1"]), 1, 3, 0);
        assert!(record.delegations().is_empty());
        assert!(record.target_paths().is_empty());
    }

    #[test]
    fn test_delegation_builders() {
        let delegation = Delegation::new("targets/app", keyset(&["k1"]), 1)
            .with_paths(["apps/"])
            .with_path_hash_prefixes(["8f"]);

        assert_eq!(delegation.name, "targets/app");
        assert!(delegation.paths.contains("apps/"));
        assert!(delegation.path_hash_prefixes.contains("8f"));
    }

    #[test]
    fn test_root_metadata_missing_parents() {
        let mut roles = BTreeMap::new();
        roles.insert(
            "targets/a/b".to_string(),
            RoleKeys {
                keyids: keyset(&["k1"]),
                threshold: 1,
            },
        );

        let meta = RootMetadata {
            version: 1,
            expires: 0,
            roles,
        };

        assert_eq!(meta.missing_parents(), vec!["targets", "targets/a"]);
    }

    #[test]
    fn test_record_serialization_roundtrip() {
        let mut record = RoleRecord::targets(keyset(&["k1", "k2"]), 2);
        record.signatures.push(SignatureEntry::new("k1", vec![0xab, 0xcd]));
        record
            .detail
            .as_targets_mut()
            .unwrap()
            .delegations
            .push(Delegation::new("targets/app", keyset(&["k3"]), 1).with_paths(["apps/"]));

        let serialized = serde_json::to_string(&record).unwrap();
        let deserialized: RoleRecord = serde_json::from_str(&serialized).unwrap();

        assert_eq!(deserialized, record);
    }
}
