//! End-to-end signing-session scenarios
//!
//! These tests drive the registry the way a metadata editing session does:
//! load trusted root metadata, grow the delegation tree, edit roles, ask the
//! signature accountant what still needs signing, write, and resume later.

use roletrust::{
    Delegation, KeyId, RegistryOptions, RoleKeys, RoleRecord, RoleRegistry, RootMetadata,
    SignatureEntry, SigningState,
};
use std::collections::{BTreeMap, BTreeSet};

fn keys(ids: &[&str]) -> BTreeSet<KeyId> {
    ids.iter().map(|id| KeyId::new(*id)).collect()
}

fn root_metadata() -> RootMetadata {
    let mut roles = BTreeMap::new();
    for rolename in ["root", "timestamp", "snapshot", "targets"] {
        roles.insert(
            rolename.to_string(),
            RoleKeys {
                keyids: keys(&["k1"]),
                threshold: 1,
            },
        );
    }
    RootMetadata {
        version: 7,
        expires: 2_500_000_000,
        roles,
    }
}

fn session_registry() -> RoleRegistry {
    let registry = RoleRegistry::with_options(RegistryOptions { track_changes: true });
    registry.load_from_root_metadata(&root_metadata()).unwrap();
    registry
}

#[test]
fn bulk_load_reproduces_declared_roles() {
    let registry = session_registry();

    assert_eq!(
        registry.list(),
        vec!["root", "snapshot", "targets", "timestamp"]
    );
    for rolename in registry.list() {
        assert_eq!(registry.keyids_of(&rolename).unwrap(), keys(&["k1"]));
        assert_eq!(registry.threshold_of(&rolename).unwrap(), 1);
    }

    // A fresh load starts with a clean signing session.
    assert!(registry.changed_rolenames().is_empty());
}

#[test]
fn delegation_session_tracks_edits_and_resumes() {
    let registry = session_registry();

    // Delegate apps/ to a new role and register it.
    let mut targets = registry.get("targets").unwrap();
    targets
        .detail
        .as_targets_mut()
        .unwrap()
        .delegations
        .push(Delegation::new("targets/app", keys(&["ka"]), 1).with_paths(["apps/"]));
    registry.update("targets", targets).unwrap();

    let mut app = RoleRecord::targets(keys(&["ka"]), 1);
    app.signing_keyids = keys(&["ka"]);
    registry.add("targets/app", app).unwrap();

    assert_eq!(
        registry.changed_rolenames(),
        vec!["targets", "targets/app"]
    );

    // Both dirty roles need a full signing pass from their local keys.
    assert_eq!(registry.needed_signature_count("targets/app").unwrap(), 1);
    assert_eq!(
        registry.signing_state("targets/app").unwrap(),
        SigningState::Unsigned
    );

    // The writer flushes both, but only targets came back fully signed.
    registry.commit(&["targets"]);

    assert!(registry.changed_rolenames().is_empty());
    assert_eq!(
        registry.partially_written_rolenames(),
        vec!["targets/app".to_string()]
    );
    assert_eq!(
        registry.incomplete_unchanged_rolenames(),
        vec!["targets/app".to_string()]
    );

    // Next session: the delegate's signature arrives, the write confirms it.
    let mut app = registry.get("targets/app").unwrap();
    app.signatures.push(SignatureEntry::new("ka", vec![0xaa]));
    registry.update("targets/app", app).unwrap();
    registry.commit(&["targets/app"]);

    assert!(registry.partially_written_rolenames().is_empty());
    assert!(registry.incomplete_unchanged_rolenames().is_empty());
    assert!(registry.is_fully_signed("targets/app").unwrap());
}

#[test]
fn parent_key_rotation_surfaces_invalidated_delegate() {
    let registry = session_registry();

    let mut targets = registry.get("targets").unwrap();
    targets
        .detail
        .as_targets_mut()
        .unwrap()
        .delegations
        .push(Delegation::new("targets/app", keys(&["ka"]), 1));
    registry.update("targets", targets).unwrap();

    let mut app = RoleRecord::targets(keys(&["ka"]), 1);
    app.signatures.push(SignatureEntry::new("ka", vec![0x01]));
    registry.add("targets/app", app).unwrap();
    registry.commit(&["targets", "targets/app"]);

    // Rotate the delegation to a new key. The delegate's content is
    // untouched, but its collected signature no longer satisfies the grant.
    let mut targets = registry.get("targets").unwrap();
    targets.detail.as_targets_mut().unwrap().delegations[0].keyids = keys(&["kb"]);
    registry.update("targets", targets).unwrap();

    assert_eq!(registry.changed_rolenames(), vec!["targets"]);
    assert_eq!(
        registry.incomplete_unchanged_rolenames(),
        vec!["targets/app".to_string()]
    );

    // The tracked diff names the rotation explicitly.
    let changes = registry.changes_for("targets").unwrap();
    assert_eq!(changes.delegation_keys_added["targets/app"], keys(&["kb"]));
    assert_eq!(
        changes.delegation_keys_revoked["targets/app"],
        keys(&["ka"])
    );
}

#[test]
fn forced_resign_via_touch_roundtrip() {
    let registry = session_registry();

    registry.touch("snapshot", true).unwrap();
    registry.touch("snapshot", true).unwrap();
    assert_eq!(registry.changed_rolenames(), vec!["snapshot"]);

    registry.touch("snapshot", false).unwrap();
    assert!(registry.changed_rolenames().is_empty());
}

#[test]
fn resumed_session_restores_undersigned_markers() {
    let registry = session_registry();

    // A previous run recorded these as written under threshold.
    registry.set_partially_written(&["snapshot", "targets"]);

    assert_eq!(
        registry.incomplete_unchanged_rolenames(),
        vec!["snapshot".to_string(), "targets".to_string()]
    );

    // Editing one moves it from "incomplete unchanged" to "changed".
    registry.touch("targets", true).unwrap();
    assert_eq!(
        registry.incomplete_unchanged_rolenames(),
        vec!["snapshot".to_string()]
    );
}

#[test]
fn cascade_remove_prunes_whole_subtree() {
    let registry = session_registry();

    let grants = [
        ("targets/a", "targets"),
        ("targets/a/x", "targets/a"),
        ("targets/a/x/deep", "targets/a/x"),
        ("targets/b", "targets"),
    ];
    for (child, _) in grants {
        registry.add(child, RoleRecord::targets(keys(&["ka"]), 1)).unwrap();
    }

    registry.remove("targets/a").unwrap();

    assert_eq!(
        registry.list(),
        vec!["root", "snapshot", "targets", "targets/b", "timestamp"]
    );
}

#[test]
fn restriction_chain_supports_authority_checks() {
    let registry = session_registry();

    let mut targets = registry.get("targets").unwrap();
    targets
        .detail
        .as_targets_mut()
        .unwrap()
        .paths
        .insert("apps/".to_string());
    registry.update("targets", targets).unwrap();

    let mut web = RoleRecord::targets(keys(&["ka"]), 1);
    web.detail
        .as_targets_mut()
        .unwrap()
        .paths
        .insert("apps/web/".to_string());
    registry.add("targets/web", web).unwrap();

    let chain = registry.restriction_chain("targets/web").unwrap();

    // A claimed target is in authority only if every step covers it.
    let claimed = "apps/web/index.html";
    assert!(chain
        .iter()
        .all(|step| roletrust::path_covered(&step.paths, claimed)));

    let out_of_scope = "firmware/image.bin";
    assert!(!chain
        .iter()
        .all(|step| roletrust::path_covered(&step.paths, out_of_scope)));
}

#[test]
fn clear_resets_the_whole_session() {
    let registry = session_registry();
    registry.touch("targets", true).unwrap();
    registry.set_partially_written(&["snapshot"]);

    registry.clear();

    assert!(registry.list().is_empty());
    assert!(registry.is_empty());
    assert!(registry.changed_rolenames().is_empty());
    assert!(registry.partially_written_rolenames().is_empty());
}
