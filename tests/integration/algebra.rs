//! Diff, patch and revert between trees.

use proptest::prelude::*;
use std::collections::BTreeMap;
use std::sync::Arc;
use strata::tree::{Node, NodeExt, TreeAlgebra, VolatileNode};

type Entries = BTreeMap<Vec<String>, String>;

fn path_strategy() -> impl Strategy<Value = Vec<String>> {
    prop::collection::vec(prop_oneof!["[a-c]", "[0-2]"], 1..4)
}

fn entries_strategy() -> impl Strategy<Value = Entries> {
    prop::collection::btree_map(path_strategy(), "[xyz]{0,2}", 0..12)
}

fn tree(entries: &Entries) -> Arc<VolatileNode> {
    let root = VolatileNode::new();
    for (path, value) in entries {
        let segments: Vec<&str> = path.iter().map(String::as_str).collect();
        root.set(value, &segments).unwrap();
    }
    root
}

/// Apply an undo record: defined values are restored, vacant placeholders
/// delete what the patch introduced.
fn revert(target: &dyn Node, record: &dyn Node, path: &mut Vec<String>) {
    for key in record.keys() {
        let Some(entry) = record.get_child(&key) else {
            continue;
        };
        path.push(key);
        let segments: Vec<&str> = path.iter().map(String::as_str).collect();
        match entry.value() {
            Some(value) => target.set(value, &segments).unwrap(),
            None if entry.len() == 0 => target.set_undefined(&segments).unwrap(),
            None => {
                revert(target, entry.as_ref(), path);
                let segments: Vec<&str> = path.iter().map(String::as_str).collect();
                if let Some(node) = target.child(&segments) {
                    if !node.data() && node.is_empty() {
                        target.clear(&segments).unwrap();
                    }
                }
            }
        }
        path.pop();
    }
}

#[test]
fn diff_then_patch_turns_a_into_b() {
    let a = tree(&BTreeMap::from([
        (vec!["x".to_string()], "1".to_string()),
        (vec!["y".to_string()], "2".to_string()),
    ]));
    let b = tree(&BTreeMap::from([
        (vec!["x".to_string()], "1".to_string()),
        (vec!["z".to_string()], "3".to_string()),
    ]));

    let only_a = a.deep_copy();
    only_a.unique_nodes(b.as_ref()).unwrap();
    assert_eq!(only_a.keys(), vec!["y"]);

    let forward = b.deep_copy();
    forward.unique_values(a.as_ref()).unwrap();
    assert_eq!(forward.keys(), vec!["z"]);

    a.unique_nodes(only_a.as_ref()).unwrap();
    a.merge(forward.as_ref()).unwrap();
    assert!(a.equals_recursive(b.as_ref()));
}

#[test]
fn deep_copy_is_detached() {
    let a = tree(&BTreeMap::from([(vec!["k".to_string()], "v".to_string())]));
    let copy = a.deep_copy();
    copy.set("changed", &["k"]).unwrap();
    assert_eq!(a.get(&["k"]), Some("v".to_string()));
    assert!(copy.parent().is_none());
}

proptest! {
    #[test]
    fn patch_reproduces_target(a in entries_strategy(), b in entries_strategy()) {
        let a = tree(&a);
        let b = tree(&b);

        let only_a = a.deep_copy();
        only_a.unique_nodes(b.as_ref()).unwrap();
        let forward = b.deep_copy();
        forward.unique_values(a.as_ref()).unwrap();

        a.unique_nodes(only_a.as_ref()).unwrap();
        a.merge(forward.as_ref()).unwrap();
        prop_assert!(a.equals_recursive(b.as_ref()));
    }
}

#[test]
fn merge_then_revert_restores_target() {
    let target = tree(&BTreeMap::from([
        (vec!["pump".to_string(), "rate".to_string()], "10".to_string()),
        (vec!["pump".to_string(), "mode".to_string()], "auto".to_string()),
        (vec!["valve".to_string()], "open".to_string()),
    ]));
    let before = target.deep_copy();
    let patch = tree(&BTreeMap::from([
        (vec!["pump".to_string(), "rate".to_string()], "25".to_string()),
        (vec!["pump".to_string(), "mode".to_string()], "auto".to_string()),
        (vec!["pump".to_string(), "limit".to_string()], "40".to_string()),
        (vec!["sensor".to_string(), "id".to_string()], "7".to_string()),
    ]));

    let record = patch.deep_copy();
    record.changes(target.as_ref()).unwrap();
    assert_eq!(record.get(&["pump", "rate"]), Some("10".to_string()));
    assert!(record.child(&["pump", "mode"]).is_none());

    target.merge(patch.as_ref()).unwrap();
    assert_eq!(target.get(&["pump", "rate"]), Some("25".to_string()));
    assert_eq!(target.get(&["sensor", "id"]), Some("7".to_string()));

    revert(target.as_ref(), record.as_ref(), &mut Vec::new());
    assert!(target.equals_recursive(before.as_ref()));
}

#[test]
fn merge_under_keeps_local_values() {
    let local = tree(&BTreeMap::from([(vec!["rate".to_string()], "local".to_string())]));
    let base = tree(&BTreeMap::from([
        (vec!["rate".to_string()], "base".to_string()),
        (vec!["mode".to_string()], "auto".to_string()),
    ]));
    local.merge_under(base.as_ref()).unwrap();
    assert_eq!(local.get(&["rate"]), Some("local".to_string()));
    assert_eq!(local.get(&["mode"]), Some("auto".to_string()));
}
