//! A writable local directory stacked over a read-only base directory.

use std::fs;
use std::path::Path;
use std::sync::Arc;
use strata::store::{Directory, DirectoryOptions};
use strata::tree::{ChangeEvent, EventRecorder, Node, NodeExt, NodeRef};
use strata::views::ComboView;
use tempfile::TempDir;

struct Stack {
    _tmp: TempDir,
    local: Arc<Directory>,
    base: Arc<Directory>,
    view: Arc<ComboView>,
}

fn write_doc(dir: &Path, name: &str, body: &str) {
    fs::create_dir_all(dir).unwrap();
    fs::write(dir.join(name), format!("STRATA.schema=2\n{}", body)).unwrap();
}

fn stack() -> Stack {
    let tmp = TempDir::new().unwrap();
    let local_root = tmp.path().join("local");
    let base_root = tmp.path().join("base");
    write_doc(&base_root, "pump", "rate: 10\nmode: auto\n");
    write_doc(&base_root, "valve", "state: open\n");
    write_doc(&local_root, "valve", "state: closed\n");

    let local = Directory::new(&local_root);
    let base = Directory::with_options(&base_root, DirectoryOptions::default().read_only());
    let view = ComboView::new("models", vec![local.clone() as NodeRef, base.clone() as NodeRef]);
    Stack {
        _tmp: tmp,
        local,
        base,
        view,
    }
}

#[test]
fn higher_member_hides_lower_copy() {
    let s = stack();
    assert_eq!(s.view.keys(), vec!["pump", "valve"]);
    assert_eq!(s.view.get(&["valve", "state"]), Some("closed".to_string()));
    assert_eq!(s.view.get(&["pump", "rate"]), Some("10".to_string()));
    assert!(s.view.is_hidden("valve", s.base.as_ref()));

    let supplier = s.view.container_for("pump").unwrap();
    assert_eq!(supplier.key(), "base");
    let primary = s.view.primary().unwrap();
    assert_eq!(primary.key(), "local");
}

#[test]
fn writing_read_only_entry_copies_it_into_primary() {
    let s = stack();
    let recorder = EventRecorder::new();
    s.view.add_listener(recorder.clone());

    s.view.set("25", &["pump", "rate"]).unwrap();

    assert_eq!(s.view.get(&["pump", "rate"]), Some("25".to_string()));
    assert_eq!(s.view.get(&["pump", "mode"]), Some("auto".to_string()));
    assert_eq!(s.base.get(&["pump", "rate"]), Some("10".to_string()));
    assert_eq!(s.view.container_for("pump").unwrap().key(), "local");
    assert!(recorder.take().contains(&ChangeEvent::ChildChanged {
        old_key: "pump".into(),
        new_key: "pump".into()
    }));

    s.local.save();
    let text = fs::read_to_string(s.local.file_for("pump")).unwrap();
    assert!(text.contains("rate: 25\n"));
    assert!(text.contains("mode: auto\n"));
}

#[test]
fn removing_override_reveals_base_copy() {
    let s = stack();
    let recorder = EventRecorder::new();
    s.view.add_listener(recorder.clone());

    s.view.clear(&["valve"]).unwrap();
    assert_eq!(s.view.get(&["valve", "state"]), Some("open".to_string()));
    assert!(!s.local.has_child("valve"));
    assert_eq!(
        recorder.take(),
        vec![ChangeEvent::ChildChanged {
            old_key: "valve".into(),
            new_key: "valve".into()
        }]
    );

    // Only the base copy is left, and it cannot be removed.
    s.view.clear(&["valve"]).unwrap();
    assert!(s.view.has_child("valve"));
}

#[test]
fn read_only_members_reject_structure_changes() {
    let s = stack();
    assert!(s.view.move_child("pump", "pump2").is_err());
    assert!(s.view.move_child("ghost", "x").is_err());

    let base_only = ComboView::new("refs", vec![s.base.clone() as NodeRef]);
    assert!(!base_only.is_writable());
    assert!(base_only.set("x", &["new", "field"]).is_err());
    assert!(base_only.primary().is_none());
}

#[test]
fn handles_into_read_only_member_stay_read_only() {
    let s = stack();
    let pump = s.view.child(&["pump"]).unwrap();
    assert!(!pump.is_writable());
    assert!(pump.set("99", &["rate"]).is_err());
    assert!(pump.child(&["rate"]).unwrap().set_value(Some("99")).is_err());
    assert!(pump.clear(&["mode"]).is_err());
    assert_eq!(s.base.get(&["pump", "rate"]), Some("10".to_string()));
    assert_eq!(s.base.pending_writes(), 0);
    assert!(!s.local.has_child("pump"));

    // Writing through the view still copies into the primary.
    s.view.set("99", &["pump", "rate"]).unwrap();
    assert_eq!(s.local.get(&["pump", "rate"]), Some("99".to_string()));
    assert_eq!(s.base.get(&["pump", "rate"]), Some("10".to_string()));
}

#[test]
fn new_entries_land_in_primary() {
    let s = stack();
    let recorder = EventRecorder::new();
    s.view.add_listener(recorder.clone());

    s.view.set("1", &["sensor", "id"]).unwrap();
    assert!(s.local.has_child("sensor"));
    assert!(!s.base.has_child("sensor"));
    assert_eq!(recorder.take(), vec![ChangeEvent::ChildAdded("sensor".into())]);
}

#[test]
fn set_members_swaps_stack_in_place() {
    let s = stack();
    let recorder = EventRecorder::new();
    s.view.add_listener(recorder.clone());

    s.view.set_members(vec![(s.base.clone() as NodeRef, false)]);
    assert_eq!(s.view.get(&["valve", "state"]), Some("open".to_string()));
    assert_eq!(s.view.members().len(), 1);
    assert_eq!(recorder.take(), vec![ChangeEvent::Changed]);
}
