//! Lazy loading, dirty tracking and saving of documents.

use std::fs;
use strata::store::{Directory, Document};
use strata::tree::{ChangeEvent, EventRecorder, Node, NodeExt};
use tempfile::TempDir;

#[test]
fn document_loads_on_first_access_only() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("amp");
    fs::write(&path, "STRATA.schema=2,model\nstage\n gain: 12\n").unwrap();

    let doc = Document::open(&path);
    assert!(!doc.is_loaded());
    assert_eq!(doc.path(), path);

    assert_eq!(doc.get_int(0, &["stage", "gain"]), 12);
    assert!(doc.is_loaded());
    assert_eq!(doc.doc_type().as_deref(), Some("model"));
}

#[test]
fn unchanged_document_is_not_rewritten() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("doc");
    let original = "STRATA.schema=2\nlegacy:value\n";
    fs::write(&path, original).unwrap();

    let doc = Document::open(&path);
    assert_eq!(doc.get(&["legacy"]), Some("value".to_string()));
    doc.save().unwrap();
    assert_eq!(fs::read_to_string(&path).unwrap(), original);
}

#[test]
fn edits_reach_disk_through_directory_save() {
    let tmp = TempDir::new().unwrap();
    let models = Directory::new(tmp.path().join("models"));
    models.set("10k", &["amp", "r1"]).unwrap();
    models.set("", &["amp", "note"]).unwrap();
    models.set("first\nsecond", &["amp", "text"]).unwrap();

    let summary = models.save();
    assert_eq!(summary.saved, 1);
    assert_eq!(summary.failed, 0);

    let reopened = Document::open(tmp.path().join("models").join("amp"));
    assert_eq!(reopened.get(&["r1"]), Some("10k".to_string()));
    assert_eq!(reopened.get(&["note"]), Some(String::new()));
    assert_eq!(reopened.get(&["text"]), Some("first\nsecond".to_string()));
}

#[test]
fn failed_save_is_retried_on_next_pass() {
    let tmp = TempDir::new().unwrap();
    let blocker = tmp.path().join("models");
    fs::write(&blocker, "occupied").unwrap();
    let models = Directory::new(&blocker);
    models.set("1", &["doc", "a"]).unwrap();

    let summary = models.save();
    assert_eq!(summary.failed, 1);
    assert_eq!(models.pending_writes(), 1);

    fs::remove_file(&blocker).unwrap();
    let summary = models.save();
    assert_eq!(summary.saved, 1);
    assert_eq!(models.pending_writes(), 0);
    assert!(blocker.join("doc").is_file());
}

#[test]
fn first_edit_queues_document_once() {
    let tmp = TempDir::new().unwrap();
    fs::create_dir(tmp.path().join("models")).unwrap();
    fs::write(tmp.path().join("models").join("amp"), "STRATA.schema=2\na: 1\n").unwrap();
    let models = Directory::new(tmp.path().join("models"));
    let recorder = EventRecorder::new();
    models.add_listener(recorder.clone());

    models.set("2", &["amp", "a"]).unwrap();
    models.set("3", &["amp", "b"]).unwrap();
    assert_eq!(models.pending_writes(), 1);
    assert_eq!(
        recorder.take(),
        vec![ChangeEvent::ChildChanged {
            old_key: "amp".into(),
            new_key: "amp".into()
        }]
    );
    assert!(models.is_changed());

    models.save();
    assert!(!models.is_changed());
}

#[test]
fn undefining_a_leaf_removes_it_on_disk() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("doc");
    fs::write(&path, "STRATA.schema=2\nkeep: 1\ngone: 2\n").unwrap();

    let doc = Document::open(&path);
    doc.set_undefined(&["gone"]).unwrap();
    assert!(doc.child(&["gone"]).is_none());
    doc.save().unwrap();
    assert_eq!(fs::read_to_string(&path).unwrap(), "STRATA.schema=2\nkeep: 1\n");
}

#[test]
fn clearing_last_child_drops_vacant_parent_on_disk() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("doc");
    fs::write(&path, "STRATA.schema=2\nkeep: 1\nn\n child: c\n").unwrap();

    let doc = Document::open(&path);
    doc.clear(&["n", "child"]).unwrap();
    assert_eq!(doc.keys(), vec!["keep"]);
    doc.save().unwrap();
    assert_eq!(fs::read_to_string(&path).unwrap(), "STRATA.schema=2\nkeep: 1\n");
}
