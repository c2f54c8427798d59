//! Directory listing, reload and moves against files changed underneath.

use std::fs;
use std::path::Path;
use std::sync::Arc;
use strata::store::{Directory, DirectoryOptions};
use strata::tree::{Node, NodeExt};
use tempfile::TempDir;

fn write_doc(dir: &Path, name: &str, body: &str) {
    fs::create_dir_all(dir).unwrap();
    fs::write(dir.join(name), format!("STRATA.schema=2\n{}", body)).unwrap();
}

#[test]
fn reload_keeps_identity_and_rereads_content() {
    let tmp = TempDir::new().unwrap();
    write_doc(tmp.path(), "amp", "gain: 1\n");
    write_doc(tmp.path(), "cab", "size: 1\n");
    let models = Directory::new(tmp.path());
    let amp = models.document("amp").unwrap();
    let cab = models.document("cab").unwrap();
    assert_eq!(amp.get(&["gain"]), Some("1".to_string()));
    assert_eq!(cab.get(&["size"]), Some("1".to_string()));

    amp.set("5", &["gain"]).unwrap();
    assert!(amp.is_changed());
    write_doc(tmp.path(), "cab", "size: 2\n");

    let summary = models.save();
    assert_eq!(summary.failed, 0);
    assert!(fs::read_to_string(tmp.path().join("amp")).unwrap().contains("gain: 5"));
    write_doc(tmp.path(), "amp", "gain: 7\nbias: 3\n");
    models.reload();

    let again = models.document("amp").unwrap();
    assert!(Arc::ptr_eq(&amp, &again));
    assert!(!amp.is_changed());
    assert_eq!(amp.get(&["gain"]), Some("7".to_string()));
    assert_eq!(amp.get(&["bias"]), Some("3".to_string()));
    assert_eq!(models.pending_writes(), 0);

    let cab_again = models.document("cab").unwrap();
    assert!(Arc::ptr_eq(&cab, &cab_again));
    assert!(!cab.is_changed());
    assert_eq!(cab.get(&["size"]), Some("2".to_string()));
}

#[test]
fn reload_drops_vanished_and_lists_new_files() {
    let tmp = TempDir::new().unwrap();
    write_doc(tmp.path(), "old", "x: 1\n");
    let models = Directory::new(tmp.path());
    assert_eq!(models.keys(), vec!["old"]);

    fs::remove_file(tmp.path().join("old")).unwrap();
    write_doc(tmp.path(), "new", "x: 2\n");
    models.reload();

    assert_eq!(models.keys(), vec!["new"]);
    assert!(models.document("old").is_none());
    assert_eq!(models.get(&["new", "x"]), Some("2".to_string()));
}

#[test]
fn reload_keeps_unsaved_new_document() {
    let tmp = TempDir::new().unwrap();
    let models = Directory::new(tmp.path().join("models"));
    models.set("draft", &["sketch", "state"]).unwrap();

    models.reload();
    assert!(models.has_child("sketch"));
    assert_eq!(models.get(&["sketch", "state"]), Some("draft".to_string()));

    models.save();
    assert!(tmp.path().join("models").join("sketch").is_file());
}

#[test]
fn collated_listing_puts_numbers_first() {
    let tmp = TempDir::new().unwrap();
    for name in ["b", "10", "a", "9"] {
        write_doc(tmp.path(), name, "x: 1\n");
    }
    let models = Directory::new(tmp.path());
    assert_eq!(models.keys(), vec!["9", "10", "a", "b"]);
}

#[test]
fn suffix_documents_live_in_folders() {
    let tmp = TempDir::new().unwrap();
    write_doc(&tmp.path().join("run1"), "job", "status: done\n");
    fs::create_dir(tmp.path().join("stray")).unwrap();

    let jobs = Directory::with_options(tmp.path(), DirectoryOptions::default().key("jobs").suffix("job"));
    assert_eq!(jobs.key(), "jobs");
    assert_eq!(jobs.suffix(), Some("job"));
    assert_eq!(jobs.keys(), vec!["run1"]);
    assert_eq!(jobs.file_for("run2"), tmp.path().join("run2").join("job"));

    jobs.move_child("run1", "archived").unwrap();
    assert!(tmp.path().join("archived").join("job").is_file());
    assert_eq!(jobs.get(&["archived", "status"]), Some("done".to_string()));
}

#[test]
fn take_between_suffix_directories_moves_folder() {
    let tmp = TempDir::new().unwrap();
    let active = Directory::with_options(tmp.path().join("active"), DirectoryOptions::default().suffix("job"));
    let done = Directory::with_options(tmp.path().join("done"), DirectoryOptions::default().suffix("job"));
    active.set("running", &["run7", "status"]).unwrap();
    fs::create_dir_all(tmp.path().join("active").join("run7")).unwrap();
    fs::write(tmp.path().join("active").join("run7").join("log.txt"), "output").unwrap();

    let moved = done.take(&active, "run7").unwrap();
    assert_eq!(moved.get(&["status"]), Some("running".to_string()));
    assert!(!active.has_child("run7"));
    assert!(tmp.path().join("done").join("run7").join("job").is_file());
    assert!(tmp.path().join("done").join("run7").join("log.txt").is_file());
}

#[test]
fn take_of_missing_document_is_not_found() {
    let tmp = TempDir::new().unwrap();
    let a = Directory::new(tmp.path().join("a"));
    let b = Directory::new(tmp.path().join("b"));
    assert!(b.take(&a, "ghost").is_err());
}

#[test]
fn released_cache_reloads_clean_documents_from_disk() {
    let tmp = TempDir::new().unwrap();
    write_doc(tmp.path(), "amp", "gain: 1\n");
    let models = Directory::with_options(tmp.path(), DirectoryOptions::default().cache_capacity(1));
    assert_eq!(models.get(&["amp", "gain"]), Some("1".to_string()));

    models.release_cache();
    write_doc(tmp.path(), "amp", "gain: 3\n");
    assert_eq!(models.get(&["amp", "gain"]), Some("3".to_string()));
}
