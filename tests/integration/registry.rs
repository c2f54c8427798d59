//! Store assembled from a configuration file in the data directory.

use std::fs;
use std::path::Path;
use strata::config::{ConfigLoader, RepositoryConfig};
use strata::tree::{Node, NodeExt};
use strata::Registry;
use tempfile::TempDir;

const STORE_TOML: &str = r#"
autosave_interval_ms = 0
categories = ["models", "references"]

[[repositories]]
name = "site"
editable = true
visible = true

[[repositories]]
name = "vendor"
editable = false
visible = true
"#;

fn seed(root: &Path, relative: &str, body: &str) {
    let path = root.join(relative);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, format!("STRATA.schema=2\n{}", body)).unwrap();
}

fn open(root: &Path) -> std::sync::Arc<Registry> {
    fs::write(root.join("strata.toml"), STORE_TOML).unwrap();
    let config = ConfigLoader::load(Some(root)).unwrap();
    Registry::init(config).unwrap()
}

#[test]
fn configured_repositories_form_category_views() {
    let tmp = TempDir::new().unwrap();
    seed(tmp.path(), "repos/vendor/models/pump", "rate: 10\n");
    seed(tmp.path(), "repos/vendor/references/steel", "density: 7850\n");
    seed(tmp.path(), "repos/site/models/valve", "state: open\n");
    let registry = open(tmp.path());

    assert_eq!(registry.categories(), vec!["models", "references"]);
    let names: Vec<String> = registry.repositories().into_iter().map(|r| r.name).collect();
    assert_eq!(names, vec!["site", "vendor"]);

    let models = registry.category("models").unwrap();
    assert_eq!(models.keys(), vec!["pump", "valve"]);
    assert_eq!(models.container_for("pump").unwrap().key(), "vendor");
    assert_eq!(
        registry.category("references").unwrap().get(&["steel", "density"]),
        Some("7850".to_string())
    );
    assert!(!registry.repository("vendor", "models").unwrap().is_writable());
    registry.shutdown();
}

#[test]
fn shutdown_flushes_edits_to_editable_repository() {
    let tmp = TempDir::new().unwrap();
    seed(tmp.path(), "repos/vendor/models/pump", "rate: 10\n");
    let registry = open(tmp.path());

    let models = registry.category("models").unwrap();
    models.set("25", &["pump", "rate"]).unwrap();
    registry.jobs().set("queued", &["run1", "status"]).unwrap();
    registry.state().set("pump", &["last_opened"]).unwrap();

    let summary = registry.shutdown();
    assert_eq!(summary.failed, 0);
    assert!(summary.saved >= 3);

    let site = fs::read_to_string(tmp.path().join("repos/site/models/pump")).unwrap();
    assert!(site.contains("rate: 25\n"));
    let vendor = fs::read_to_string(tmp.path().join("repos/vendor/models/pump")).unwrap();
    assert!(vendor.contains("rate: 10\n"));
    assert!(tmp.path().join("jobs/run1/job").is_file());
    let state = fs::read_to_string(tmp.path().join("client/state")).unwrap();
    assert!(state.contains("last_opened: pump\n"));
}

#[test]
fn reopened_store_sees_saved_edits() {
    let tmp = TempDir::new().unwrap();
    {
        let registry = open(tmp.path());
        registry
            .category("references")
            .unwrap()
            .set("2700", &["aluminium", "density"])
            .unwrap();
        registry.shutdown();
    }

    let registry = open(tmp.path());
    let references = registry.category("references").unwrap();
    assert_eq!(references.get_int(0, &["aluminium", "density"]), 2700);
    assert_eq!(references.container_for("aluminium").unwrap().key(), "site");
    registry.shutdown();
}

#[test]
fn rebuild_reorders_precedence() {
    let tmp = TempDir::new().unwrap();
    seed(tmp.path(), "repos/site/models/pump", "rate: 25\n");
    seed(tmp.path(), "repos/vendor/models/pump", "rate: 10\n");
    let registry = open(tmp.path());
    let models = registry.category("models").unwrap();
    assert_eq!(models.get(&["pump", "rate"]), Some("25".to_string()));

    let mut site = RepositoryConfig::new("site", true);
    site.visible = false;
    registry
        .rebuild(vec![RepositoryConfig::new("vendor", false), site])
        .unwrap();
    assert_eq!(models.get(&["pump", "rate"]), Some("10".to_string()));
    assert!(!models.is_writable());
    registry.shutdown();
}
