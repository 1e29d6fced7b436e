//! Ensures every workspace crate inherits the workspace version and edition.

use std::path::{Path, PathBuf};

const CRATES: [&str; 3] = [
    "crates/campaign-core",
    "crates/campaign-adapters",
    "crates/campaign-cli",
];

fn workspace_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .ancestors()
        .nth(2)
        .unwrap()
        .to_path_buf()
}

fn manifest(path: &Path) -> toml::Value {
    let text = std::fs::read_to_string(path.join("Cargo.toml")).unwrap();
    text.parse().unwrap()
}

fn inherits(package: &toml::Value, key: &str) -> bool {
    package
        .get(key)
        .and_then(|v| v.get("workspace"))
        .and_then(|v| v.as_bool())
        == Some(true)
}

#[test]
fn all_crates_inherit_workspace_package_fields() {
    let root = workspace_root();
    for krate in CRATES {
        let doc = manifest(&root.join(krate));
        let package = &doc["package"];
        for key in ["version", "edition", "license"] {
            assert!(
                inherits(package, key),
                "{krate} should use {key}.workspace = true"
            );
        }
    }
}

#[test]
fn workspace_members_match_crate_list() {
    let doc = manifest(&workspace_root());
    let members: Vec<&str> = doc["workspace"]["members"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|m| m.as_str())
        .collect();
    assert_eq!(members, CRATES);
}

#[test]
fn workspace_version_matches_cargo_pkg() {
    let doc = manifest(&workspace_root());
    let ws_version = doc["workspace"]["package"]["version"].as_str().unwrap();
    assert_eq!(ws_version, env!("CARGO_PKG_VERSION"));
}
