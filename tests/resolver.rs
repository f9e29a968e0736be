//! Integration tests for entry-point tier priority.
//!
//! Each tier is exercised against real directories so the priority order
//! (explicit > framework config > manifest > conventional path > heuristic
//! scan) is verified end to end, not per helper.

use std::fs;
use std::path::Path;

use runbox::resolve::{EntrySource, resolve};
use tempfile::TempDir;

fn write(root: &Path, rel: &str, content: &str) {
    let path = root.join(rel);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("failed to create parent dirs");
    }
    fs::write(path, content).expect("failed to write fixture file");
}

/// A workspace containing only `main.py` resolves via the conventional-path
/// tier, not the heuristic scan.
#[test]
fn test_lone_main_py_is_conventional_not_heuristic() {
    let dir = TempDir::new().expect("temp dir");
    // Content deliberately contains a heuristic marker; conventional-path
    // must still win because it runs first.
    write(
        dir.path(),
        "main.py",
        "if __name__ == \"__main__\":\n    print('x')\n",
    );

    let found = resolve(dir.path(), None).expect("resolve");
    assert_eq!(found.source, EntrySource::ConventionalPath);
    assert_eq!(found.path, dir.path().join("main.py"));
}

/// A framework config with its conventional entry file outranks a manifest
/// start script pointing elsewhere (tier 2 beats tier 3).
#[test]
fn test_framework_config_outranks_manifest_script() {
    let dir = TempDir::new().expect("temp dir");
    write(dir.path(), "vite.config.js", "export default {}");
    write(dir.path(), "src/main.js", "console.log('vite entry')");
    write(
        dir.path(),
        "package.json",
        r#"{"scripts": {"start": "node server.js"}}"#,
    );
    write(dir.path(), "server.js", "console.log('server')");

    let found = resolve(dir.path(), None).expect("resolve");
    assert_eq!(found.source, EntrySource::FrameworkConfig);
    assert_eq!(found.path, dir.path().join("src/main.js"));
}

/// An explicit entry point outranks every detection tier.
#[test]
fn test_explicit_outranks_framework_config() {
    let dir = TempDir::new().expect("temp dir");
    write(dir.path(), "vite.config.js", "export default {}");
    write(dir.path(), "src/main.js", "console.log('vite entry')");
    write(dir.path(), "tool.py", "print('tool')");

    let found = resolve(dir.path(), Some("tool.py")).expect("resolve");
    assert_eq!(found.source, EntrySource::Explicit);
    assert_eq!(found.path, dir.path().join("tool.py"));
}

/// A `package.json` with only a start script (no framework signature pair)
/// resolves through the manifest tier.
#[test]
fn test_manifest_script_when_no_framework_pair() {
    let dir = TempDir::new().expect("temp dir");
    write(
        dir.path(),
        "package.json",
        r#"{"scripts": {"start": "node server.js"}}"#,
    );
    write(dir.path(), "server.js", "throw new Error('boom')");

    let found = resolve(dir.path(), None).expect("resolve");
    assert_eq!(found.source, EntrySource::PackageManifest);
    assert_eq!(found.path, dir.path().join("server.js"));
}

/// The heuristic scan only fires when every earlier tier came up empty.
#[test]
fn test_heuristic_is_last_resort() {
    let dir = TempDir::new().expect("temp dir");
    write(dir.path(), "tool.py", "def main():\n    pass\n");
    write(dir.path(), "notes.txt", "no markers here");

    let found = resolve(dir.path(), None).expect("resolve");
    assert_eq!(found.source, EntrySource::HeuristicScan);
    assert_eq!(found.path, dir.path().join("tool.py"));
}
