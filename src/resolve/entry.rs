//! Entry-point detection for populated workspaces.
//!
//! Resolution runs five tiers in strict priority order, stopping at the
//! first hit:
//!
//! 1. Explicit entry point from the request (no search at all).
//! 2. Framework-signature scan: a config file in the workspace root implies
//!    its ecosystem's conventional entry file.
//! 3. Manifest introspection: `package.json` fields and start/dev scripts.
//! 4. Conventional-path scan: per-language idiomatic main-file locations.
//! 5. Heuristic content scan: first non-hidden file containing a known
//!    entry marker, in sorted walk order.
//!
//! Tier 5 is inherently order-dependent and approximate. It is a
//! best-effort fallback, not a guarantee.

use std::fs;
use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{debug, instrument, trace};
use walkdir::WalkDir;

use crate::error::ResolveError;

/// How an entry point was found, recorded for diagnosability.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntrySource {
    /// Explicitly named in the request.
    Explicit,
    /// Implied by a framework/build config file.
    FrameworkConfig,
    /// Declared in a package manifest field or start script.
    PackageManifest,
    /// Found at a conventional per-language path.
    ConventionalPath,
    /// Matched an entry-marker substring during the content scan.
    HeuristicScan,
    /// Fell back to the main file originally written into the workspace.
    SuppliedMain,
}

impl std::fmt::Display for EntrySource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Explicit => write!(f, "explicit"),
            Self::FrameworkConfig => write!(f, "frameworkConfig"),
            Self::PackageManifest => write!(f, "packageManifest"),
            Self::ConventionalPath => write!(f, "conventionalPath"),
            Self::HeuristicScan => write!(f, "heuristicScan"),
            Self::SuppliedMain => write!(f, "suppliedMain"),
        }
    }
}

/// A resolved entry point with its provenance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedEntryPoint {
    /// Absolute path to the entry file inside the workspace.
    pub path: PathBuf,
    /// Which tier produced the match.
    pub source: EntrySource,
}

impl std::fmt::Display for ResolvedEntryPoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} (via {})", self.path.display(), self.source)
    }
}

/// A framework config file and the entry file its presence implies.
struct FrameworkSignature {
    signature: &'static str,
    entry: &'static str,
}

/// Tier 2 table. Order defines the tie-break; both files must exist.
const FRAMEWORK_SIGNATURES: &[FrameworkSignature] = &[
    FrameworkSignature { signature: "angular.json", entry: "src/main.ts" },
    FrameworkSignature { signature: "next.config.js", entry: "pages/index.js" },
    FrameworkSignature { signature: "next.config.mjs", entry: "pages/index.js" },
    FrameworkSignature { signature: "nuxt.config.js", entry: "app.vue" },
    FrameworkSignature { signature: "vite.config.ts", entry: "src/main.ts" },
    FrameworkSignature { signature: "vite.config.js", entry: "src/main.js" },
    FrameworkSignature { signature: "svelte.config.js", entry: "src/main.js" },
    FrameworkSignature { signature: "webpack.config.js", entry: "src/index.js" },
    FrameworkSignature { signature: "tsconfig.json", entry: "src/index.ts" },
    FrameworkSignature { signature: "Cargo.toml", entry: "src/main.rs" },
    FrameworkSignature { signature: "go.mod", entry: "main.go" },
    FrameworkSignature { signature: "pom.xml", entry: "src/main/java/Main.java" },
    FrameworkSignature { signature: "build.gradle", entry: "src/main/java/Main.java" },
    FrameworkSignature { signature: "pyproject.toml", entry: "main.py" },
    FrameworkSignature { signature: "Pipfile", entry: "main.py" },
    FrameworkSignature { signature: "requirements.txt", entry: "main.py" },
    FrameworkSignature { signature: "Gemfile", entry: "main.rb" },
    FrameworkSignature { signature: "composer.json", entry: "index.php" },
    FrameworkSignature { signature: "yarn.lock", entry: "index.js" },
    FrameworkSignature { signature: "package-lock.json", entry: "index.js" },
];

/// Manifest script keys checked, in order, during tier 3.
const MANIFEST_SCRIPT_KEYS: &[&str] = &["start", "dev", "serve"];

/// Tier 4 table: conventional per-language entry paths, in priority order.
const CONVENTIONAL_PATHS: &[&str] = &[
    "main.py",
    "app.py",
    "src/main.py",
    "src/app.py",
    "__main__.py",
    "run.py",
    "server.py",
    "index.js",
    "src/index.js",
    "main.js",
    "src/main.js",
    "app.js",
    "src/app.js",
    "server.js",
    "index.ts",
    "src/index.ts",
    "main.ts",
    "src/main.ts",
    "index.mjs",
    "src/index.mjs",
    "main.go",
    "cmd/main.go",
    "src/main.rs",
    "main.rs",
    "Main.java",
    "src/Main.java",
    "src/main/java/Main.java",
    "main.rb",
    "app.rb",
    "index.php",
    "main.php",
    "main.c",
    "src/main.c",
    "main.cpp",
    "src/main.cpp",
    "main.sh",
    "run.sh",
    "start.sh",
    "main.pl",
    "main.lua",
];

/// Tier 5 markers: substrings whose presence suggests a program entry.
const ENTRY_MARKERS: &[&str] = &[
    "if __name__ == \"__main__\"",
    "if __name__ == '__main__'",
    "def main(",
    "fn main(",
    "func main(",
    "public static void main",
    "int main(",
    "export default",
    "module.exports",
    "app.listen(",
    "createServer(",
];

/// Files larger than this are skipped by the heuristic content scan.
const HEURISTIC_MAX_FILE_BYTES: u64 = 1024 * 1024;

/// Determines the entry point for a populated workspace.
///
/// # Errors
///
/// Returns [`ResolveError::ExplicitNotFound`] if an explicit entry point
/// was given but does not exist, or [`ResolveError::NotFound`] if no tier
/// matched. The caller decides whether a fallback (the originally written
/// main file) applies.
#[instrument(skip(root), fields(root = %root.display()))]
pub fn resolve(root: &Path, explicit: Option<&str>) -> Result<ResolvedEntryPoint, ResolveError> {
    // Tier 1: explicit entry point short-circuits all searching.
    if let Some(name) = explicit {
        let path = root.join(name);
        if path.is_file() {
            debug!(entry = %path.display(), "Using explicit entry point");
            return Ok(ResolvedEntryPoint {
                path,
                source: EntrySource::Explicit,
            });
        }
        return Err(ResolveError::ExplicitNotFound {
            path: name.to_string(),
        });
    }

    if let Some(found) = scan_framework_signatures(root) {
        return Ok(found);
    }
    if let Some(found) = introspect_manifest(root) {
        return Ok(found);
    }
    if let Some(found) = scan_conventional_paths(root) {
        return Ok(found);
    }
    if let Some(found) = scan_heuristic(root) {
        return Ok(found);
    }

    Err(ResolveError::NotFound)
}

/// Tier 2: framework config files in the workspace root imply their
/// ecosystem's conventional entry file.
fn scan_framework_signatures(root: &Path) -> Option<ResolvedEntryPoint> {
    for sig in FRAMEWORK_SIGNATURES {
        if !root.join(sig.signature).is_file() {
            continue;
        }
        let entry = root.join(sig.entry);
        if entry.is_file() {
            debug!(signature = sig.signature, entry = sig.entry, "Framework signature matched");
            return Some(ResolvedEntryPoint {
                path: entry,
                source: EntrySource::FrameworkConfig,
            });
        }
        trace!(signature = sig.signature, "Signature present but implied entry missing");
    }
    None
}

/// Tier 3: `package.json` introspection.
///
/// Checks the `main` field first, then extracts a file token from
/// start/dev-style script values.
fn introspect_manifest(root: &Path) -> Option<ResolvedEntryPoint> {
    let manifest_path = root.join("package.json");
    let raw = fs::read_to_string(&manifest_path).ok()?;
    let manifest: Value = serde_json::from_str(&raw).ok()?;

    if let Some(main) = manifest.get("main").and_then(Value::as_str) {
        let path = root.join(main);
        if path.is_file() {
            debug!(main, "Manifest `main` field matched");
            return Some(ResolvedEntryPoint {
                path,
                source: EntrySource::PackageManifest,
            });
        }
    }

    let scripts = manifest.get("scripts")?;
    for key in MANIFEST_SCRIPT_KEYS {
        let Some(script) = scripts.get(*key).and_then(Value::as_str) else {
            continue;
        };
        if let Some(path) = extract_script_file(root, script) {
            debug!(key, script, "Manifest script matched");
            return Some(ResolvedEntryPoint {
                path,
                source: EntrySource::PackageManifest,
            });
        }
    }
    None
}

/// Pulls the first token out of a script value that names an existing file.
///
/// This is a simple string pattern match, not a shell parser: tokens are
/// whitespace-split, stripped of quotes, and must not look like a flag.
fn extract_script_file(root: &Path, script: &str) -> Option<PathBuf> {
    for token in script.split_whitespace() {
        let token = token.trim_matches(|c| c == '"' || c == '\'');
        if token.starts_with('-') || !token.contains('.') {
            continue;
        }
        let path = root.join(token);
        if path.is_file() {
            return Some(path);
        }
    }
    None
}

/// Tier 4: ordered conventional-path lookup.
fn scan_conventional_paths(root: &Path) -> Option<ResolvedEntryPoint> {
    for rel in CONVENTIONAL_PATHS {
        let path = root.join(rel);
        if path.is_file() {
            debug!(path = rel, "Conventional path matched");
            return Some(ResolvedEntryPoint {
                path,
                source: EntrySource::ConventionalPath,
            });
        }
    }
    None
}

/// Tier 5: best-effort content scan over all non-hidden files.
///
/// Walk order is made deterministic by sorting entries by file name. The
/// first file containing any entry marker wins.
fn scan_heuristic(root: &Path) -> Option<ResolvedEntryPoint> {
    let walker = WalkDir::new(root)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !is_hidden(e.file_name().to_string_lossy().as_ref()));

    for entry in walker.filter_map(std::result::Result::ok) {
        if !entry.file_type().is_file() {
            continue;
        }
        if entry.metadata().map(|m| m.len()).unwrap_or(u64::MAX) > HEURISTIC_MAX_FILE_BYTES {
            continue;
        }
        let Ok(bytes) = fs::read(entry.path()) else {
            continue;
        };
        let content = String::from_utf8_lossy(&bytes);
        if ENTRY_MARKERS.iter().any(|m| content.contains(m)) {
            debug!(path = %entry.path().display(), "Heuristic scan matched");
            return Some(ResolvedEntryPoint {
                path: entry.path().to_path_buf(),
                source: EntrySource::HeuristicScan,
            });
        }
    }
    None
}

fn is_hidden(name: &str) -> bool {
    name.starts_with('.') && name != "." && name != ".."
}
