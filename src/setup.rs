//! Best-effort project setup before execution.
//!
//! A static table maps package-ecosystem signature files to install and
//! build commands. Signatures are searched recursively under the workspace;
//! each command string runs at most once per directory for the whole
//! preparation pass, deduplicating entries that share a package manager.
//!
//! Setup is approximate and non-transactional: a failed install step is
//! logged and skipped, never aborts the run, and partial installs are not
//! rolled back — the code may not need the dependency at all.

use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use tracing::{debug, instrument, warn};
use walkdir::WalkDir;

use crate::exec::SandboxExecutor;

/// Default wall-clock bound for a single setup command.
pub const DEFAULT_SETUP_TIMEOUT: Duration = Duration::from_secs(300);

/// Output cap for setup commands (install logs can be chatty).
const SETUP_MAX_OUTPUT_BYTES: usize = 1024 * 1024;

/// How deep the recursive signature search goes.
const SIGNATURE_SEARCH_DEPTH: usize = 4;

/// One package ecosystem: its signature file and setup commands.
struct EcosystemSetup {
    signature: &'static str,
    install: &'static [&'static str],
    build: &'static [&'static str],
}

/// The ecosystem table, in the order entries are considered.
const ECOSYSTEMS: &[EcosystemSetup] = &[
    EcosystemSetup {
        signature: "package-lock.json",
        install: &["npm ci"],
        build: &[],
    },
    EcosystemSetup {
        signature: "yarn.lock",
        install: &["yarn install"],
        build: &[],
    },
    EcosystemSetup {
        signature: "pnpm-lock.yaml",
        install: &["pnpm install"],
        build: &[],
    },
    EcosystemSetup {
        signature: "package.json",
        install: &["npm install"],
        build: &[],
    },
    EcosystemSetup {
        signature: "requirements.txt",
        install: &["python3 -m pip install -r requirements.txt"],
        build: &[],
    },
    EcosystemSetup {
        signature: "Gemfile",
        install: &["bundle install"],
        build: &[],
    },
    EcosystemSetup {
        signature: "go.mod",
        install: &["go mod download"],
        build: &[],
    },
    EcosystemSetup {
        signature: "Cargo.toml",
        install: &[],
        build: &["cargo build"],
    },
    EcosystemSetup {
        signature: "pom.xml",
        install: &[],
        build: &["mvn -q -DskipTests package"],
    },
    EcosystemSetup {
        signature: "build.gradle",
        install: &[],
        build: &["gradle build -x test"],
    },
];

/// Conventional subdirectories checked independently of the root,
/// non-recursively (a front-end often lives beside the main project).
const CONVENTIONAL_SUBDIRS: &[&str] = &["frontend", "client", "web"];

/// Directory names skipped during the recursive signature search. These
/// hold vendored or generated manifests, not the project's own.
const SKIPPED_DIRS: &[&str] = &["node_modules", "target", "vendor", "dist", "build"];

/// Runs install/build steps for every ecosystem detected in a workspace.
#[derive(Debug, Clone)]
pub struct SetupOrchestrator {
    executor: SandboxExecutor,
}

impl Default for SetupOrchestrator {
    fn default() -> Self {
        Self::new(DEFAULT_SETUP_TIMEOUT)
    }
}

impl SetupOrchestrator {
    /// Creates an orchestrator whose setup commands run under `timeout`.
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        Self {
            executor: SandboxExecutor::new(timeout, SETUP_MAX_OUTPUT_BYTES),
        }
    }

    /// Detects manifests and runs their setup commands, best-effort.
    ///
    /// Install commands run before build commands. Individual failures are
    /// logged at warn level and skipped; this method never fails the
    /// overall execution.
    #[instrument(skip(self), fields(root = %root.display()))]
    pub fn prepare(&self, root: &Path) {
        let plan = plan_commands(root);
        if plan.is_empty() {
            debug!("No setup signatures detected");
            return;
        }

        for step in &plan {
            debug!(dir = %step.dir.display(), command = %step.command, "Running setup command");
            match self
                .executor
                .run(&step.command, &step.dir, &std::collections::HashMap::new())
            {
                Ok(output) if output.status.success() => {
                    debug!(command = %step.command, "Setup command succeeded");
                }
                Ok(output) => {
                    warn!(
                        command = %step.command,
                        status = ?output.status,
                        stderr = %output.stderr.lines().last().unwrap_or(""),
                        "Setup command failed, continuing anyway"
                    );
                }
                Err(e) => {
                    warn!(command = %step.command, error = %e, "Setup command could not run");
                }
            }
        }
    }
}

/// A single planned setup invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SetupStep {
    pub dir: std::path::PathBuf,
    pub command: String,
}

/// Computes the deduplicated setup plan for a workspace.
///
/// Signatures are searched recursively under the root (skipping hidden and
/// vendored directories); commands run at the workspace root. Conventional
/// front-end subdirectories are then checked non-recursively and get their
/// own command set, run inside the subdirectory.
pub(crate) fn plan_commands(root: &Path) -> Vec<SetupStep> {
    let mut steps = Vec::new();
    let mut seen = HashSet::new();

    let found = find_signatures(root);
    push_ecosystem_steps(root, &found, &mut steps, &mut seen);

    for sub in CONVENTIONAL_SUBDIRS {
        let dir = root.join(sub);
        if !dir.is_dir() {
            continue;
        }
        let found: HashSet<&'static str> = ECOSYSTEMS
            .iter()
            .map(|e| e.signature)
            .filter(|sig| dir.join(sig).is_file())
            .collect();
        push_ecosystem_steps(&dir, &found, &mut steps, &mut seen);
    }

    steps
}

/// Appends install-then-build steps for every detected ecosystem, deduped
/// by (directory, command string).
fn push_ecosystem_steps(
    dir: &Path,
    found: &HashSet<&'static str>,
    steps: &mut Vec<SetupStep>,
    seen: &mut HashSet<(std::path::PathBuf, String)>,
) {
    let mut installs = Vec::new();
    let mut builds = Vec::new();
    for eco in ECOSYSTEMS {
        if !found.contains(eco.signature) {
            continue;
        }
        installs.extend_from_slice(eco.install);
        builds.extend_from_slice(eco.build);
    }

    for command in installs.into_iter().chain(builds) {
        let key = (dir.to_path_buf(), command.to_string());
        if seen.insert(key) {
            steps.push(SetupStep {
                dir: dir.to_path_buf(),
                command: command.to_string(),
            });
        }
    }
}

/// Recursively collects which signature files exist under the root.
fn find_signatures(root: &Path) -> HashSet<&'static str> {
    let mut found = HashSet::new();
    let walker = WalkDir::new(root)
        .max_depth(SIGNATURE_SEARCH_DEPTH)
        .follow_links(false)
        .into_iter()
        .filter_entry(|e| {
            let name = e.file_name().to_string_lossy();
            !(name.starts_with('.') && e.depth() > 0) && !SKIPPED_DIRS.contains(&name.as_ref())
        });

    for entry in walker.filter_map(std::result::Result::ok) {
        if !entry.file_type().is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy();
        if let Some(eco) = ECOSYSTEMS.iter().find(|e| e.signature == name.as_ref()) {
            found.insert(eco.signature);
        }
    }
    found
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn commands_at<'a>(plan: &'a [SetupStep], dir: &Path) -> Vec<&'a str> {
        plan.iter()
            .filter(|s| s.dir == dir)
            .map(|s| s.command.as_str())
            .collect()
    }

    #[test]
    fn test_plan_detects_node_project() {
        let dir = TempDir::new().expect("temp dir");
        fs::write(dir.path().join("package.json"), "{}").expect("write");

        let plan = plan_commands(dir.path());
        assert_eq!(commands_at(&plan, dir.path()), vec!["npm install"]);
    }

    #[test]
    fn test_lockfile_and_manifest_both_planned_once() {
        let dir = TempDir::new().expect("temp dir");
        fs::write(dir.path().join("package.json"), "{}").expect("write");
        fs::write(dir.path().join("package-lock.json"), "{}").expect("write");

        let plan = plan_commands(dir.path());
        let cmds = commands_at(&plan, dir.path());
        // Lockfile entry precedes the bare-manifest entry in the table.
        assert_eq!(cmds, vec!["npm ci", "npm install"]);
    }

    #[test]
    fn test_nested_signature_deduplicates_command() {
        let dir = TempDir::new().expect("temp dir");
        fs::write(dir.path().join("requirements.txt"), "requests\n").expect("write");
        fs::create_dir(dir.path().join("service")).expect("mkdir");
        fs::write(dir.path().join("service/requirements.txt"), "flask\n").expect("write");

        let plan = plan_commands(dir.path());
        let pip: Vec<_> = plan
            .iter()
            .filter(|s| s.command.contains("pip install"))
            .collect();
        assert_eq!(pip.len(), 1, "pip install must run once per pass");
    }

    #[test]
    fn test_install_commands_precede_builds() {
        let dir = TempDir::new().expect("temp dir");
        fs::write(dir.path().join("package.json"), "{}").expect("write");
        fs::write(dir.path().join("Cargo.toml"), "[package]").expect("write");

        let plan = plan_commands(dir.path());
        let cmds = commands_at(&plan, dir.path());
        assert_eq!(cmds, vec!["npm install", "cargo build"]);
    }

    #[test]
    fn test_vendored_directories_are_ignored() {
        let dir = TempDir::new().expect("temp dir");
        fs::create_dir_all(dir.path().join("node_modules/dep")).expect("mkdir");
        fs::write(dir.path().join("node_modules/dep/package.json"), "{}").expect("write");

        assert!(plan_commands(dir.path()).is_empty());
    }

    #[test]
    fn test_frontend_subdir_gets_its_own_steps() {
        let dir = TempDir::new().expect("temp dir");
        fs::write(dir.path().join("requirements.txt"), "flask\n").expect("write");
        fs::create_dir(dir.path().join("frontend")).expect("mkdir");
        fs::write(dir.path().join("frontend/package.json"), "{}").expect("write");

        let plan = plan_commands(dir.path());
        assert!(
            commands_at(&plan, dir.path())
                .iter()
                .any(|c| c.contains("pip install"))
        );
        assert_eq!(
            commands_at(&plan, &dir.path().join("frontend")),
            vec!["npm install"]
        );
    }

    #[test]
    fn test_empty_workspace_plans_nothing() {
        let dir = TempDir::new().expect("temp dir");
        assert!(plan_commands(dir.path()).is_empty());
    }

    #[test]
    fn test_prepare_swallows_failures() {
        let dir = TempDir::new().expect("temp dir");
        // `go mod download` without a go toolchain (or with a bogus module)
        // must not panic or error.
        fs::write(dir.path().join("go.mod"), "module example.com/x\n").expect("write");

        let orchestrator = SetupOrchestrator::new(Duration::from_secs(5));
        orchestrator.prepare(dir.path());
    }
}
