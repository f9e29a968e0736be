//! Ephemeral workspace directories for single executions.
//!
//! A workspace is a uniquely named directory under a configured base
//! directory. It exists from [`WorkspaceStore::create`] until
//! [`WorkspaceStore::destroy`] and is never shared between concurrent
//! executions. The [`WorkspaceGuard`] ties destruction to scope exit so
//! cleanup runs on every path out of the pipeline, including panics.
//!
//! # Storage Layout
//!
//! ```text
//! {base_dir}/
//! └── {workspace-uuid}/    # one per in-flight execution, mode 0700
//! ```

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Component, Path, PathBuf};

use chrono::{DateTime, Utc};
use tracing::{debug, instrument, trace, warn};
use uuid::Uuid;
use walkdir::WalkDir;

use crate::error::{RequestError, WorkspaceError};

/// Directory permissions: owner read/write/execute only (0700).
const DIR_PERMISSIONS: u32 = 0o700;

/// Unique identifier for a workspace.
pub type WorkspaceId = Uuid;

/// An ephemeral execution workspace.
///
/// Owned exclusively by the [`WorkspaceStore`] that created it; no other
/// component should retain the root path after execution completes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Workspace {
    /// Unique workspace identifier.
    pub id: WorkspaceId,
    /// Absolute path to the workspace root directory.
    pub root: PathBuf,
    /// When the workspace was created.
    pub created_at: DateTime<Utc>,
}

impl Workspace {
    /// Resolves a workspace-relative name to an absolute path, rejecting
    /// anything that would escape the root.
    ///
    /// # Errors
    ///
    /// Returns [`RequestError::PathEscapes`] for absolute paths or paths
    /// containing `..` components.
    pub fn resolve_relative(&self, name: &str) -> Result<PathBuf, RequestError> {
        if !is_safe_relative(name) {
            return Err(RequestError::PathEscapes {
                name: name.to_string(),
            });
        }
        Ok(self.root.join(name))
    }
}

/// True if a name stays inside a workspace when joined to its root:
/// relative, with no `..` components.
#[must_use]
pub fn is_safe_relative(name: &str) -> bool {
    let rel = Path::new(name);
    !rel.is_absolute()
        && !rel
            .components()
            .any(|c| matches!(c, Component::ParentDir | Component::RootDir))
}

/// Allocates and destroys ephemeral workspace directories.
///
/// # Example
///
/// ```no_run
/// use runbox::workspace::WorkspaceStore;
///
/// let store = WorkspaceStore::new("/tmp/runbox");
/// let workspace = store.create().unwrap();
/// store.write_file(&workspace, "main.py", b"print('hi')").unwrap();
/// store.destroy(&workspace).unwrap();
/// ```
#[derive(Debug, Clone)]
pub struct WorkspaceStore {
    base_dir: PathBuf,
}

impl WorkspaceStore {
    /// Creates a store rooted at the given base directory.
    ///
    /// The base directory is created lazily on first [`create`](Self::create).
    #[must_use]
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    /// Returns the configured base directory.
    #[must_use]
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Allocates a fresh, empty, uniquely named workspace directory.
    ///
    /// IDs are random UUIDs, so concurrent calls never collide and no
    /// creation lock is needed.
    ///
    /// # Errors
    ///
    /// Returns [`WorkspaceError::BaseDirUnavailable`] if the base directory
    /// cannot be created, or [`WorkspaceError::Io`] if the workspace
    /// directory itself cannot be created. No partial state is left behind.
    #[instrument(skip(self), fields(base_dir = %self.base_dir.display()))]
    pub fn create(&self) -> Result<Workspace, WorkspaceError> {
        fs::create_dir_all(&self.base_dir).map_err(|e| WorkspaceError::BaseDirUnavailable {
            path: self.base_dir.display().to_string(),
            source: e,
        })?;

        let id = Uuid::new_v4();
        let root = self.base_dir.join(id.to_string());
        debug!(%id, "Creating workspace");

        fs::create_dir(&root).map_err(|e| WorkspaceError::Io {
            context: format!("failed to create workspace directory: {}", root.display()),
            source: e,
        })?;

        let permissions = fs::Permissions::from_mode(DIR_PERMISSIONS);
        if let Err(e) = fs::set_permissions(&root, permissions) {
            // Don't leave a half-initialized directory behind.
            let _ = fs::remove_dir_all(&root);
            return Err(WorkspaceError::Io {
                context: format!("failed to set permissions on: {}", root.display()),
                source: e,
            });
        }

        Ok(Workspace {
            id,
            root,
            created_at: Utc::now(),
        })
    }

    /// Writes a file into the workspace, creating parent directories as needed.
    ///
    /// # Errors
    ///
    /// Returns [`WorkspaceError::Io`] on filesystem failure. Names that
    /// escape the workspace are rejected upstream by request validation;
    /// this method re-checks and maps the violation to an I/O-style error.
    #[instrument(skip(self, content), fields(workspace = %workspace.id, name = %name))]
    pub fn write_file(
        &self,
        workspace: &Workspace,
        name: &str,
        content: &[u8],
    ) -> Result<(), WorkspaceError> {
        let path = workspace
            .resolve_relative(name)
            .map_err(|e| WorkspaceError::Io {
                context: e.to_string(),
                source: std::io::Error::new(std::io::ErrorKind::InvalidInput, "path escape"),
            })?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| WorkspaceError::Io {
                context: format!("failed to create parent directory: {}", parent.display()),
                source: e,
            })?;
        }

        fs::write(&path, content).map_err(|e| WorkspaceError::Io {
            context: format!("failed to write file: {}", path.display()),
            source: e,
        })?;
        trace!(bytes = content.len(), "Wrote workspace file");
        Ok(())
    }

    /// Copies the contents of an existing directory into the workspace.
    ///
    /// The source is never executed in place: copying keeps the
    /// destroy-on-all-paths guarantee from ever touching caller-owned data.
    /// Symlinks are not followed.
    ///
    /// # Errors
    ///
    /// Returns [`WorkspaceError::Io`] if any entry cannot be copied.
    #[instrument(skip(self), fields(workspace = %workspace.id, source = %source.display()))]
    pub fn copy_tree(&self, workspace: &Workspace, source: &Path) -> Result<(), WorkspaceError> {
        let mut copied = 0usize;
        for entry in WalkDir::new(source).follow_links(false) {
            let entry = entry.map_err(|e| WorkspaceError::Io {
                context: format!("failed to walk source directory: {}", source.display()),
                source: e.into(),
            })?;

            // Strip the source prefix; walkdir yields `source` itself first.
            let rel = entry
                .path()
                .strip_prefix(source)
                .expect("walkdir entries are rooted at source");
            if rel.as_os_str().is_empty() {
                continue;
            }
            let dest = workspace.root.join(rel);

            if entry.file_type().is_dir() {
                fs::create_dir_all(&dest).map_err(|e| WorkspaceError::Io {
                    context: format!("failed to create directory: {}", dest.display()),
                    source: e,
                })?;
            } else if entry.file_type().is_file() {
                if let Some(parent) = dest.parent() {
                    fs::create_dir_all(parent).map_err(|e| WorkspaceError::Io {
                        context: format!("failed to create parent directory: {}", parent.display()),
                        source: e,
                    })?;
                }
                fs::copy(entry.path(), &dest).map_err(|e| WorkspaceError::Io {
                    context: format!("failed to copy file to: {}", dest.display()),
                    source: e,
                })?;
                copied += 1;
            }
            // Symlinks and other special files are skipped.
        }
        debug!(files = copied, "Copied existing directory into workspace");
        Ok(())
    }

    /// Recursively removes the workspace directory.
    ///
    /// Idempotent: destroying a workspace that is already partially or
    /// fully missing succeeds.
    ///
    /// # Errors
    ///
    /// Returns [`WorkspaceError::Io`] if the directory exists but cannot be
    /// removed.
    #[instrument(skip(self), fields(workspace = %workspace.id))]
    pub fn destroy(&self, workspace: &Workspace) -> Result<(), WorkspaceError> {
        if workspace.root.exists() {
            fs::remove_dir_all(&workspace.root).map_err(|e| WorkspaceError::Io {
                context: format!(
                    "failed to remove workspace directory: {}",
                    workspace.root.display()
                ),
                source: e,
            })?;
            debug!("Workspace destroyed");
        } else {
            trace!("Workspace already gone, nothing to destroy");
        }
        Ok(())
    }
}

/// Scope guard that destroys a workspace when dropped.
///
/// Deletion failures are logged, never propagated: a cleanup problem must
/// not mask the primary execution result.
#[derive(Debug)]
pub struct WorkspaceGuard<'a> {
    store: &'a WorkspaceStore,
    workspace: Workspace,
}

impl<'a> WorkspaceGuard<'a> {
    /// Takes ownership of a workspace for the duration of a scope.
    #[must_use]
    pub fn new(store: &'a WorkspaceStore, workspace: Workspace) -> Self {
        Self { store, workspace }
    }

    /// Returns the guarded workspace.
    #[must_use]
    pub fn workspace(&self) -> &Workspace {
        &self.workspace
    }
}

impl Drop for WorkspaceGuard<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.store.destroy(&self.workspace) {
            warn!(
                workspace = %self.workspace.id,
                error = %e,
                "Workspace cleanup failed"
            );
        }
    }
}

/// Returns the default base directory for workspace storage.
///
/// Uses `RUNBOX_BASE_DIR` if set, otherwise a `runbox` directory under the
/// system temp directory.
#[must_use]
pub fn default_base_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("RUNBOX_BASE_DIR") {
        return PathBuf::from(dir);
    }
    std::env::temp_dir().join("runbox")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store() -> (TempDir, WorkspaceStore) {
        let base = TempDir::new().expect("failed to create temp dir");
        let store = WorkspaceStore::new(base.path());
        (base, store)
    }

    #[test]
    fn test_create_allocates_unique_directories() {
        let (_base, store) = store();
        let a = store.create().expect("create a");
        let b = store.create().expect("create b");

        assert_ne!(a.id, b.id);
        assert_ne!(a.root, b.root);
        assert!(a.root.is_dir());
        assert!(b.root.is_dir());

        store.destroy(&a).expect("destroy a");
        store.destroy(&b).expect("destroy b");
    }

    #[test]
    fn test_create_sets_restrictive_permissions() {
        let (_base, store) = store();
        let ws = store.create().expect("create");

        let mode = fs::metadata(&ws.root)
            .expect("metadata")
            .permissions()
            .mode()
            & 0o777;
        assert_eq!(mode, DIR_PERMISSIONS);

        store.destroy(&ws).expect("destroy");
    }

    #[test]
    fn test_destroy_is_idempotent() {
        let (_base, store) = store();
        let ws = store.create().expect("create");

        store.destroy(&ws).expect("first destroy");
        assert!(!ws.root.exists());
        store.destroy(&ws).expect("second destroy must not fail");
    }

    #[test]
    fn test_write_file_creates_parents() {
        let (_base, store) = store();
        let ws = store.create().expect("create");

        store
            .write_file(&ws, "src/nested/util.py", b"x = 1\n")
            .expect("write");
        assert_eq!(
            fs::read(ws.root.join("src/nested/util.py")).expect("read"),
            b"x = 1\n"
        );

        store.destroy(&ws).expect("destroy");
    }

    #[test]
    fn test_resolve_relative_rejects_escapes() {
        let (_base, store) = store();
        let ws = store.create().expect("create");

        assert!(ws.resolve_relative("../outside.txt").is_err());
        assert!(ws.resolve_relative("/etc/passwd").is_err());
        assert!(ws.resolve_relative("a/../../b").is_err());
        assert!(ws.resolve_relative("ok/inside.txt").is_ok());

        store.destroy(&ws).expect("destroy");
    }

    #[test]
    fn test_copy_tree_copies_files_and_dirs() {
        let (_base, store) = store();
        let src = TempDir::new().expect("src dir");
        fs::create_dir(src.path().join("lib")).expect("mkdir");
        fs::write(src.path().join("main.py"), "print('a')").expect("write");
        fs::write(src.path().join("lib/helper.py"), "pass").expect("write");

        let ws = store.create().expect("create");
        store.copy_tree(&ws, src.path()).expect("copy");

        assert!(ws.root.join("main.py").is_file());
        assert!(ws.root.join("lib/helper.py").is_file());
        // Originals untouched.
        assert!(src.path().join("main.py").is_file());

        store.destroy(&ws).expect("destroy");
    }

    #[test]
    fn test_guard_destroys_on_drop() {
        let (_base, store) = store();
        let ws = store.create().expect("create");
        let root = ws.root.clone();

        {
            let _guard = WorkspaceGuard::new(&store, ws);
            assert!(root.exists());
        }
        assert!(!root.exists());
    }

    #[test]
    fn test_guard_tolerates_missing_directory() {
        let (_base, store) = store();
        let ws = store.create().expect("create");
        let root = ws.root.clone();

        let guard = WorkspaceGuard::new(&store, ws);
        fs::remove_dir_all(&root).expect("remove out from under the guard");
        drop(guard); // must not panic
    }
}
