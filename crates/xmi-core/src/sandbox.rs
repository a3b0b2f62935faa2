//! Per-request working directories.
//!
//! Every request gets its own uniquely named directory under a shared root.
//! The directory is owned by a [`WorkingDirectory`] value: [`release`]
//! removes it on a blocking task without holding up the caller, and if the
//! value is dropped instead (panic, cancelled request) the underlying
//! [`tempfile::TempDir`] removes it synchronously.
//!
//! [`release`]: WorkingDirectory::release

use std::path::{Path, PathBuf};

use tempfile::TempDir;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

const SCOPE_PREFIX: &str = "xmi-";

#[derive(Debug, Error)]
pub enum SandboxError {
    #[error("failed to create working directory: {0}")]
    Create(#[from] std::io::Error),

    #[error("working directory task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Hands out working directories under a configured root.
#[derive(Debug, Clone)]
pub struct SandboxManager {
    root: PathBuf,
}

impl SandboxManager {
    /// Create the manager, making sure `root` exists.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self, SandboxError> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create a fresh, exclusively owned working directory.
    pub async fn acquire_scope(&self) -> Result<WorkingDirectory, SandboxError> {
        let root = self.root.clone();
        let dir = tokio::task::spawn_blocking(move || {
            tempfile::Builder::new().prefix(SCOPE_PREFIX).tempdir_in(&root)
        })
        .await??;
        debug!(workdir = %dir.path().display(), "working directory created");
        Ok(WorkingDirectory { dir })
    }
}

/// One request's scratch space.
#[derive(Debug)]
pub struct WorkingDirectory {
    dir: TempDir,
}

impl WorkingDirectory {
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Where acquired project source is placed.
    pub fn source_dir(&self) -> PathBuf {
        self.path().join("source")
    }

    /// Where an IR document is materialized for the model tool.
    pub fn ir_path(&self) -> PathBuf {
        self.path().join("model.ir.json")
    }

    /// Where the model tool is told to write its result.
    pub fn output_path(&self) -> PathBuf {
        self.path().join("out").join("model.xmi")
    }

    /// Replace occurrences of this directory's path in `text`.
    pub fn redact(&self, text: &str) -> String {
        let path = self.path().to_string_lossy();
        text.replace(path.as_ref(), "<workdir>")
    }

    /// Remove the directory and everything in it.
    ///
    /// Runs on a blocking task; failures are logged and never reach the
    /// caller.  The handle may be ignored.
    pub fn release(self) -> JoinHandle<()> {
        let dir = self.dir;
        tokio::task::spawn_blocking(move || {
            let path = dir.path().to_path_buf();
            match dir.close() {
                Ok(()) => debug!(workdir = %path.display(), "working directory removed"),
                Err(e) => warn!(
                    workdir = %path.display(),
                    error = %e,
                    "failed to remove working directory"
                ),
            }
        })
    }
}

// ── Tests ──────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod test {
    use super::*;
    use std::collections::HashSet;

    fn manager() -> (TempDir, SandboxManager) {
        let root = tempfile::tempdir().unwrap();
        let manager = SandboxManager::new(root.path().join("work")).unwrap();
        (root, manager)
    }

    fn entries(path: &Path) -> usize {
        std::fs::read_dir(path).map(|d| d.count()).unwrap_or(0)
    }

    #[tokio::test]
    async fn scope_is_created_under_root_and_released() {
        let (_root, manager) = manager();
        let scope = manager.acquire_scope().await.unwrap();
        let path = scope.path().to_path_buf();
        assert!(path.starts_with(manager.root()));
        assert!(path.is_dir());

        std::fs::create_dir_all(scope.source_dir().join("pkg")).unwrap();
        std::fs::write(scope.source_dir().join("pkg/A.java"), "class A {}").unwrap();

        scope.release().await.unwrap();
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn dropped_scope_is_removed() {
        let (_root, manager) = manager();
        let scope = manager.acquire_scope().await.unwrap();
        let path = scope.path().to_path_buf();
        drop(scope);
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn concurrent_scopes_are_distinct() {
        let (_root, manager) = manager();
        let mut tasks = Vec::new();
        for _ in 0..16 {
            let m = manager.clone();
            tasks.push(tokio::spawn(async move { m.acquire_scope().await.unwrap() }));
        }
        let mut scopes = Vec::new();
        for t in tasks {
            scopes.push(t.await.unwrap());
        }
        let unique: HashSet<_> = scopes.iter().map(|s| s.path().to_path_buf()).collect();
        assert_eq!(unique.len(), 16);

        for scope in scopes {
            scope.release().await.unwrap();
        }
        assert_eq!(entries(manager.root()), 0);
    }

    #[tokio::test]
    async fn redact_hides_workdir() {
        let (_root, manager) = manager();
        let scope = manager.acquire_scope().await.unwrap();
        let text = format!("cannot read {}/source/A.java", scope.path().display());
        assert_eq!(scope.redact(&text), "cannot read <workdir>/source/A.java");
    }
}
