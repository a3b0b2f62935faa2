//! Source acquisition: populate a working directory from an uploaded archive
//! or a remote repository clone.

mod archive;
mod git;

use std::path::Path;
use std::time::Duration;

use thiserror::Error;
use tracing::info;

use crate::request::SourceOrigin;

/// Errors raised while acquiring project source.
#[derive(Debug, Error)]
pub enum AcquisitionError {
    #[error("repository clone failed: {0}")]
    CloneFailed(String),

    #[error("unsupported repository URL (only https is accepted): {0}")]
    UnsupportedScheme(String),

    #[error("archive entry escapes the extraction directory: {0}")]
    UnsafeEntry(String),

    #[error("archive expands beyond the {limit}-byte extraction limit")]
    TooLarge { limit: u64 },

    #[error("archive has more than {limit} entries")]
    TooManyEntries { limit: usize },

    #[error("invalid archive: {0}")]
    InvalidArchive(String),

    #[error("source contains no files")]
    EmptySource,

    #[error("I/O error during acquisition: {0}")]
    Io(#[from] std::io::Error),

    #[error("acquisition task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl AcquisitionError {
    /// Short machine-readable reason.
    pub fn reason(&self) -> &'static str {
        match self {
            AcquisitionError::CloneFailed(_) | AcquisitionError::UnsupportedScheme(_) => "clone-failed",
            AcquisitionError::UnsafeEntry(_) => "unsafe-entry",
            AcquisitionError::TooLarge { .. } | AcquisitionError::TooManyEntries { .. } => "size-limit",
            AcquisitionError::InvalidArchive(_) => "invalid-archive",
            AcquisitionError::EmptySource => "empty-source",
            AcquisitionError::Io(_) | AcquisitionError::Join(_) => "internal",
        }
    }

    /// Whether the failure is attributable to caller-supplied input.
    pub fn is_caller_fault(&self) -> bool {
        !matches!(self, AcquisitionError::Io(_) | AcquisitionError::Join(_))
    }
}

/// Ceilings applied while acquiring source.
#[derive(Debug, Clone)]
pub struct AcquireLimits {
    /// Total bytes written while extracting one archive.
    pub max_extract_bytes: u64,
    /// Entries (files and directories) in one archive.
    pub max_entries: usize,
    /// Network timeout for repository clones.
    pub clone_timeout: Duration,
}

impl Default for AcquireLimits {
    fn default() -> Self {
        Self {
            max_extract_bytes: 1024 * 1024 * 1024,
            max_entries: 100_000,
            clone_timeout: Duration::from_secs(120),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct SourceAcquirer {
    limits: AcquireLimits,
}

impl SourceAcquirer {
    pub fn new(limits: AcquireLimits) -> Self {
        Self { limits }
    }

    /// Populate `destination` from `origin`.
    ///
    /// Extraction and cloning run on the blocking pool.
    pub async fn acquire(&self, origin: &SourceOrigin, destination: &Path) -> Result<(), AcquisitionError> {
        tokio::fs::create_dir_all(destination).await?;
        let dest = destination.to_path_buf();

        match origin {
            SourceOrigin::Archive(upload) => {
                let bytes = upload.bytes.clone();
                let limits = self.limits.clone();
                let files =
                    tokio::task::spawn_blocking(move || archive::extract_zip(&bytes, &dest, &limits)).await??;
                info!(
                    archive = %upload.file_name,
                    size_bytes = upload.bytes.len(),
                    files,
                    "archive extracted"
                );
            }
            SourceOrigin::Repository { url, reference } => {
                if !url.starts_with("https://") {
                    return Err(AcquisitionError::UnsupportedScheme(url.clone()));
                }
                let repo_url = url.clone();
                let repo_ref = reference.clone();
                let timeout = self.limits.clone_timeout;
                let head = tokio::task::spawn_blocking(move || {
                    git::clone_repository(&repo_url, repo_ref.as_deref(), &dest, timeout, git::SHALLOW_DEPTH)
                })
                .await??;
                info!(repository = %url, reference = ?reference, head = ?head, "repository cloned");
            }
        }
        Ok(())
    }
}

// ── Tests ──────────────────────────────────────────────────────────────────────
