use std::fs;
use std::io::{Cursor, ErrorKind, Read};
use std::path::{Path, PathBuf};

use tracing::warn;

use super::{AcquireLimits, AcquisitionError};

const S_IFMT: u32 = 0o170000;
const S_IFLNK: u32 = 0o120000;

/// Extract a ZIP archive into `dest`, returning the number of files written.
///
/// Every entry is checked before anything is written for it; a single unsafe
/// entry fails the whole extraction.  The size ceiling counts bytes actually
/// decompressed, not the sizes the archive declares.
pub(crate) fn extract_zip(bytes: &[u8], dest: &Path, limits: &AcquireLimits) -> Result<usize, AcquisitionError> {
    let mut archive =
        zip::ZipArchive::new(Cursor::new(bytes)).map_err(|e| AcquisitionError::InvalidArchive(e.to_string()))?;

    if archive.len() > limits.max_entries {
        return Err(AcquisitionError::TooManyEntries {
            limit: limits.max_entries,
        });
    }

    let mut written: u64 = 0;
    let mut files = 0usize;

    for i in 0..archive.len() {
        let mut file = archive
            .by_index(i)
            .map_err(|e| AcquisitionError::InvalidArchive(e.to_string()))?;
        let name = file.name().to_owned();

        // The zip crate's own containment check comes first; names it lets
        // through may still use `\` separators or drive prefixes.
        if file.enclosed_name().is_none() {
            warn!(entry = %name, "rejecting archive entry outside the extraction root");
            return Err(AcquisitionError::UnsafeEntry(name));
        }
        let Some(relative) = confined_path(&name) else {
            warn!(entry = %name, "rejecting archive entry outside the extraction root");
            return Err(AcquisitionError::UnsafeEntry(name));
        };
        if file.unix_mode().is_some_and(|m| m & S_IFMT == S_IFLNK) {
            warn!(entry = %name, "rejecting symlink archive entry");
            return Err(AcquisitionError::UnsafeEntry(name));
        }
        if relative.as_os_str().is_empty() {
            continue;
        }

        let dest_path = dest.join(&relative);
        if file.is_dir() {
            fs::create_dir_all(&dest_path).map_err(|e| entry_error(&name, e))?;
            continue;
        }
        if let Some(parent) = dest_path.parent() {
            fs::create_dir_all(parent).map_err(|e| entry_error(&name, e))?;
        }

        let remaining = limits.max_extract_bytes.saturating_sub(written);
        let mut out = fs::File::create(&dest_path).map_err(|e| entry_error(&name, e))?;
        let copied = std::io::copy(&mut (&mut file).take(remaining + 1), &mut out)?;
        written += copied;
        if written > limits.max_extract_bytes {
            return Err(AcquisitionError::TooLarge {
                limit: limits.max_extract_bytes,
            });
        }
        files += 1;
    }

    if files == 0 {
        return Err(AcquisitionError::EmptySource);
    }
    Ok(files)
}

/// Entries that collide with each other (a file and a directory of the same
/// name) are a defect of the archive, not of the sandbox.
fn entry_error(name: &str, e: std::io::Error) -> AcquisitionError {
    match e.kind() {
        ErrorKind::AlreadyExists | ErrorKind::NotADirectory | ErrorKind::IsADirectory => {
            AcquisitionError::InvalidArchive(format!("entry {name} conflicts with an earlier entry"))
        }
        _ => AcquisitionError::Io(e),
    }
}

/// Lexically normalize an entry name and return it relative to the
/// extraction root, or `None` if it would land outside.
///
/// Both `/` and `\` separate components.  Absolute names, drive prefixes and
/// any `..` that climbs above the root are rejected.
fn confined_path(name: &str) -> Option<PathBuf> {
    if name.contains('\0') || name.starts_with('/') || name.starts_with('\\') {
        return None;
    }
    let mut parts: Vec<&str> = Vec::new();
    for part in name.split(['/', '\\']) {
        match part {
            "" | "." => {}
            ".." => {
                parts.pop()?;
            }
            p if p.contains(':') => return None,
            p => parts.push(p),
        }
    }
    Some(parts.iter().collect())
}

// ── Tests ──────────────────────────────────────────────────────────────────────
