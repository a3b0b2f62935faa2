use std::path::Path;
use std::time::Duration;

use git2::build::{CheckoutBuilder, RepoBuilder};
use git2::{AutotagOption, FetchOptions, ProxyOptions, Repository, opts};
use tracing::debug;

use super::AcquisitionError;

/// Fetch depth used for request clones; history is never needed.
pub(crate) const SHALLOW_DEPTH: i32 = 1;

/// Clone `url` into `destination` (blocking).
///
/// Without a `reference` the remote's default branch is checked out.  A
/// `reference` is tried as a branch first, then as a tag.  A missing ref,
/// an unreachable host and an authentication failure all surface as
/// [`AcquisitionError::CloneFailed`].  `depth <= 0` fetches full history.
///
/// Returns the checked-out commit when it can be resolved.
pub(crate) fn clone_repository(
    url: &str,
    reference: Option<&str>,
    destination: &Path,
    timeout: Duration,
    depth: i32,
) -> Result<Option<String>, AcquisitionError> {
    configure_timeouts(timeout)?;

    debug!(repository = %url, reference = ?reference, depth, "starting clone");
    let head = match reference {
        None => {
            let repo = RepoBuilder::new()
                .fetch_options(fetch_options(depth))
                .clone(url, destination)
                .map_err(clone_failed)?;
            repo.head().ok().and_then(|h| h.target()).map(|oid| oid.to_string())
        }
        Some(reference) => Some(fetch_reference(url, reference, destination, depth)?),
    };

    if !has_content(destination)? {
        return Err(AcquisitionError::EmptySource);
    }
    Ok(head)
}

fn fetch_options(depth: i32) -> FetchOptions<'static> {
    let mut options = FetchOptions::new();
    options.download_tags(AutotagOption::None);
    options.proxy_options(ProxyOptions::new());
    options.depth(depth);
    options
}

/// Fetch a single branch or tag and check it out detached.
fn fetch_reference(url: &str, reference: &str, destination: &Path, depth: i32) -> Result<String, AcquisitionError> {
    let repo = Repository::init(destination).map_err(clone_failed)?;
    let mut remote = repo.remote("origin", url).map_err(clone_failed)?;
    let mut options = fetch_options(depth);

    let candidates = [
        (
            format!("+refs/heads/{reference}:refs/remotes/origin/{reference}"),
            format!("refs/remotes/origin/{reference}"),
        ),
        (format!("+refs/tags/{reference}:refs/tags/{reference}"), format!("refs/tags/{reference}")),
    ];

    let mut last_error = None;
    for (refspec, local) in &candidates {
        if let Err(e) = remote.fetch(&[refspec.as_str()], Some(&mut options), None) {
            debug!(refspec = %refspec, error = %e, "fetch attempt failed");
            last_error = Some(e);
            continue;
        }
        let Ok(found) = repo.find_reference(local) else {
            continue;
        };
        let commit = found.peel_to_commit().map_err(clone_failed)?;
        repo.checkout_tree(commit.as_object(), Some(CheckoutBuilder::new().force()))
            .map_err(clone_failed)?;
        repo.set_head_detached(commit.id()).map_err(clone_failed)?;
        return Ok(commit.id().to_string());
    }

    Err(AcquisitionError::CloneFailed(match last_error {
        Some(e) => e.message().to_owned(),
        None => format!("reference not found: {reference}"),
    }))
}

fn clone_failed(e: git2::Error) -> AcquisitionError {
    AcquisitionError::CloneFailed(e.message().to_owned())
}

/// libgit2 keeps these as process-wide settings; setting them again on each
/// clone keeps them in line with configuration.
fn configure_timeouts(timeout: Duration) -> Result<(), AcquisitionError> {
    let timeout_ms = timeout.as_millis().clamp(1, i32::MAX as u128) as i32;
    // SAFETY: these only store integers in libgit2's global options.
    unsafe {
        opts::set_server_connect_timeout_in_milliseconds(timeout_ms)
            .and_then(|_| opts::set_server_timeout_in_milliseconds(timeout_ms))
            .map_err(clone_failed)?;
    }
    Ok(())
}

fn has_content(dir: &Path) -> std::io::Result<bool> {
    for entry in std::fs::read_dir(dir)? {
        if entry?.file_name() != ".git" {
            return Ok(true);
        }
    }
    Ok(false)
}
