//! The small set of git facts the tool needs, obtained from the `git`
//! binary in a package checkout.
// SPDX-License-Identifier: GPL-2.0-or-later

use std::path::Path;
use std::process::Command;

use crate::errors::{FedpkgError, Result};

fn git_output(path: &Path, args: &[&str]) -> Result<Option<String>> {
    let output = Command::new("git")
        .current_dir(path)
        .args(args)
        .output()
        .map_err(|e| FedpkgError::remote("Failed to run git", e))?;
    if !output.status.success() {
        return Ok(None);
    }
    Ok(Some(String::from_utf8_lossy(&output.stdout).trim().to_string()))
}

/// The currently checked-out branch, or `None` when detached or not in a
/// repository at all.
pub fn current_branch(path: &Path) -> Result<Option<String>> {
    Ok(git_output(path, &["symbolic-ref", "--short", "-q", "HEAD"])?.filter(|s| !s.is_empty()))
}

/// All remote-tracking refs, e.g. `origin/f40`.
pub fn remote_tracking_branches(path: &Path) -> Result<Vec<String>> {
    let Some(out) = git_output(
        path,
        &[
            "for-each-ref",
            "--format=%(refname:short)",
            "refs/remotes",
        ],
    )?
    else {
        return Ok(Vec::new());
    };
    Ok(out.lines().map(|l| l.trim().to_string()).collect())
}

/// The `(namespace, repo)` of the checkout, derived from the origin URL;
/// `None` when there is no usable origin remote.
pub fn repo_context(path: &Path) -> Result<Option<(String, String)>> {
    let Some(url) = git_output(path, &["remote", "get-url", "origin"])? else {
        return Ok(None);
    };
    Ok(parse_repo_url(&url))
}

fn parse_repo_url(url: &str) -> Option<(String, String)> {
    let trimmed = url.trim_end_matches('/').trim_end_matches(".git");
    let mut parts = trimmed.rsplit('/');
    let repo = parts.next()?.to_string();
    let namespace = parts.next()?;
    // Strip any scp-style "host:" prefix from the namespace component.
    let namespace = namespace.rsplit(':').next()?.to_string();
    if repo.is_empty() || namespace.is_empty() {
        return None;
    }
    Some((namespace, repo))
}
