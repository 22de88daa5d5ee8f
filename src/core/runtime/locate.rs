use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::debug;

use super::install::{read_receipt, InstallReceipt};
use super::paths::{SearchRoots, SearchScope};
use super::version::{read_version_marker, version_file_path, RuntimeVersion};

/// Every `{root}/{expected}` holding a marker file, in root order.
pub fn candidate_runtimes(
    roots: &SearchRoots,
    scope: SearchScope,
    expected: &RuntimeVersion,
) -> Vec<PathBuf> {
    let name = expected.to_string();
    roots
        .roots(scope)
        .into_iter()
        .map(|root| root.join(&name))
        .filter(|candidate| candidate.is_dir() && version_file_path(candidate).is_file())
        .collect()
}

/// First candidate in root order, if any.
pub fn find_runtime(
    roots: &SearchRoots,
    scope: SearchScope,
    expected: &RuntimeVersion,
) -> Option<PathBuf> {
    let found = candidate_runtimes(roots, scope, expected).into_iter().next();
    match &found {
        Some(path) => debug!("Found runtime candidate {:?}", path),
        None => debug!("No runtime candidate for {} in scope {}", expected, scope),
    }
    found
}

#[derive(Debug, Clone, Serialize)]
pub struct InstalledRuntime {
    pub path: PathBuf,
    pub marker: Option<String>,
    pub compatible: bool,
    pub receipt: Option<InstallReceipt>,
}

/// All runtime directories under the roots of `scope`, sorted by name
/// within each root.
pub fn scan_runtimes(
    roots: &SearchRoots,
    scope: SearchScope,
    expected: &RuntimeVersion,
) -> Vec<InstalledRuntime> {
    let expected = expected.to_string();
    roots
        .roots(scope)
        .into_iter()
        .flat_map(|root| runtime_dirs(root))
        .map(|path| {
            let marker = read_version_marker(&path).ok();
            let compatible = marker.as_deref() == Some(expected.as_str());
            let receipt = read_receipt(&path);
            InstalledRuntime {
                path,
                marker,
                compatible,
                receipt,
            }
        })
        .collect()
}

fn runtime_dirs(root: &Path) -> Vec<PathBuf> {
    let Ok(entries) = std::fs::read_dir(root) else {
        return Vec::new();
    };
    let mut dirs: Vec<PathBuf> = entries
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| path.is_dir())
        .collect();
    dirs.sort();
    dirs
}
