//! Host-provided packages (cmake, qt, vtk, ...) located instead of built.

use std::path::{Path, PathBuf};

use kiln_schema::HostProbe;

/// Find the install prefix described by `probe`.
///
/// Candidate prefixes are tried in order; the first one containing
/// `probe.probe` (or simply existing, when no probe path is given) wins.
/// Failing that, `probe.which` is looked up on `PATH` and the directory above
/// its `bin/` becomes the prefix.
pub fn locate(probe: &HostProbe) -> Option<PathBuf> {
    for prefix in &probe.prefixes {
        let prefix = Path::new(prefix);
        let found = match &probe.probe {
            Some(rel) => prefix.join(rel).exists(),
            None => prefix.is_dir(),
        };
        if found {
            tracing::debug!("Host prefix {} matched", prefix.display());
            return Some(prefix.to_path_buf());
        }
    }

    let bin = probe.which.as_deref()?;
    let path = which::which(bin).ok()?;
    tracing::debug!("Found {bin} at {}", path.display());
    path.parent()?.parent().map(Path::to_path_buf)
}

/// Human-readable list of what [`locate`] tries, for error messages.
pub fn describe_search(probe: &HostProbe) -> String {
    let mut tried: Vec<String> = probe
        .prefixes
        .iter()
        .map(|p| match &probe.probe {
            Some(rel) => format!("{p}/{rel}"),
            None => p.clone(),
        })
        .collect();
    if let Some(bin) = &probe.which {
        tried.push(format!("`{bin}` on PATH"));
    }
    tried.join(", ")
}
