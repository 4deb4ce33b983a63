use dirs::home_dir;
use std::path::{Path, PathBuf};

/// Returns the kiln home directory, or None if the user's home cannot be resolved.
pub fn try_kiln_home() -> Option<PathBuf> {
    if let Ok(val) = std::env::var("KILN_HOME") {
        if !val.is_empty() {
            return Some(PathBuf::from(val));
        }
    }
    home_dir().map(|h| h.join(".kiln"))
}

/// Returns the kiln home directory (`$KILN_HOME` or `~/.kiln`).
///
/// Falls back to `./.kiln` when no home directory can be resolved, so that
/// callers never have to deal with a missing root.
pub fn kiln_home() -> PathBuf {
    try_kiln_home().unwrap_or_else(|| PathBuf::from(".kiln"))
}

/// Resolved directory layout under a kiln home.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    root: PathBuf,
}

impl Layout {
    /// Layout rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Layout rooted at [`kiln_home`].
    pub fn from_env() -> Self {
        Self::new(kiln_home())
    }

    /// The home directory itself.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// `SQLite` state database: `<home>/state.db`
    pub fn db_path(&self) -> PathBuf {
        self.root.join("state.db")
    }

    /// User configuration: `<home>/config.toml`
    pub fn config_path(&self) -> PathBuf {
        self.root.join("config.toml")
    }

    /// Install prefixes: `<home>/cellar`
    pub fn cellar_path(&self) -> PathBuf {
        self.root.join("cellar")
    }

    /// Install prefix for one package version: `<home>/cellar/<name>/<version>`
    pub fn keg_path(&self, name: &str, version: &str) -> PathBuf {
        self.cellar_path().join(name).join(version)
    }

    /// Downloaded archives keyed by sha256: `<home>/cache`
    pub fn cache_path(&self) -> PathBuf {
        self.root.join("cache")
    }

    /// Build logs: `<home>/logs`
    pub fn log_dir(&self) -> PathBuf {
        self.root.join("logs")
    }

    /// User formulas: `<home>/formulas`
    pub fn formula_dir(&self) -> PathBuf {
        self.root.join("formulas")
    }

    /// Work directories: `<home>/tmp` (same volume as the cellar)
    pub fn tmp_path(&self) -> PathBuf {
        self.root.join("tmp")
    }

    /// Generate a build log path for a package
    pub fn build_log_path(&self, package: &str, version: &str) -> PathBuf {
        let timestamp = chrono::Utc::now().format("%Y%m%d-%H%M%S");
        self.log_dir()
            .join(format!("build-{package}-{version}-{timestamp}.log"))
    }
}

/// Extract the filename from a URL.
pub fn filename_from_url(url: &str) -> &str {
    url.split('/').next_back().unwrap_or("")
}
