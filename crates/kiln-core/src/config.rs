//! User configuration (`<home>/config.toml`).
//!
//! Every key is optional. Command-line flags override what is read here.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::builder::Toolchain;
use crate::executor::{ExecutorConfig, FailurePolicy};
use crate::paths::Layout;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct KilnConfig {
    /// Formula search path, highest priority first.
    pub formula_dirs: Vec<PathBuf>,
    pub jobs: Option<usize>,
    pub fail_fast: bool,
    pub step_timeout_secs: Option<u64>,
    pub with_recommended: bool,
    pub keep_work_dirs: bool,
    pub cc: Option<String>,
    pub cxx: Option<String>,
}

impl KilnConfig {
    /// Read `path`, or return the defaults when it does not exist.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!("No config at {}, using defaults", path.display());
                return Ok(Self::default());
            }
            Err(source) => {
                return Err(ConfigError::Io {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };
        Self::parse(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn parse(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Formula directories to search: the configured list, or `./formulas`
    /// followed by `<home>/formulas`.
    pub fn formula_dirs(&self, layout: &Layout) -> Vec<PathBuf> {
        if self.formula_dirs.is_empty() {
            vec![PathBuf::from("formulas"), layout.formula_dir()]
        } else {
            self.formula_dirs.clone()
        }
    }

    pub fn toolchain(&self) -> Toolchain {
        let mut toolchain = Toolchain::default();
        if let Some(cc) = &self.cc {
            toolchain.cc.clone_from(cc);
        }
        if let Some(cxx) = &self.cxx {
            toolchain.cxx.clone_from(cxx);
        }
        toolchain
    }

    pub fn executor_config(&self, layout: Layout) -> ExecutorConfig {
        ExecutorConfig {
            layout,
            toolchain: self.toolchain(),
            jobs: self.jobs.unwrap_or(1).max(1),
            failure_policy: if self.fail_fast {
                FailurePolicy::Abort
            } else {
                FailurePolicy::ContinueIndependent
            },
            step_timeout: self.step_timeout_secs.map(Duration::from_secs),
            keep_work_dirs: self.keep_work_dirs,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempdir().unwrap();
        let config = KilnConfig::load(&dir.path().join("config.toml")).unwrap();
        assert_eq!(config, KilnConfig::default());

        let layout = Layout::new(dir.path());
        assert_eq!(
            config.formula_dirs(&layout),
            vec![PathBuf::from("formulas"), dir.path().join("formulas")]
        );
        let exec = config.executor_config(layout);
        assert_eq!(exec.jobs, 1);
        assert_eq!(exec.failure_policy, FailurePolicy::ContinueIndependent);
    }

    #[test]
    fn values_flow_into_executor_config() {
        let config = KilnConfig::parse(
            r#"
formula_dirs = ["/srv/formulas"]
jobs = 4
fail_fast = true
step_timeout_secs = 3600
cxx = "clang++"
"#,
        )
        .unwrap();
        let layout = Layout::new("/tmp/kiln");
        assert_eq!(config.formula_dirs(&layout), vec![PathBuf::from("/srv/formulas")]);

        let exec = config.executor_config(layout);
        assert_eq!(exec.jobs, 4);
        assert_eq!(exec.failure_policy, FailurePolicy::Abort);
        assert_eq!(exec.step_timeout, Some(Duration::from_secs(3600)));
        assert_eq!(exec.toolchain.cxx, "clang++");
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "parallel = 3\n").unwrap();
        let err = KilnConfig::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }
}
