//! Textual patches applied to a source tree before configuration.

use std::io::Write;
use std::path::{Component, Path, PathBuf};

use regex::Regex;
use thiserror::Error;

use kiln_schema::Patch;

#[derive(Error, Debug)]
pub enum PatchError {
    #[error("Invalid patch pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("Patch target '{0}' must be a relative path inside the source tree")]
    OutsideSource(String),

    #[error("Patch target '{0}' does not exist")]
    MissingFile(String),

    #[error("Pattern '{pattern}' did not match anything in {file}")]
    NoMatch { file: String, pattern: String },

    #[error("IO error patching {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// What happened when a patch was applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatchOutcome {
    Applied { replacements: usize },
    /// The pattern matched nothing and the patch is optional.
    Skipped,
}

/// Applies a [`Patch`] to a file under `source_root`.
pub trait FilePatcher: Send + Sync {
    fn apply(&self, source_root: &Path, patch: &Patch) -> Result<PatchOutcome, PatchError>;
}

/// [`FilePatcher`] using the `regex` crate. The file is rewritten through a
/// temp file in the same directory and renamed into place.
#[derive(Debug, Clone, Copy, Default)]
pub struct RegexPatcher;

impl FilePatcher for RegexPatcher {
    fn apply(&self, source_root: &Path, patch: &Patch) -> Result<PatchOutcome, PatchError> {
        let relative = Path::new(&patch.file);
        if relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir))
        {
            return Err(PatchError::OutsideSource(patch.file.clone()));
        }

        let path = source_root.join(relative);
        if !path.is_file() {
            return Err(PatchError::MissingFile(patch.file.clone()));
        }

        let re = Regex::new(&patch.pattern).map_err(|source| PatchError::InvalidPattern {
            pattern: patch.pattern.clone(),
            source,
        })?;

        let io_err = |source| PatchError::Io {
            path: path.clone(),
            source,
        };

        let content = std::fs::read_to_string(&path).map_err(io_err)?;
        let replacements = re.find_iter(&content).count();

        if replacements == 0 {
            if patch.required {
                return Err(PatchError::NoMatch {
                    file: patch.file.clone(),
                    pattern: patch.pattern.clone(),
                });
            }
            return Ok(PatchOutcome::Skipped);
        }

        let patched = re.replace_all(&content, patch.replacement.as_str());
        let permissions = std::fs::metadata(&path).map_err(io_err)?.permissions();
        let dir = path.parent().unwrap_or(source_root);

        let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(io_err)?;
        tmp.write_all(patched.as_bytes()).map_err(io_err)?;
        std::fs::set_permissions(tmp.path(), permissions).map_err(io_err)?;
        tmp.persist(&path).map_err(|e| io_err(e.error))?;

        Ok(PatchOutcome::Applied { replacements })
    }
}
