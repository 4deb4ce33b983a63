//! Formula directories.
//!
//! Search paths are read in order, and each directory's `*.toml` files are
//! read sorted by file name. That order is the declaration order the resolver
//! uses to break ties. When two directories define the same package, the
//! earlier directory wins.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;
use walkdir::WalkDir;

use kiln_schema::{Formula, FormulaError, PackageName};

#[derive(Error, Debug)]
#[error("{}: {source}", path.display())]
pub struct LoadError {
    pub path: PathBuf,
    #[source]
    pub source: FormulaError,
}

/// Every known formula, in declaration order.
#[derive(Debug, Clone, Default)]
pub struct DescriptorSet {
    formulas: Vec<Arc<Formula>>,
    index: HashMap<PackageName, usize>,
}

impl DescriptorSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `formula`, replacing (in place) any formula with the same name.
    pub fn insert(&mut self, formula: Formula) -> Option<Arc<Formula>> {
        let formula = Arc::new(formula);
        match self.index.get(formula.name()) {
            Some(&pos) => Some(std::mem::replace(&mut self.formulas[pos], formula)),
            None => {
                self.index.insert(formula.name().clone(), self.formulas.len());
                self.formulas.push(formula);
                None
            }
        }
    }

    /// Load every formula under `dirs`, failing on the first broken file.
    pub fn load(dirs: &[PathBuf]) -> Result<Self, LoadError> {
        let mut set = Self::new();
        for (path, result) in scan(dirs) {
            let formula = result.map_err(|source| LoadError {
                path: path.clone(),
                source,
            })?;
            set.insert_if_absent(formula, &path);
        }
        Ok(set)
    }

    /// Load what parses and collect the rest as errors.
    pub fn load_lenient(dirs: &[PathBuf]) -> (Self, Vec<LoadError>) {
        let mut set = Self::new();
        let mut errors = Vec::new();
        for (path, result) in scan(dirs) {
            match result {
                Ok(formula) => set.insert_if_absent(formula, &path),
                Err(source) => errors.push(LoadError { path, source }),
            }
        }
        (set, errors)
    }

    fn insert_if_absent(&mut self, formula: Formula, path: &Path) {
        if self.index.contains_key(formula.name()) {
            tracing::debug!(
                "Ignoring {} ({}): already defined earlier in the search path",
                formula.name(),
                path.display()
            );
            return;
        }
        self.insert(formula);
    }

    pub fn get(&self, name: &str) -> Option<&Arc<Formula>> {
        self.index.get(name).map(|&pos| &self.formulas[pos])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Declaration position of `name`.
    pub fn position(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<Formula>> {
        self.formulas.iter()
    }

    pub fn len(&self) -> usize {
        self.formulas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.formulas.is_empty()
    }
}

impl FromIterator<Formula> for DescriptorSet {
    fn from_iter<T: IntoIterator<Item = Formula>>(iter: T) -> Self {
        let mut set = Self::new();
        for formula in iter {
            set.insert(formula);
        }
        set
    }
}

/// Parse every `*.toml` file directly under each directory in `dirs`.
///
/// Directories that do not exist are skipped.
pub fn scan(dirs: &[PathBuf]) -> Vec<(PathBuf, Result<Formula, FormulaError>)> {
    let mut out = Vec::new();

    for dir in dirs {
        if !dir.is_dir() {
            tracing::debug!("Formula directory {} does not exist", dir.display());
            continue;
        }

        let files = WalkDir::new(dir)
            .min_depth(1)
            .max_depth(1)
            .sort_by_file_name()
            .into_iter()
            .filter_map(Result::ok)
            .filter(|e| e.file_type().is_file())
            .filter(|e| e.path().extension().is_some_and(|ext| ext == "toml"));

        for entry in files {
            let path = entry.into_path();
            let result = Formula::from_file(&path);
            out.push((path, result));
        }
    }

    out
}
