//! Shared command context.
//!
//! Groups the state most commands need: the home layout, user configuration,
//! the install registry and the terminal output handle.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context as _, Result};

use kiln_core::{DescriptorSet, InstallRegistry, KilnConfig, Layout};

use crate::ui::Output;

#[derive(Clone)]
pub struct Context {
    pub layout: Layout,
    pub config: KilnConfig,
    pub registry: Arc<InstallRegistry>,
    pub output: Output,
    formula_dirs: Vec<PathBuf>,
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("layout", &self.layout)
            .field("formula_dirs", &self.formula_dirs)
            .finish_non_exhaustive()
    }
}

impl Context {
    /// Open the home named by `$KILN_HOME` (or `~/.kiln`).
    ///
    /// `formula_dirs` from the command line replace the configured search
    /// path when non-empty.
    pub fn open(formula_dirs: &[PathBuf]) -> Result<Self> {
        Self::open_at(Layout::from_env(), formula_dirs)
    }

    pub fn open_at(layout: Layout, formula_dirs: &[PathBuf]) -> Result<Self> {
        let config = KilnConfig::load(&layout.config_path())?;
        let registry = InstallRegistry::open(&layout.db_path())
            .context("Failed to open state database")?;

        let formula_dirs = if formula_dirs.is_empty() {
            config.formula_dirs(&layout)
        } else {
            formula_dirs.to_vec()
        };
        tracing::debug!("Formula search path: {formula_dirs:?}");

        Ok(Self {
            layout,
            config,
            registry: Arc::new(registry),
            output: Output::new(),
            formula_dirs,
        })
    }

    pub fn formula_dirs(&self) -> &[PathBuf] {
        &self.formula_dirs
    }

    /// Load every formula on the search path.
    pub fn descriptors(&self) -> Result<DescriptorSet> {
        let set = DescriptorSet::load(&self.formula_dirs).context("Failed to load formulas")?;
        if set.is_empty() {
            tracing::warn!("No formulas found in {:?}", self.formula_dirs);
        }
        Ok(set)
    }
}
