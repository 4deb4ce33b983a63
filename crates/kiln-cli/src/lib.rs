//! kiln - source builds for the openEMS stack
#![allow(missing_docs)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::missing_panics_doc)]
//!
//! Resolves TOML formulas into a build plan, builds each package into its own
//! keg and records the result in a SQLite state database.
//!
//! # Directory Layout
//!
//! ```text
//! ~/.kiln/
//! ├── cellar/     # Kegs: cellar/<name>/<version>
//! ├── cache/      # Downloaded archives (by sha256)
//! ├── logs/       # Build logs
//! ├── tmp/        # Work directories
//! ├── config.toml # Optional user configuration
//! └── state.db    # SQLite database
//! ```

pub mod cmd;
pub mod context;
pub mod ui;

pub use kiln_core::paths::*;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "kiln")]
#[command(author, version, about = "kiln - build the openEMS stack from source")]
pub struct Cli {
    /// Formula directories to search (overrides config.toml)
    #[arg(
        long = "formula-dir",
        global = true,
        env = "KILN_FORMULA_DIR",
        value_delimiter = ':'
    )]
    pub formula_dirs: Vec<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Print the build plan for one or more packages
    Plan {
        /// Package name(s)
        #[arg(required = true)]
        packages: Vec<String>,
        /// Also follow recommended dependencies
        #[arg(long)]
        with_recommended: bool,
        /// Plan the requested packages even when already installed
        #[arg(long)]
        reinstall: bool,
    },
    /// Build and install packages with their dependencies
    Install {
        /// Package name(s)
        #[arg(required = true)]
        packages: Vec<String>,
        /// Also follow recommended dependencies
        #[arg(long)]
        with_recommended: bool,
        /// Rebuild the requested packages even when already installed
        #[arg(long)]
        reinstall: bool,
        /// Build up to N independent packages at once
        #[arg(long, short = 'j', value_name = "N")]
        parallel: Option<usize>,
        /// Stop scheduling new packages after the first failure
        #[arg(long)]
        fail_fast: bool,
        /// Kill any build step running longer than SECS
        #[arg(long, value_name = "SECS")]
        step_timeout: Option<u64>,
        /// Show the plan without building anything
        #[arg(long)]
        dry_run: bool,
    },
    /// List installed packages
    List,
    /// Show formula and install details for a package
    Info {
        /// Package name
        package: String,
        /// Print the parsed formula as JSON
        #[arg(long)]
        json: bool,
    },
    /// Remove installed packages
    Remove {
        /// Package name(s)
        #[arg(required = true)]
        packages: Vec<String>,
        /// Remove even if other installed packages depend on it
        #[arg(long, short = 'f')]
        force: bool,
    },
    /// Re-run the smoke checks for an installed package
    Test {
        /// Package name
        package: String,
    },
    /// Show install history for a package
    History {
        /// Package name
        package: String,
    },
    /// Validate formulas: parse errors, dangling dependencies, cycles
    Check {
        /// Formula files or directories (defaults to the formula search path)
        paths: Vec<PathBuf>,
    },
    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        shell: clap_complete::Shell,
    },
}
