pub mod builder;
pub mod config;
pub mod db;
pub mod executor;
pub mod formulas;
pub mod host;
pub mod io;
pub mod params;
pub mod paths;
pub mod registry;
pub mod resolver;
pub mod verifier;

pub mod reporter;

pub use config::KilnConfig;
pub use executor::{
    BuildError, ExecutionReport, Executor, ExecutorConfig, FailurePolicy, Outcome, PackageOutcome,
};
pub use formulas::DescriptorSet;
pub use paths::*;
pub use registry::{InstallRecord, InstallRegistry};
pub use reporter::{NullReporter, Reporter};
pub use resolver::{BuildPlan, ResolveError, ResolveOptions, resolve, resolve_many};
pub use verifier::{Verification, Verifier};

/// User Agent string for source downloads
pub const USER_AGENT: &str = concat!("kiln/", env!("CARGO_PKG_VERSION"));
