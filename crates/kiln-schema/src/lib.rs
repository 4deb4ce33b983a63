//! Shared types and the TOML formula format for kiln.

pub mod formula;
/// Validated SHA-256 digests.
pub mod hash;
pub mod requirement;
/// Package name and version newtypes.
pub mod types;

// Re-exports
pub use formula::{
    BuildStep, CmakeStage, Dependencies, Dependency, DependencyKind, DependencySpec, Formula,
    FormulaError, Hints, HostProbe, PackageInfo, Patch, Resource, SourceRef, TestSpec,
};
pub use hash::{DigestError, Sha256Digest};
pub use requirement::Requirement;
pub use types::{PackageName, Version};
