//! Reporter trait for dependency injection
//!
//! This trait allows the executor to report progress and status without
//! being coupled to a specific terminal implementation.

use kiln_schema::{PackageName, Version};

pub trait Reporter: Send + Sync {
    /// Announce the packages about to be built, in plan order.
    fn prepare_plan(&self, packages: &[(PackageName, Version)]);

    /// Indicates a new section or phase has started (e.g. "Building", "Removing").
    fn section(&self, title: &str);

    /// Source (and resources) are being fetched.
    fn fetching(&self, name: &PackageName, version: &Version);

    /// A build step is starting (`step` is 1-based).
    fn building(&self, name: &PackageName, version: &Version, step: usize, total: usize, label: &str);

    /// Smoke checks are running.
    fn verifying(&self, name: &PackageName, version: &Version);

    /// Updates the state of a package to 'removing'.
    fn removing(&self, name: &PackageName, version: &Version);

    /// Marks a package operation as successfully completed.
    fn done(&self, name: &PackageName, version: &Version, detail: &str);

    /// Marks a package operation as failed with a specific reason.
    fn failed(&self, name: &PackageName, version: &Version, reason: &str);

    /// A package was not attempted.
    fn skipped(&self, name: &PackageName, version: &Version, reason: &str);

    /// Log an informational message.
    fn info(&self, msg: &str);

    /// Log a success message.
    fn success(&self, msg: &str);

    /// Log a warning message.
    fn warning(&self, msg: &str);

    /// Log an error message.
    fn error(&self, msg: &str);

    /// Display a final summary of multiple operations.
    fn summary(&self, count: usize, action: &str, elapsed_secs: f64);
}

impl<T: Reporter + ?Sized> Reporter for std::sync::Arc<T> {
    fn prepare_plan(&self, packages: &[(PackageName, Version)]) {
        (**self).prepare_plan(packages);
    }
    fn section(&self, title: &str) {
        (**self).section(title);
    }
    fn fetching(&self, name: &PackageName, version: &Version) {
        (**self).fetching(name, version);
    }
    fn building(&self, name: &PackageName, version: &Version, step: usize, total: usize, label: &str) {
        (**self).building(name, version, step, total, label);
    }
    fn verifying(&self, name: &PackageName, version: &Version) {
        (**self).verifying(name, version);
    }
    fn removing(&self, name: &PackageName, version: &Version) {
        (**self).removing(name, version);
    }
    fn done(&self, name: &PackageName, version: &Version, detail: &str) {
        (**self).done(name, version, detail);
    }
    fn failed(&self, name: &PackageName, version: &Version, reason: &str) {
        (**self).failed(name, version, reason);
    }
    fn skipped(&self, name: &PackageName, version: &Version, reason: &str) {
        (**self).skipped(name, version, reason);
    }
    fn info(&self, msg: &str) {
        (**self).info(msg);
    }
    fn success(&self, msg: &str) {
        (**self).success(msg);
    }
    fn warning(&self, msg: &str) {
        (**self).warning(msg);
    }
    fn error(&self, msg: &str) {
        (**self).error(msg);
    }
    fn summary(&self, count: usize, action: &str, elapsed_secs: f64) {
        (**self).summary(count, action, elapsed_secs);
    }
}

/// A no-op reporter for silent operations (e.g., verification, testing).
#[derive(Debug, Clone, Copy)]
pub struct NullReporter;

impl Reporter for NullReporter {
    fn prepare_plan(&self, _: &[(PackageName, Version)]) {}
    fn section(&self, _: &str) {}
    fn fetching(&self, _: &PackageName, _: &Version) {}
    fn building(&self, _: &PackageName, _: &Version, _: usize, _: usize, _: &str) {}
    fn verifying(&self, _: &PackageName, _: &Version) {}
    fn removing(&self, _: &PackageName, _: &Version) {}
    fn done(&self, _: &PackageName, _: &Version, _: &str) {}
    fn failed(&self, _: &PackageName, _: &Version, _: &str) {}
    fn skipped(&self, _: &PackageName, _: &Version, _: &str) {}
    fn info(&self, _: &str) {}
    fn success(&self, _: &str) {}
    fn warning(&self, _: &str) {}
    fn error(&self, _: &str) {}
    fn summary(&self, _: usize, _: &str, _: f64) {}
}
