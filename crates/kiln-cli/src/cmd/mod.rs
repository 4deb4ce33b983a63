pub mod check;
pub mod completions;
pub mod history;
pub mod info;
pub mod install;
pub mod list;
pub mod plan;
pub mod remove;

use kiln_schema::PackageName;

/// Command-line package arguments as names.
pub(crate) fn package_names(packages: &[String]) -> Vec<PackageName> {
    packages.iter().map(|p| PackageName::new(p)).collect()
}
