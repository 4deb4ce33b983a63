//! TOML formula definitions.
//!
//! A formula describes one package: where its source lives, what it depends
//! on, how to build it, and how to smoke-test the result. Build steps and test
//! commands are templates; placeholders such as `{{prefix}}` or
//! `{{deps.fparser}}` are filled in by the executor from the install registry.

use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::hash::Sha256Digest;
use crate::requirement::Requirement;
use crate::types::{PackageName, Version};

/// Errors that can occur when loading or parsing a formula.
#[derive(Error, Debug)]
pub enum FormulaError {
    /// An I/O error occurred while reading a formula file.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The TOML content could not be deserialized into a valid formula.
    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    /// The formula parsed but is internally inconsistent.
    #[error("Invalid formula '{name}': {reason}")]
    Invalid {
        /// Name of the offending formula.
        name: PackageName,
        /// Human-readable description of the problem.
        reason: String,
    },
}

/// Metadata describing a package's identity and provenance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackageInfo {
    /// Unique name that identifies this package.
    pub name: PackageName,
    /// Version string for the release this formula builds.
    pub version: Version,
    /// Short human-readable summary of the package.
    #[serde(default)]
    pub description: String,
    /// URL of the project's homepage.
    #[serde(default)]
    pub homepage: String,
    /// SPDX license identifier for the package.
    #[serde(default)]
    pub license: String,
}

/// Where a package's source comes from.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SourceRef {
    /// A git repository pinned to a specific commit.
    Git {
        /// Clone URL.
        git: String,
        /// Commit to check out.
        revision: String,
        /// Branch the revision lives on (informational).
        #[serde(default, skip_serializing_if = "Option::is_none")]
        branch: Option<String>,
    },
    /// A checksummed source archive (`.tar.gz`).
    Archive {
        /// Download URL, `file://` URL, or local path.
        url: String,
        /// Expected SHA-256 digest of the archive.
        sha256: Sha256Digest,
    },
    /// A package provided by the host system instead of being built.
    Host {
        /// How to locate the package on the host.
        host: HostProbe,
    },
}

impl SourceRef {
    /// The pinned revision, for git sources.
    pub fn revision(&self) -> Option<&str> {
        match self {
            Self::Git { revision, .. } => Some(revision),
            _ => None,
        }
    }

    /// Returns `true` for host-provided packages.
    pub fn is_host(&self) -> bool {
        matches!(self, Self::Host { .. })
    }

    /// Short description for listings.
    pub fn describe(&self) -> String {
        match self {
            Self::Git { git, revision, .. } => {
                let short = revision.get(..7).unwrap_or(revision);
                format!("{git}@{short}")
            }
            Self::Archive { url, .. } => url.clone(),
            Self::Host { host } => host.describe(),
        }
    }
}

/// Rules for locating a host-provided package.
///
/// Candidate prefixes are tried in order; the first one containing `probe`
/// (or simply existing, when no probe is given) wins. Failing that, `which`
/// names a binary on `PATH` whose grandparent directory becomes the prefix.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HostProbe {
    /// Binary to look up on `PATH` (e.g. `cmake`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub which: Option<String>,
    /// Candidate install prefixes (e.g. `/opt/homebrew/opt/vtk`).
    #[serde(default)]
    pub prefixes: Vec<String>,
    /// Path relative to a prefix that must exist (e.g. `lib/cmake/vtk`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub probe: Option<String>,
}

impl HostProbe {
    fn describe(&self) -> String {
        match (&self.which, self.prefixes.first()) {
            (Some(bin), _) => format!("host:{bin}"),
            (None, Some(prefix)) => format!("host:{prefix}"),
            (None, None) => "host".to_string(),
        }
    }
}

/// When a dependency is needed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DependencyKind {
    /// Needed only while building (e.g. `cmake`).
    Build,
    /// Needed at build time and when the package runs.
    Runtime,
    /// Optional; only pulled in when explicitly requested.
    Recommended,
}

impl std::fmt::Display for DependencyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Build => write!(f, "build"),
            Self::Runtime => write!(f, "runtime"),
            Self::Recommended => write!(f, "recommended"),
        }
    }
}

/// A dependency entry as written in a formula: a bare name or a table with a
/// constraint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DependencySpec {
    /// `"csxcad"`
    Name(PackageName),
    /// `{ name = "csxcad", version = "^0.6" }`
    Detailed {
        /// Dependency name.
        name: PackageName,
        /// Semver range or exact version the installed copy must satisfy.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        version: Option<String>,
        /// Git revision the installed copy must have been built from.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        revision: Option<String>,
    },
}

impl DependencySpec {
    /// The dependency's name.
    pub fn name(&self) -> &PackageName {
        match self {
            Self::Name(name) | Self::Detailed { name, .. } => name,
        }
    }

    /// The constraint this entry places on an installed copy.
    pub fn requirement(&self) -> Requirement {
        match self {
            Self::Name(_) => Requirement::Any,
            Self::Detailed {
                revision: Some(rev),
                ..
            } => Requirement::revision(rev),
            Self::Detailed {
                version: Some(v), ..
            } => Requirement::parse_version(v),
            Self::Detailed { .. } => Requirement::Any,
        }
    }
}

/// Dependency lists grouped by when they are required.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Dependencies {
    /// Packages required only during the build phase.
    #[serde(default)]
    pub build: Vec<DependencySpec>,
    /// Packages required at build time and at runtime.
    #[serde(default)]
    pub runtime: Vec<DependencySpec>,
    /// Optional packages that enable extra functionality (GUI, bindings).
    #[serde(default)]
    pub recommended: Vec<DependencySpec>,
}

/// A resolved dependency edge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dependency {
    /// Name of the package depended upon.
    pub name: PackageName,
    /// When it is needed.
    pub kind: DependencyKind,
    /// Constraint on the installed copy.
    pub requirement: Requirement,
}

impl Dependencies {
    /// All edges in declaration order: build, then runtime, then recommended.
    ///
    /// A name listed twice keeps its first occurrence.
    pub fn all(&self) -> Vec<Dependency> {
        let groups = [
            (DependencyKind::Build, &self.build),
            (DependencyKind::Runtime, &self.runtime),
            (DependencyKind::Recommended, &self.recommended),
        ];

        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for (kind, specs) in groups {
            for spec in specs {
                if seen.insert(spec.name().clone()) {
                    out.push(Dependency {
                        name: spec.name().clone(),
                        kind,
                        requirement: spec.requirement(),
                    });
                }
            }
        }
        out
    }

    /// Returns `true` if no dependencies are declared.
    pub fn is_empty(&self) -> bool {
        self.build.is_empty() && self.runtime.is_empty() && self.recommended.is_empty()
    }
}

/// An auxiliary archive fetched alongside the main source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Resource {
    /// Name used for the `{{resources.<name>}}` parameter.
    pub name: String,
    /// Download URL, `file://` URL, or local path.
    pub url: String,
    /// Expected SHA-256 digest of the archive.
    pub sha256: Sha256Digest,
}

/// A regex substitution applied to a source file before the first build step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Patch {
    /// File path relative to the source root.
    pub file: String,
    /// Regular expression to search for.
    pub pattern: String,
    /// Replacement text (regex capture syntax allowed).
    #[serde(default)]
    pub replacement: String,
    /// Fail the build when the pattern does not match.
    #[serde(default = "default_true")]
    pub required: bool,
}

fn default_true() -> bool {
    true
}

/// `CMake` phase for [`BuildStep::Cmake`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CmakeStage {
    /// `cmake -S <source> -B <source>/build <std args> -D...`
    Configure,
    /// `cmake --build <source>/build --parallel <jobs>`
    Build,
    /// `cmake --install <source>/build`
    Install,
}

impl std::fmt::Display for CmakeStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Configure => write!(f, "configure"),
            Self::Build => write!(f, "build"),
            Self::Install => write!(f, "install"),
        }
    }
}

/// One typed build action.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "run", rename_all = "kebab-case")]
pub enum BuildStep {
    /// A `CMake` phase with the standard arguments filled in.
    Cmake {
        /// Which phase to run.
        stage: CmakeStage,
        /// `-D<key>=<value>` definitions (configure only).
        #[serde(default)]
        defines: BTreeMap<String, String>,
        /// Extra raw arguments appended to the command.
        #[serde(default)]
        args: Vec<String>,
        /// Extra environment variables.
        #[serde(default)]
        env: BTreeMap<String, String>,
    },
    /// An arbitrary program.
    Command {
        /// Program to run (looked up on the step's `PATH`).
        program: String,
        /// Arguments.
        #[serde(default)]
        args: Vec<String>,
        /// Extra environment variables.
        #[serde(default)]
        env: BTreeMap<String, String>,
        /// Working directory; defaults to the source root.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        dir: Option<String>,
    },
}

impl BuildStep {
    /// Short label for progress output (`cmake configure`, `ar`).
    pub fn label(&self) -> String {
        match self {
            Self::Cmake { stage, .. } => format!("cmake {stage}"),
            Self::Command { program, .. } => program.clone(),
        }
    }
}

/// A post-install smoke check.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "check", rename_all = "kebab-case")]
pub enum TestSpec {
    /// A path relative to the install prefix must exist.
    PathExists {
        /// Relative path such as `bin/AppCSXCAD`.
        path: String,
    },
    /// Run a program in a scratch directory and require a zero exit status.
    Run {
        /// Program to run.
        program: String,
        /// Arguments.
        #[serde(default)]
        args: Vec<String>,
        /// Files written into the scratch directory first (name -> contents).
        #[serde(default)]
        files: BTreeMap<String, String>,
        /// Substring the combined output must contain.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        expect_stdout: Option<String>,
    },
}

impl TestSpec {
    /// Short label for reports.
    pub fn label(&self) -> String {
        match self {
            Self::PathExists { path } => format!("exists {path}"),
            Self::Run { program, .. } => format!("run {program}"),
        }
    }
}

/// Post-install hints (printed, never executed)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Hints {
    /// Message to display after installation
    #[serde(default)]
    pub post_install: String,
}

/// Complete formula: metadata, source, dependencies, build steps and checks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Formula {
    /// Core metadata (name, version, description, etc.).
    pub package: PackageInfo,
    /// Where the source comes from.
    pub source: SourceRef,
    /// Build, runtime, and recommended dependency lists.
    #[serde(default)]
    pub dependencies: Dependencies,
    /// Auxiliary archives (`[[resource]]`).
    #[serde(default, rename = "resource", skip_serializing_if = "Vec::is_empty")]
    pub resources: Vec<Resource>,
    /// Source patches (`[[patch]]`), applied before the first build step.
    #[serde(default, rename = "patch", skip_serializing_if = "Vec::is_empty")]
    pub patches: Vec<Patch>,
    /// Ordered build steps (`[[build]]`).
    #[serde(default, rename = "build", skip_serializing_if = "Vec::is_empty")]
    pub steps: Vec<BuildStep>,
    /// Post-install checks (`[[test]]`).
    #[serde(default, rename = "test", skip_serializing_if = "Vec::is_empty")]
    pub tests: Vec<TestSpec>,
    /// Post-install messages displayed to the user.
    #[serde(default)]
    pub hints: Hints,
}

impl Formula {
    /// Parse and validate a formula from a TOML file on disk.
    ///
    /// # Errors
    ///
    /// Returns `FormulaError::Io` if the file cannot be read,
    /// `FormulaError::Parse` if the TOML content is invalid, or
    /// `FormulaError::Invalid` if validation fails.
    pub fn from_file(path: &Path) -> Result<Self, FormulaError> {
        let content = fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Parse and validate a formula from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns `FormulaError::Parse` if the TOML content is invalid, or
    /// `FormulaError::Invalid` if validation fails.
    pub fn parse(content: &str) -> Result<Self, FormulaError> {
        let formula: Self = toml::from_str(content)?;
        formula.validate()?;
        Ok(formula)
    }

    /// Serialize this formula to a pretty-printed TOML string.
    ///
    /// # Errors
    ///
    /// Returns a `toml::ser::Error` if serialization fails.
    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }

    /// Package name.
    pub fn name(&self) -> &PackageName {
        &self.package.name
    }

    /// Package version.
    pub fn version(&self) -> &Version {
        &self.package.version
    }

    /// Pinned source revision, for git sources.
    pub fn revision(&self) -> Option<&str> {
        self.source.revision()
    }

    /// Dependency edges in declaration order.
    pub fn dependencies(&self) -> Vec<Dependency> {
        self.dependencies.all()
    }

    /// Check internal consistency.
    ///
    /// # Errors
    ///
    /// Returns `FormulaError::Invalid` describing the first problem found.
    pub fn validate(&self) -> Result<(), FormulaError> {
        let invalid = |reason: String| FormulaError::Invalid {
            name: self.package.name.clone(),
            reason,
        };

        if self.package.name.is_empty() {
            return Err(invalid("package name is empty".to_string()));
        }
        if self.package.version.is_empty() {
            return Err(invalid("version is empty".to_string()));
        }

        if self
            .dependencies
            .all()
            .iter()
            .any(|d| d.name == self.package.name)
        {
            return Err(invalid("package depends on itself".to_string()));
        }

        let mut resource_names = HashSet::new();
        for resource in &self.resources {
            if !resource_names.insert(resource.name.as_str()) {
                return Err(invalid(format!("duplicate resource '{}'", resource.name)));
            }
        }

        if self.source.is_host()
            && !(self.steps.is_empty() && self.patches.is_empty() && self.resources.is_empty())
        {
            return Err(invalid(
                "host packages cannot declare build steps, patches or resources".to_string(),
            ));
        }

        if let SourceRef::Host { host } = &self.source {
            if host.which.is_none() && host.prefixes.is_empty() {
                return Err(invalid(
                    "host source needs `which` or at least one prefix".to_string(),
                ));
            }
        }

        Ok(())
    }
}

impl std::str::FromStr for Formula {
    type Err = FormulaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const QCSXCAD: &str = r#"
[package]
name = "qcsxcad"
version = "0.6.4"
description = "Qt-based GUI library for CSXCAD visualization"
homepage = "https://github.com/thliebig/QCSXCAD"
license = "LGPL-3.0-or-later"

[source]
git = "https://github.com/thliebig/QCSXCAD.git"
revision = "63ac6f8c623665f06fdb35765048cb52c7190ce0"

[dependencies]
build = ["cmake", "pkg-config"]
runtime = [{ name = "csxcad", revision = "d7d70ef" }, "fparser", "qt", "vtk"]

[[patch]]
file = "CMakeLists.txt"
pattern = '(?i)cmake_policy\s*\(\s*SET\s+CMP0020\s+OLD\s*\)'
required = false

[[build]]
run = "cmake"
stage = "configure"
defines = { CSXCAD_ROOT_DIR = "{{deps.csxcad}}", BUILD_SHARED_LIBS = "ON" }
env = { Qt6_DIR = "{{deps.qt}}/lib/cmake/Qt6" }

[[build]]
run = "cmake"
stage = "build"

[[build]]
run = "cmake"
stage = "install"

[[test]]
check = "path-exists"
path = "lib"
"#;

    #[test]
    fn test_parse_formula() {
        let f = Formula::parse(QCSXCAD).unwrap();
        assert_eq!(f.name(), &PackageName::new("qcsxcad"));
        assert_eq!(f.version(), "0.6.4");
        assert_eq!(
            f.revision(),
            Some("63ac6f8c623665f06fdb35765048cb52c7190ce0")
        );
        assert_eq!(f.steps.len(), 3);
        assert_eq!(f.steps[0].label(), "cmake configure");
        assert_eq!(f.patches.len(), 1);
        assert!(!f.patches[0].required);
        assert_eq!(f.patches[0].replacement, "");
        assert_eq!(f.tests.len(), 1);
    }

    #[test]
    fn test_dependency_order_and_kinds() {
        let f = Formula::parse(QCSXCAD).unwrap();
        let deps = f.dependencies();
        let names: Vec<&str> = deps.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["cmake", "pkg-config", "csxcad", "fparser", "qt", "vtk"]);
        assert_eq!(deps[0].kind, DependencyKind::Build);
        assert_eq!(deps[2].kind, DependencyKind::Runtime);
        assert_eq!(deps[2].requirement, Requirement::revision("d7d70ef"));
        assert_eq!(deps[3].requirement, Requirement::Any);
    }

    #[test]
    fn test_duplicate_dependency_keeps_first() {
        let deps = Dependencies {
            build: vec![DependencySpec::Name("cmake".into())],
            runtime: vec![DependencySpec::Name("cmake".into())],
            recommended: vec![],
        };
        let all = deps.all();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].kind, DependencyKind::Build);
    }

    #[test]
    fn test_archive_source() {
        let toml = r#"
[package]
name = "tinyxml"
version = "2.6.2"

[source]
url = "https://downloads.sourceforge.net/project/tinyxml/tinyxml/2.6.2/tinyxml_2_6_2.tar.gz"
sha256 = "15bdfdcec58a7da30adc87ac2b078e4417dbe5392f3afb719f9ba6d062645593"
"#;
        let f = Formula::parse(toml).unwrap();
        assert!(matches!(f.source, SourceRef::Archive { .. }));
        assert_eq!(f.revision(), None);
    }

    #[test]
    fn test_bad_checksum_rejected() {
        let toml = r#"
[package]
name = "tinyxml"
version = "2.6.2"

[source]
url = "https://example.com/tinyxml.tar.gz"
sha256 = "abc"
"#;
        assert!(Formula::parse(toml).is_err());
    }

    #[test]
    fn test_host_source() {
        let toml = r#"
[package]
name = "vtk"
version = "9"

[source.host]
prefixes = ["/opt/homebrew/opt/vtk", "/usr/local/opt/vtk"]
probe = "lib/cmake"
"#;
        let f = Formula::parse(toml).unwrap();
        assert!(f.source.is_host());
        assert_eq!(f.source.describe(), "host:/opt/homebrew/opt/vtk");
    }

    #[test]
    fn test_host_with_steps_is_invalid() {
        let toml = r#"
[package]
name = "cmake"
version = "3"

[source.host]
which = "cmake"

[[build]]
run = "command"
program = "true"
"#;
        let err = Formula::parse(toml).unwrap_err();
        assert!(err.to_string().contains("host packages"));
    }

    #[test]
    fn test_self_dependency_is_invalid() {
        let toml = r#"
[package]
name = "fparser"
version = "4.5.2.1"

[source]
git = "https://github.com/thliebig/fparser.git"
revision = "e625e262620036a52d1dc9abc122d2bf67397e40"

[dependencies]
runtime = ["fparser"]
"#;
        let err = Formula::parse(toml).unwrap_err();
        assert!(err.to_string().contains("depends on itself"));
    }

    #[test]
    fn test_round_trip_toml() {
        let f = Formula::parse(QCSXCAD).unwrap();
        let again = Formula::parse(&f.to_toml().unwrap()).unwrap();
        assert_eq!(again.name(), f.name());
        assert_eq!(again.steps.len(), f.steps.len());
        assert_eq!(again.dependencies(), f.dependencies());
    }
}
