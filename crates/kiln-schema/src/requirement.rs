//! Version and revision constraints attached to dependency edges.

use crate::types::Version;

/// What a dependent requires of an installed dependency.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Requirement {
    /// Any installed version will do.
    #[default]
    Any,
    /// A pinned VCS revision. Matches when one revision is a prefix of the
    /// other, so short and full hashes compare equal.
    Revision(String),
    /// A semver range (`^0.6`, `>=4.5, <5`). Bare versions follow Cargo's
    /// caret semantics.
    Range(semver::VersionReq),
    /// A version string that is not valid semver; compared verbatim.
    Exact(Version),
}

impl Requirement {
    /// Parse a version constraint as written in a formula.
    ///
    /// Empty strings, `*` and `latest` mean [`Requirement::Any`].
    pub fn parse_version(s: &str) -> Self {
        let s = s.trim();
        if s.is_empty() || s == "*" || s == "latest" {
            return Self::Any;
        }
        match semver::VersionReq::parse(s) {
            Ok(req) => Self::Range(req),
            Err(_) => Self::Exact(Version::new(s)),
        }
    }

    /// Build a revision pin.
    pub fn revision(rev: &str) -> Self {
        Self::Revision(rev.trim().to_lowercase())
    }

    /// Whether an install at `version` (built from `revision`, if any)
    /// satisfies this requirement.
    pub fn matches(&self, version: &Version, revision: Option<&str>) -> bool {
        match self {
            Self::Any => true,
            Self::Revision(pin) => revision.is_some_and(|installed| {
                let installed = installed.to_lowercase();
                !installed.is_empty() && (installed.starts_with(pin) || pin.starts_with(&installed))
            }),
            Self::Range(req) => version.to_semver().is_some_and(|v| req.matches(&v)),
            Self::Exact(expected) => expected == version,
        }
    }
}

impl std::fmt::Display for Requirement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Any => write!(f, "*"),
            Self::Revision(rev) => write!(f, "@{rev}"),
            Self::Range(req) => write!(f, "{req}"),
            Self::Exact(v) => write!(f, "={v}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn any_matches_everything() {
        let req = Requirement::parse_version("");
        assert_eq!(req, Requirement::Any);
        assert!(req.matches(&Version::new("0.0.1"), None));
    }

    #[test]
    fn caret_range_on_short_versions() {
        let req = Requirement::parse_version("^0.6");
        assert!(req.matches(&Version::new("0.6.4"), None));
        assert!(!req.matches(&Version::new("0.7.0"), None));
    }

    #[test]
    fn range_against_four_component_version() {
        let req = Requirement::parse_version(">=4.5");
        assert!(req.matches(&Version::new("4.5.2.1"), None));
    }

    #[test]
    fn non_semver_falls_back_to_exact() {
        let req = Requirement::parse_version("4.5.2.1");
        assert_eq!(req, Requirement::Exact(Version::new("4.5.2.1")));
        assert!(req.matches(&Version::new("4.5.2.1"), None));
        assert!(!req.matches(&Version::new("4.5.2.2"), None));
    }

    #[test]
    fn revision_prefix_match() {
        let req = Requirement::revision("d7d70ef");
        let v = Version::new("0.6.4");
        assert!(req.matches(&v, Some("d7d70ef7ea9ab91fcfd3ed2ab1b3a5a0d03b7fbe")));
        assert!(!req.matches(&v, Some("e625e262620036a52d1dc9abc122d2bf67397e40")));
        assert!(!req.matches(&v, None));
    }
}
