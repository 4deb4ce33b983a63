use serde::{Deserialize, Serialize};
use std::borrow::Borrow;

/// A normalized package name.
///
/// Names are case-insensitive identity keys: `CSXCAD` and `csxcad` refer to
/// the same formula.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct PackageName(String);

impl PackageName {
    /// Create a new package name, normalizing the input to lowercase.
    pub fn new(name: &str) -> Self {
        Self(name.trim().to_lowercase())
    }

    /// Return the normalized name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Name as used in environment variable keys (`qt-base` -> `QT_BASE`).
    pub fn env_key(&self) -> String {
        self.0.to_uppercase().replace(['-', '.', '+'], "_")
    }
}

impl std::fmt::Display for PackageName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::ops::Deref for PackageName {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl AsRef<str> for PackageName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl AsRef<std::path::Path> for PackageName {
    fn as_ref(&self) -> &std::path::Path {
        std::path::Path::new(&self.0)
    }
}

impl PartialEq<str> for PackageName {
    fn eq(&self, other: &str) -> bool {
        self.0 == other.to_lowercase()
    }
}

impl PartialEq<&str> for PackageName {
    fn eq(&self, other: &&str) -> bool {
        self.0 == other.to_lowercase()
    }
}

impl Borrow<str> for PackageName {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for PackageName {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for PackageName {
    fn from(s: String) -> Self {
        Self::new(&s)
    }
}

impl From<PackageName> for String {
    fn from(name: PackageName) -> Self {
        name.0
    }
}

/// A version string as declared by a formula.
///
/// Stored verbatim. Formulas in the wild use plain semver (`0.6.4`), short
/// forms (`3`) and four-component versions (`4.5.2.1`), so ordering and range
/// matching go through [`Version::to_semver`], which parses leniently.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Version(String);

impl Ord for Version {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        match (self.to_semver(), other.to_semver()) {
            (Some(a), Some(b)) => a.cmp(&b).then_with(|| self.0.cmp(&other.0)),
            (Some(_), None) => std::cmp::Ordering::Less,
            (None, Some(_)) => std::cmp::Ordering::Greater,
            (None, None) => self.0.cmp(&other.0),
        }
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Version {
    /// Create a new version from the given string (stored as-is).
    pub fn new(v: &str) -> Self {
        Self(v.trim().to_string())
    }

    /// Return the version string as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Interpret this version as semver, padding missing components and
    /// dropping anything past the patch number.
    ///
    /// `0.0.37` -> `0.0.37`, `3` -> `3.0.0`, `4.5.2.1` -> `4.5.2`,
    /// `v1.2` -> `1.2.0`. Returns `None` for revisions and other non-numeric
    /// strings.
    pub fn to_semver(&self) -> Option<semver::Version> {
        let raw = self.0.strip_prefix('v').unwrap_or(&self.0);
        if let Ok(v) = semver::Version::parse(raw) {
            return Some(v);
        }

        let mut parts = [0u64; 3];
        let mut seen = 0;
        for (i, segment) in raw.split('.').enumerate() {
            let n = segment.parse::<u64>().ok()?;
            if i < 3 {
                parts[i] = n;
            }
            seen += 1;
        }
        if seen == 0 {
            return None;
        }
        Some(semver::Version::new(parts[0], parts[1], parts[2]))
    }
}

impl std::fmt::Display for Version {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::ops::Deref for Version {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl AsRef<str> for Version {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl AsRef<std::path::Path> for Version {
    fn as_ref(&self) -> &std::path::Path {
        std::path::Path::new(&self.0)
    }
}

impl From<&str> for Version {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for Version {
    fn from(s: String) -> Self {
        Self::new(&s)
    }
}

impl PartialEq<str> for Version {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for Version {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_are_case_insensitive() {
        assert_eq!(PackageName::new("CSXCAD"), PackageName::new("csxcad"));
        assert_eq!(PackageName::new("QCSXCAD"), "qcsxcad");
    }

    #[test]
    fn env_key_replaces_separators() {
        assert_eq!(PackageName::new("pkg-config").env_key(), "PKG_CONFIG");
        assert_eq!(PackageName::new("qt.base").env_key(), "QT_BASE");
    }

    #[test]
    fn lenient_semver() {
        assert_eq!(
            Version::new("0.0.37").to_semver(),
            Some(semver::Version::new(0, 0, 37))
        );
        assert_eq!(Version::new("3").to_semver(), Some(semver::Version::new(3, 0, 0)));
        assert_eq!(
            Version::new("4.5.2.1").to_semver(),
            Some(semver::Version::new(4, 5, 2))
        );
        assert_eq!(Version::new("v1.2").to_semver(), Some(semver::Version::new(1, 2, 0)));
        assert_eq!(Version::new("d7d70ef").to_semver(), None);
    }

    #[test]
    fn ordering_prefers_semver() {
        let mut versions = vec![
            Version::new("0.6.10"),
            Version::new("0.6.4"),
            Version::new("head"),
            Version::new("0.2.3"),
        ];
        versions.sort();
        assert_eq!(versions[0], "0.2.3");
        assert_eq!(versions[1], "0.6.4");
        assert_eq!(versions[2], "0.6.10");
        assert_eq!(versions[3], "head");
    }
}
