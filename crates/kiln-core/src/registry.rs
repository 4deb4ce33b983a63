//! Install registry: the single source of truth for what is installed where.
//!
//! Readers get `Arc<InstallRecord>` snapshots out of an `RwLock`ed map, so a
//! lookup observes either the previous record or the fully committed new one.
//! When backed by a [`StateDb`], every commit is written to SQLite in one
//! transaction before it is published in memory.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use chrono::{DateTime, Utc};
use thiserror::Error;

use kiln_schema::{PackageName, Requirement, Version};

use crate::db::{DbError, StateDb};

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("State database error: {0}")]
    Db(#[from] DbError),
}

/// One completed install.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallRecord {
    pub name: PackageName,
    pub version: Version,
    /// Git revision the keg was built from, if any.
    pub revision: Option<String>,
    pub install_path: PathBuf,
    /// `true` for packages located on the host instead of built.
    pub host: bool,
    pub completed_at: DateTime<Utc>,
}

impl InstallRecord {
    pub fn new(
        name: impl Into<PackageName>,
        version: impl Into<Version>,
        revision: Option<String>,
        install_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            revision,
            install_path: install_path.into(),
            host: false,
            completed_at: Utc::now(),
        }
    }

    pub fn satisfies(&self, requirement: &Requirement) -> bool {
        requirement.matches(&self.version, self.revision.as_deref())
    }
}

/// A row of install history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryEntry {
    pub record: InstallRecord,
    /// `false` once superseded by a reinstall.
    pub active: bool,
}

#[derive(Debug, Default)]
struct Inner {
    active: HashMap<PackageName, Arc<InstallRecord>>,
    superseded: Vec<Arc<InstallRecord>>,
}

#[derive(Debug)]
pub struct InstallRegistry {
    inner: RwLock<Inner>,
    db: Option<Mutex<StateDb>>,
}

impl InstallRegistry {
    /// A registry with no backing store.
    pub fn in_memory() -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
            db: None,
        }
    }

    /// Open the registry persisted at `path`, loading every active record.
    pub fn open(path: &Path) -> Result<Self, RegistryError> {
        let db = StateDb::open_at(path)?;
        let active = db
            .active()?
            .into_iter()
            .map(|r| (r.name.clone(), Arc::new(r)))
            .collect();

        tracing::debug!("Opened install registry at {}", path.display());

        Ok(Self {
            inner: RwLock::new(Inner {
                active,
                superseded: Vec::new(),
            }),
            db: Some(Mutex::new(db)),
        })
    }

    pub fn lookup(&self, name: &str) -> Option<Arc<InstallRecord>> {
        self.read().active.get(name).cloned()
    }

    /// Does an installed copy of `name` satisfy `requirement`?
    pub fn satisfies(&self, name: &str, requirement: &Requirement) -> bool {
        self.lookup(name).is_some_and(|r| r.satisfies(requirement))
    }

    /// Commit `record`, superseding any previous install of the same package.
    pub fn record(&self, record: InstallRecord) -> Result<Arc<InstallRecord>, RegistryError> {
        // Held across both writes so concurrent commits cannot interleave.
        let mut db = self
            .db
            .as_ref()
            .map(|db| db.lock().unwrap_or_else(PoisonError::into_inner));

        if let Some(db) = db.as_mut() {
            db.commit(&record)?;
        }

        let record = Arc::new(record);
        let mut inner = self.write();
        if let Some(old) = inner.active.insert(record.name.clone(), Arc::clone(&record)) {
            tracing::debug!("{} {} superseded by {}", old.name, old.version, record.version);
            inner.superseded.push(old);
        }
        Ok(record)
    }

    /// Forget every record for `name`. Returns the active record, if any.
    pub fn remove(&self, name: &str) -> Result<Option<Arc<InstallRecord>>, RegistryError> {
        let db = self
            .db
            .as_ref()
            .map(|db| db.lock().unwrap_or_else(PoisonError::into_inner));

        if let Some(db) = db.as_ref() {
            db.remove(name)?;
        }

        let mut inner = self.write();
        inner.superseded.retain(|r| r.name != name);
        Ok(inner.active.remove(name))
    }

    /// Active records, ordered by name.
    pub fn list(&self) -> Vec<Arc<InstallRecord>> {
        let mut records: Vec<_> = self.read().active.values().cloned().collect();
        records.sort_by(|a, b| a.name.cmp(&b.name));
        records
    }

    /// Every install of `name`, newest first.
    pub fn history(&self, name: &str) -> Result<Vec<HistoryEntry>, RegistryError> {
        if let Some(db) = &self.db {
            let db = db.lock().unwrap_or_else(PoisonError::into_inner);
            return Ok(db.history(name)?);
        }

        let inner = self.read();
        let current = inner.active.get(name).map(|r| HistoryEntry {
            record: (**r).clone(),
            active: true,
        });
        let past = inner
            .superseded
            .iter()
            .rev()
            .filter(|r| r.name == name)
            .map(|r| HistoryEntry {
                record: (**r).clone(),
                active: false,
            });
        Ok(current.into_iter().chain(past).collect())
    }

    pub fn is_persistent(&self) -> bool {
        self.db.is_some()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Inner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Inner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for InstallRegistry {
    fn default() -> Self {
        Self::in_memory()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn record(name: &str, version: &str, revision: Option<&str>) -> InstallRecord {
        InstallRecord::new(
            name,
            version,
            revision.map(str::to_string),
            format!("/kiln/cellar/{name}/{version}"),
        )
    }

    #[test]
    fn lookup_record_remove() {
        let registry = InstallRegistry::in_memory();
        assert!(registry.lookup("fparser").is_none());

        registry.record(record("fparser", "4.5.2.1", None)).unwrap();
        let found = registry.lookup("fparser").unwrap();
        assert_eq!(found.version, "4.5.2.1");

        let removed = registry.remove("fparser").unwrap();
        assert!(removed.is_some());
        assert!(registry.lookup("fparser").is_none());
        assert!(registry.remove("fparser").unwrap().is_none());
    }

    #[test]
    fn compatible_version_queries() {
        let registry = InstallRegistry::in_memory();
        registry
            .record(record(
                "csxcad",
                "0.6.4",
                Some("d7d70ef1c2d3e4f5a6b7c8d9e0f1a2b3c4d5e6f7"),
            ))
            .unwrap();
        registry.record(record("fparser", "4.5.2.1", None)).unwrap();

        assert!(registry.satisfies("csxcad", &Requirement::Any));
        assert!(registry.satisfies("csxcad", &Requirement::revision("d7d70ef")));
        assert!(!registry.satisfies("csxcad", &Requirement::revision("63ac6f8")));
        assert!(registry.satisfies("csxcad", &Requirement::parse_version("^0.6")));
        assert!(!registry.satisfies("csxcad", &Requirement::parse_version(">=0.7")));
        assert!(registry.satisfies("fparser", &Requirement::parse_version("~4.5")));
        assert!(!registry.satisfies("openems", &Requirement::Any));
    }

    #[test]
    fn snapshots_survive_supersede() {
        let registry = InstallRegistry::in_memory();
        registry.record(record("openems", "0.0.36", None)).unwrap();
        let before = registry.lookup("openems").unwrap();

        registry.record(record("openems", "0.0.37", None)).unwrap();

        assert_eq!(before.version, "0.0.36");
        assert_eq!(registry.lookup("openems").unwrap().version, "0.0.37");

        let history = registry.history("openems").unwrap();
        assert_eq!(history.len(), 2);
        assert!(history[0].active);
        assert_eq!(history[1].record.version, "0.0.36");
    }

    #[test]
    fn persistent_registry_survives_reopen() {
        let dir = tempdir().unwrap();
        let db = dir.path().join("state.db");

        {
            let registry = InstallRegistry::open(&db).unwrap();
            assert!(registry.is_persistent());
            registry.record(record("qcsxcad", "0.6.3", None)).unwrap();
            registry.record(record("qcsxcad", "0.6.4", None)).unwrap();
            registry.record(record("appcsxcad", "0.2.3", None)).unwrap();
        }

        let registry = InstallRegistry::open(&db).unwrap();
        let names: Vec<String> = registry.list().iter().map(|r| r.name.to_string()).collect();
        assert_eq!(names, vec!["appcsxcad", "qcsxcad"]);
        assert_eq!(registry.lookup("qcsxcad").unwrap().version, "0.6.4");
        assert_eq!(registry.history("qcsxcad").unwrap().len(), 2);

        registry.remove("qcsxcad").unwrap();
        drop(registry);

        let registry = InstallRegistry::open(&db).unwrap();
        assert!(registry.lookup("qcsxcad").is_none());
        assert!(registry.history("qcsxcad").unwrap().is_empty());
    }

    #[test]
    fn concurrent_readers_see_whole_records() {
        let registry = Arc::new(InstallRegistry::in_memory());
        let writer = {
            let registry = Arc::clone(&registry);
            std::thread::spawn(move || {
                for i in 0..50 {
                    registry
                        .record(record("fparser", &format!("4.5.{i}"), None))
                        .unwrap();
                }
            })
        };

        for _ in 0..200 {
            if let Some(r) = registry.lookup("fparser") {
                // Path and version always come from the same commit.
                assert!(r.install_path.ends_with(r.version.as_str()));
            }
        }
        writer.join().unwrap();
        assert_eq!(registry.lookup("fparser").unwrap().version, "4.5.49");
    }
}
