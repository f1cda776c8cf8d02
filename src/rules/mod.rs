//! Persistent package → activity rules.
//!
//! A rule tells the UI which activity to suggest when a package comes to the
//! foreground. Rules live in a single JSON object on disk, keyed by package.
//! Every write replaces the file atomically (temp file + rename). A failed
//! write is logged and the in-memory map keeps the new value, so callers
//! never see persistence faults.

pub mod error;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

pub use error::RuleStoreError;

/// Storage namespace of the rules.
pub const RULES_NAMESPACE: &str = "AppUsageRules";

/// Read access to rules, used by the overlay's auto-prompt.
pub trait RuleLookup: Send + Sync {
    /// Activity id for the package, if a rule exists.
    fn activity_for(&self, package: &str) -> Option<String>;
}

/// Rule store backed by a JSON file (or memory only).
#[derive(Debug)]
pub struct RuleStore {
    path: Option<PathBuf>,
    rules: RwLock<BTreeMap<String, String>>,
}

impl RuleStore {
    /// Creates a store that never touches the disk.
    pub fn in_memory() -> Self {
        Self {
            path: None,
            rules: RwLock::new(BTreeMap::new()),
        }
    }

    /// Loads the rules file. A missing file is an empty store.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, RuleStoreError> {
        let path = path.into();
        let rules = match std::fs::read_to_string(&path) {
            Ok(raw) => parse_rules(&path, &raw)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(source) => return Err(RuleStoreError::Read { path, source }),
        };
        tracing::debug!(path = %path.display(), count = rules.len(), "Loaded rules");
        Ok(Self {
            path: Some(path),
            rules: RwLock::new(rules),
        })
    }

    /// Loads the rules file, starting empty if it cannot be read.
    ///
    /// The path is kept, so the next write replaces the unreadable file.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        match Self::load(path.clone()) {
            Ok(store) => store,
            Err(e) => {
                tracing::error!(error = %e, "Starting with an empty rule store");
                Self {
                    path: Some(path),
                    rules: RwLock::new(BTreeMap::new()),
                }
            }
        }
    }

    /// Backing file, if any.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// All rules.
    pub fn get_all(&self) -> BTreeMap<String, String> {
        self.rules.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Activity id for one package.
    pub fn get(&self, package: &str) -> Option<String> {
        self.rules
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(package)
            .cloned()
    }

    /// Inserts or replaces a rule.
    pub fn upsert(&self, package: &str, activity_id: &str) -> Result<(), RuleStoreError> {
        if package.is_empty() {
            return Err(RuleStoreError::EmptyPackage);
        }
        if activity_id.is_empty() {
            return Err(RuleStoreError::EmptyActivity);
        }

        let mut rules = self.rules.write().unwrap_or_else(|e| e.into_inner());
        rules.insert(package.to_string(), activity_id.to_string());
        tracing::info!(package = %package, activity = %activity_id, "Saved app rule");
        self.persist_logged(&rules);
        Ok(())
    }

    /// Deletes a rule. Returns whether one existed.
    pub fn remove(&self, package: &str) -> Result<bool, RuleStoreError> {
        if package.is_empty() {
            return Err(RuleStoreError::EmptyPackage);
        }

        let mut rules = self.rules.write().unwrap_or_else(|e| e.into_inner());
        let existed = rules.remove(package).is_some();
        if existed {
            tracing::info!(package = %package, "Removed app rule");
            self.persist_logged(&rules);
        }
        Ok(existed)
    }

    fn persist_logged(&self, rules: &BTreeMap<String, String>) {
        if let Err(e) = self.persist(rules) {
            tracing::error!(error = %e, "Rule change kept in memory only");
        }
    }

    fn persist(&self, rules: &BTreeMap<String, String>) -> Result<(), RuleStoreError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let write_err = |source| RuleStoreError::Write {
            path: path.clone(),
            source,
        };

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(write_err)?;
        }
        let serialized = serde_json::to_string_pretty(rules).map_err(|e| RuleStoreError::Write {
            path: path.clone(),
            source: std::io::Error::other(e),
        })?;

        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, serialized).map_err(write_err)?;
        std::fs::rename(&tmp, path).map_err(write_err)
    }
}

impl RuleLookup for RuleStore {
    fn activity_for(&self, package: &str) -> Option<String> {
        self.get(package)
    }
}

/// Parses the rules object, dropping non-string and empty values.
fn parse_rules(path: &Path, raw: &str) -> Result<BTreeMap<String, String>, RuleStoreError> {
    let object: serde_json::Map<String, serde_json::Value> =
        serde_json::from_str(raw).map_err(|source| RuleStoreError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

    Ok(object
        .into_iter()
        .filter_map(|(package, value)| match value {
            serde_json::Value::String(activity) if !package.is_empty() && !activity.is_empty() => {
                Some((package, activity))
            }
            other => {
                tracing::warn!(package = %package, value = %other, "Dropping malformed rule");
                None
            }
        })
        .collect())
}
