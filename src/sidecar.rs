use indexmap::IndexMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use crate::directives::Tier;
use crate::errors::{TransformError, TransformResult};

/// Record of which files carried which marker, shared by every transform of a
/// build. A file keeps the tier it was first recorded with.
///
/// Persisted as a JSON array of `[fileId, directive]` pairs.
#[derive(Debug, Default)]
pub struct ModuleLog {
    path: Option<PathBuf>,
    entries: Mutex<IndexMap<String, Tier>>,
}

impl ModuleLog {
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Opens the log at `path`, reading whatever an earlier build left there.
    /// A missing file starts an empty log.
    pub fn load(path: impl Into<PathBuf>) -> TransformResult<Self> {
        let path = path.into();
        let entries = if path.exists() {
            let display = path.display().to_string();
            let data = fs::read_to_string(&path).map_err(|e| TransformError::io(e, &display))?;
            let pairs: Vec<(String, Tier)> = serde_json::from_str(&data).map_err(|e| {
                TransformError::io(std::io::Error::new(std::io::ErrorKind::InvalidData, e), &display)
            })?;
            pairs.into_iter().fold(IndexMap::new(), |mut map, (file, tier)| {
                map.entry(file).or_insert(tier);
                map
            })
        } else {
            IndexMap::new()
        };
        Ok(Self {
            path: Some(path),
            entries: Mutex::new(entries),
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn lock(&self) -> MutexGuard<'_, IndexMap<String, Tier>> {
        // A panicking writer cannot leave the map half-updated.
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// True when `file` was not recorded before.
    pub fn record(&self, file: &str, tier: Tier) -> bool {
        let mut entries = self.lock();
        if entries.contains_key(file) {
            return false;
        }
        entries.insert(file.to_string(), tier);
        tracing::debug!(file, tier = %tier, "recorded module");
        true
    }

    pub fn get(&self, file: &str) -> Option<Tier> {
        self.lock().get(file).copied()
    }

    pub fn entries(&self) -> Vec<(String, Tier)> {
        self.lock()
            .iter()
            .map(|(file, tier)| (file.clone(), *tier))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Writes the log back to its file. No-op for an in-memory log.
    pub fn persist(&self) -> TransformResult<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let display = path.display().to_string();
        let data = serde_json::to_string_pretty(&self.entries())
            .map_err(|e| TransformError::io(std::io::Error::other(e), &display))?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| TransformError::io(e, &display))?;
        }
        fs::write(path, data).map_err(|e| TransformError::io(e, &display))
    }
}
