use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Saves a serializable object to a file atomically.
///
/// Writes to a sibling `.tmp` file, syncs it, then renames it over the target.
pub fn save_state<T: Serialize + ?Sized>(path: &Path, state: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).context("Failed to create parent directory")?;
    }

    let json = serde_json::to_string_pretty(state).context("Failed to serialize state")?;

    let temp_path = path.with_extension("tmp");
    let mut temp_file = std::fs::File::create(&temp_path).context("Failed to create temp file")?;
    temp_file
        .write_all(json.as_bytes())
        .context("Failed to write to temp file")?;
    temp_file.sync_all().context("Failed to sync temp file")?;

    std::fs::rename(&temp_path, path).context("Failed to rename temp file to target")?;
    Ok(())
}

/// Loads a deserializable object from a JSON file.
pub fn load_state<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("Failed to open state file {}", path.display()))?;
    let reader = std::io::BufReader::new(file);
    serde_json::from_reader(reader).context("Failed to deserialize state")
}

/// Named JSON documents under one data directory.
#[derive(Debug, Clone)]
pub struct StateStore {
    root: PathBuf,
}

impl StateStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_of(&self, name: &str) -> PathBuf {
        self.root.join(format!("{}.json", name))
    }

    pub fn save<T: Serialize + ?Sized>(&self, name: &str, state: &T) -> Result<PathBuf> {
        let path = self.path_of(name);
        save_state(&path, state)?;
        Ok(path)
    }

    /// Returns `Ok(None)` when the document has never been saved.
    pub fn load<T: DeserializeOwned>(&self, name: &str) -> Result<Option<T>> {
        let path = self.path_of(name);
        if !path.exists() {
            return Ok(None);
        }
        load_state(&path).map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn test_store_save_and_load() {
        let dir = std::env::temp_dir().join(format!("trading-core-store-{}", std::process::id()));
        let store = StateStore::new(&dir);

        let missing: Option<BTreeMap<String, f64>> = store.load("weights").unwrap();
        assert!(missing.is_none());

        let mut weights = BTreeMap::new();
        weights.insert("A".to_string(), 0.5);
        weights.insert("B".to_string(), 0.5);
        let path = store.save("weights", &weights).unwrap();
        assert!(path.ends_with("weights.json"));
        assert!(!path.with_extension("tmp").exists());

        let loaded: Option<BTreeMap<String, f64>> = store.load("weights").unwrap();
        assert_eq!(loaded, Some(weights));

        std::fs::remove_dir_all(&dir).ok();
    }
}
