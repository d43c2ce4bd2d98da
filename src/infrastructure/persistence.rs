use crate::application::IndexStore;
use crate::domain::{Settings, StoreResult, VaultIndex};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Per-vault directory holding the index, settings and log.
pub const DATA_DIR: &str = ".tablemath";

pub fn data_dir(vault: &Path) -> PathBuf {
    vault.join(DATA_DIR)
}

fn write_json<T: serde::Serialize>(path: &Path, value: &T) -> StoreResult<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(value)?;
    fs::write(path, json)?;
    Ok(())
}

/// The variable index as pretty-printed JSON.
#[derive(Debug, Clone)]
pub struct IndexFile {
    path: PathBuf,
}

impl IndexFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn in_vault(vault: &Path) -> Self {
        Self::new(data_dir(vault).join("index.json"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl IndexStore for IndexFile {
    /// A file that does not exist yet is an empty index.
    fn load(&self) -> StoreResult<VaultIndex> {
        if !self.path.exists() {
            return Ok(VaultIndex::new());
        }
        let content = fs::read_to_string(&self.path)?;
        Ok(serde_json::from_str(&content)?)
    }

    fn save(&self, index: &VaultIndex) -> StoreResult<()> {
        write_json(&self.path, index)
    }
}

#[derive(Debug, Clone)]
pub struct SettingsFile {
    path: PathBuf,
}

impl SettingsFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn in_vault(vault: &Path) -> Self {
        Self::new(data_dir(vault).join("settings.json"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Stored settings, or the defaults when the file is missing or unreadable.
    pub fn load(&self) -> Settings {
        match self.try_load() {
            Ok(Some(settings)) => settings.normalized(),
            Ok(None) => Settings::default(),
            Err(err) => {
                warn!(path = %self.path.display(), %err, "ignoring unreadable settings");
                Settings::default()
            }
        }
    }

    pub fn try_load(&self) -> StoreResult<Option<Settings>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(&self.path)?;
        Ok(Some(serde_json::from_str(&content)?))
    }

    pub fn save(&self, settings: &Settings) -> StoreResult<()> {
        write_json(&self.path, settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::NamedVariable;
    use tempfile::TempDir;

    #[test]
    fn test_missing_index_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let store = IndexFile::in_vault(dir.path());
        assert!(store.load().unwrap().is_empty());
    }

    #[test]
    fn test_index_file_round_trip() {
        let dir = TempDir::new().unwrap();
        let store = IndexFile::in_vault(dir.path());

        let mut index = VaultIndex::new();
        index.entry("Budget".to_string()).or_default().insert(
            "total".to_string(),
            NamedVariable { value: 1500.0, currency: Some("USD".to_string()) },
        );
        store.save(&index).unwrap();

        assert!(store.path().starts_with(dir.path().join(DATA_DIR)));
        assert_eq!(store.load().unwrap(), index);

        let json = fs::read_to_string(store.path()).unwrap();
        assert!(json.contains("\"currency\": \"USD\""));
    }

    #[test]
    fn test_corrupt_index_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let store = IndexFile::new(dir.path().join("index.json"));
        fs::write(store.path(), "{ not json").unwrap();
        assert!(store.load().is_err());
    }

    #[test]
    fn test_settings_defaults_and_round_trip() {
        let dir = TempDir::new().unwrap();
        let file = SettingsFile::in_vault(dir.path());
        assert_eq!(file.load(), Settings::default());

        file.save(&Settings::new(4, "de-DE")).unwrap();
        assert_eq!(file.load(), Settings::new(4, "de-DE"));
    }

    #[test]
    fn test_settings_partial_and_out_of_range() {
        let dir = TempDir::new().unwrap();
        let file = SettingsFile::new(dir.path().join("settings.json"));
        fs::write(file.path(), r#"{ "precision": 42 }"#).unwrap();
        assert_eq!(file.load(), Settings::new(10, "en-US"));

        fs::write(file.path(), "garbage").unwrap();
        assert_eq!(file.load(), Settings::default());
    }
}
