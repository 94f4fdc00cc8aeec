use anyhow::{Context, Result, anyhow};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use std::{fs, path::PathBuf};

use crate::model::UnitSystem;

/// Persists the last-searched city and the selected unit system across
/// runs. Failures are non-fatal by contract: a failed read means "no
/// stored preference", a failed write is dropped.
pub trait PreferenceStore: Send + Sync + Debug {
    fn load_city(&self) -> Option<String>;
    fn load_units(&self) -> UnitSystem;
    fn save_city(&self, name: &str);
    fn save_units(&self, units: UnitSystem);
}

/// On-disk preference document.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct Preferences {
    last_city: Option<String>,
    units: Option<UnitSystem>,
}

/// TOML-file-backed store under the platform config directory.
#[derive(Debug, Clone)]
pub struct FilePreferenceStore {
    path: PathBuf,
}

impl FilePreferenceStore {
    /// Store at the default platform location.
    pub fn open_default() -> Result<Self> {
        let dirs = ProjectDirs::from("dev", "skycast", "skycast")
            .ok_or_else(|| anyhow!("Could not determine platform config directory"))?;

        Ok(Self::at_path(dirs.config_dir().join("preferences.toml")))
    }

    /// Store backed by an explicit file, mainly for tests.
    pub fn at_path(path: PathBuf) -> Self {
        Self { path }
    }

    fn read(&self) -> Result<Preferences> {
        if !self.path.exists() {
            return Ok(Preferences::default());
        }

        let contents = fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read preferences: {}", self.path.display()))?;

        toml::from_str(&contents)
            .with_context(|| format!("Failed to parse preferences: {}", self.path.display()))
    }

    fn write(&self, prefs: &Preferences) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create preferences directory: {}", parent.display())
            })?;
        }

        let toml =
            toml::to_string_pretty(prefs).context("Failed to serialize preferences to TOML")?;

        fs::write(&self.path, toml)
            .with_context(|| format!("Failed to write preferences: {}", self.path.display()))
    }

    fn update(&self, f: impl FnOnce(&mut Preferences)) {
        let mut prefs = self.read().unwrap_or_default();
        f(&mut prefs);
        if let Err(e) = self.write(&prefs) {
            tracing::debug!("dropping preference write: {e:#}");
        }
    }
}

impl PreferenceStore for FilePreferenceStore {
    fn load_city(&self) -> Option<String> {
        self.read().ok().and_then(|p| p.last_city)
    }

    fn load_units(&self) -> UnitSystem {
        self.read()
            .ok()
            .and_then(|p| p.units)
            .unwrap_or_default()
    }

    fn save_city(&self, name: &str) {
        self.update(|p| p.last_city = Some(name.to_string()));
    }

    fn save_units(&self, units: UnitSystem) {
        self.update(|p| p.units = Some(units));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store_in(dir: &TempDir) -> FilePreferenceStore {
        FilePreferenceStore::at_path(dir.path().join("preferences.toml"))
    }

    #[test]
    fn fresh_store_has_no_city_and_metric_units() {
        let dir = TempDir::new().expect("tempdir");
        let store = store_in(&dir);

        assert_eq!(store.load_city(), None);
        assert_eq!(store.load_units(), UnitSystem::Metric);
    }

    #[test]
    fn saved_preferences_survive_reopening() {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("preferences.toml");

        {
            let store = FilePreferenceStore::at_path(path.clone());
            store.save_city("Lisbon");
            store.save_units(UnitSystem::Imperial);
        }

        let store = FilePreferenceStore::at_path(path);
        assert_eq!(store.load_city().as_deref(), Some("Lisbon"));
        assert_eq!(store.load_units(), UnitSystem::Imperial);
    }

    #[test]
    fn saving_city_keeps_units_and_vice_versa() {
        let dir = TempDir::new().expect("tempdir");
        let store = store_in(&dir);

        store.save_units(UnitSystem::Imperial);
        store.save_city("Oslo");

        assert_eq!(store.load_city().as_deref(), Some("Oslo"));
        assert_eq!(store.load_units(), UnitSystem::Imperial);
    }

    #[test]
    fn corrupt_file_reads_as_no_preference() {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("preferences.toml");
        fs::write(&path, "not = [valid").expect("write");

        let store = FilePreferenceStore::at_path(path);
        assert_eq!(store.load_city(), None);
        assert_eq!(store.load_units(), UnitSystem::Metric);

        // A write after a corrupt read starts from defaults and succeeds.
        store.save_city("Riga");
        assert_eq!(store.load_city().as_deref(), Some("Riga"));
    }
}
