/// Persistence backends for filter settings
use super::{FilterSettings, PartialSettings};
use crate::error::{FilterError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tokio::fs;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Where filter settings are persisted
#[async_trait]
pub trait SettingsStore: Send + Sync {
    /// Whatever keys are stored; an empty partial when nothing was saved yet
    async fn load(&self) -> Result<PartialSettings>;

    async fn save(&self, settings: &FilterSettings) -> Result<()>;
}

#[derive(Debug, Default, Deserialize)]
struct StoredFile {
    #[serde(default)]
    ytf_settings: Option<PartialSettings>,
}

#[derive(Serialize)]
struct StoredFileRef<'a> {
    ytf_settings: &'a FilterSettings,
}

/// Settings kept in a TOML file under a `[ytf_settings]` table
#[derive(Debug, Clone)]
pub struct TomlSettingsStore {
    path: PathBuf,
}

impl TomlSettingsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Modification time of the backing file, if it exists
    pub async fn modified(&self) -> Option<SystemTime> {
        fs::metadata(&self.path).await.ok()?.modified().ok()
    }
}

#[async_trait]
impl SettingsStore for TomlSettingsStore {
    async fn load(&self) -> Result<PartialSettings> {
        if !self.path.exists() {
            debug!("No settings file at {}, nothing stored", self.path.display());
            return Ok(PartialSettings::default());
        }

        let content = fs::read_to_string(&self.path).await?;
        let stored: StoredFile = toml::from_str(&content)?;
        Ok(stored.ytf_settings.unwrap_or_default())
    }

    async fn save(&self, settings: &FilterSettings) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await?;
        }
        let content = toml::to_string_pretty(&StoredFileRef {
            ytf_settings: settings,
        })?;
        fs::write(&self.path, content).await?;
        info!("💾 Settings saved to: {}", self.path.display());
        Ok(())
    }
}

/// In-memory store, used when no settings file is configured and in tests
#[derive(Debug, Default)]
pub struct MemorySettingsStore {
    stored: RwLock<PartialSettings>,
    unavailable: bool,
}

impl MemorySettingsStore {
    pub fn new(stored: PartialSettings) -> Self {
        Self {
            stored: RwLock::new(stored),
            unavailable: false,
        }
    }

    /// A store whose every access fails, like storage that is not reachable
    pub fn unavailable() -> Self {
        Self {
            stored: RwLock::new(PartialSettings::default()),
            unavailable: true,
        }
    }
}

#[async_trait]
impl SettingsStore for MemorySettingsStore {
    async fn load(&self) -> Result<PartialSettings> {
        if self.unavailable {
            return Err(FilterError::SettingsStore("storage unavailable".to_string()));
        }
        Ok(self.stored.read().await.clone())
    }

    async fn save(&self, settings: &FilterSettings) -> Result<()> {
        if self.unavailable {
            return Err(FilterError::SettingsStore("storage unavailable".to_string()));
        }
        *self.stored.write().await = PartialSettings::from(settings);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::SuppressStyle;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_missing_file_is_empty() {
        let temp_dir = TempDir::new().unwrap();
        let store = TomlSettingsStore::new(temp_dir.path().join("settings.toml"));
        assert!(store.load().await.unwrap().is_empty());
        assert!(store.modified().await.is_none());
    }

    #[tokio::test]
    async fn test_partial_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("settings.toml");
        tokio::fs::write(&path, "[ytf_settings]\nminDurationMinutes = 3\nhideStyle = \"hide\"\n")
            .await
            .unwrap();

        let partial = TomlSettingsStore::new(&path).load().await.unwrap();
        assert_eq!(partial.min_duration_minutes, Some(3.0));
        assert_eq!(partial.hide_style, Some(SuppressStyle::Hide));
        assert_eq!(partial.title_keywords, None);
    }

    #[tokio::test]
    async fn test_save_then_load() {
        let temp_dir = TempDir::new().unwrap();
        let store = TomlSettingsStore::new(temp_dir.path().join("nested/settings.toml"));
        let settings = FilterSettings {
            title_keywords: vec!["asmr".to_string()],
            sort_by_date: true,
            ..Default::default()
        };
        store.save(&settings).await.unwrap();

        let loaded = FilterSettings::default().merged(&store.load().await.unwrap());
        assert_eq!(loaded, settings);
    }

    #[tokio::test]
    async fn test_no_upper_bound_survives_reload() {
        let temp_dir = TempDir::new().unwrap();
        let store = TomlSettingsStore::new(temp_dir.path().join("settings.toml"));
        let settings = FilterSettings {
            max_duration_minutes: None,
            ..Default::default()
        };
        store.save(&settings).await.unwrap();

        let stored = store.load().await.unwrap();
        assert_eq!(stored.max_duration_minutes, Some(None));
        let loaded = FilterSettings::default().merged(&stored);
        assert_eq!(loaded.max_duration_minutes, None);
        assert_eq!(loaded.to_configuration().max_duration_seconds, None);
    }

    #[tokio::test]
    async fn test_memory_store_keeps_no_upper_bound() {
        let store = MemorySettingsStore::default();
        store
            .save(&FilterSettings {
                max_duration_minutes: None,
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(store.load().await.unwrap().max_duration_minutes, Some(None));
    }

    #[tokio::test]
    async fn test_malformed_file_is_an_error() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("settings.toml");
        tokio::fs::write(&path, "[ytf_settings\nbroken").await.unwrap();
        assert!(matches!(
            TomlSettingsStore::new(&path).load().await,
            Err(FilterError::Toml(_))
        ));
    }

    #[tokio::test]
    async fn test_unavailable_memory_store() {
        let store = MemorySettingsStore::unavailable();
        assert!(matches!(store.load().await, Err(FilterError::SettingsStore(_))));
    }
}
