/// Configuration gateway: loading, change notification and the update message
use super::store::{SettingsStore, TomlSettingsStore};
use super::{FilterSettings, PartialSettings};
use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Acknowledgement text sent back for an applied update
pub const SETTINGS_APPLIED: &str = "Settings applied";

/// Message sent from the settings surface to every open feed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum FilterMessage {
    UpdateFilters {
        #[serde(default)]
        settings: PartialSettings,
    },
}

impl FilterMessage {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

/// Reply to a [`FilterMessage`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusReply {
    pub status: String,
}

impl StatusReply {
    pub fn applied() -> Self {
        Self {
            status: SETTINGS_APPLIED.to_string(),
        }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Supplies the current filter settings and persists changes
#[derive(Clone)]
pub struct ConfigGateway {
    store: Arc<dyn SettingsStore>,
    defaults: FilterSettings,
}

impl ConfigGateway {
    pub fn new(store: Arc<dyn SettingsStore>) -> Self {
        Self::with_defaults(store, FilterSettings::default())
    }

    pub fn with_defaults(store: Arc<dyn SettingsStore>, defaults: FilterSettings) -> Self {
        Self { store, defaults }
    }

    pub fn defaults(&self) -> &FilterSettings {
        &self.defaults
    }

    /// Stored settings merged key-by-key over the defaults.
    ///
    /// Never fails: an unreachable or corrupt store yields the defaults.
    pub async fn load_configuration(&self) -> FilterSettings {
        match self.store.load().await {
            Ok(stored) => {
                let settings = self.from_stored(&stored);
                info!("⚙️ Settings loaded: {}", settings.summary());
                settings
            }
            Err(e) => {
                warn!("Failed to load settings, using defaults: {}", e);
                self.defaults.clone()
            }
        }
    }

    /// A freshly stored value replaces the previous one, missing keys fall back to defaults
    pub fn from_stored(&self, stored: &PartialSettings) -> FilterSettings {
        self.defaults.merged(stored)
    }

    pub async fn save(&self, settings: &FilterSettings) -> Result<()> {
        self.store.save(settings).await
    }
}

/// Poll a settings file and forward its contents whenever it changes.
///
/// The task ends once the receiving side is dropped.
pub fn watch_settings_file(
    store: TomlSettingsStore,
    interval: Duration,
) -> (mpsc::Receiver<PartialSettings>, JoinHandle<()>) {
    let (tx, rx) = mpsc::channel(8);

    let handle = tokio::spawn(async move {
        let mut last_modified = store.modified().await;
        let mut ticker = tokio::time::interval(interval);
        ticker.tick().await;

        loop {
            ticker.tick().await;
            if tx.is_closed() {
                break;
            }

            let modified = store.modified().await;
            if modified == last_modified {
                continue;
            }
            last_modified = modified;
            debug!("Settings file changed: {}", store.path().display());

            match store.load().await {
                Ok(partial) => {
                    if tx.send(partial).await.is_err() {
                        break;
                    }
                }
                Err(e) => warn!("Ignoring unreadable settings change: {}", e),
            }
        }
        debug!("Settings watcher stopped");
    });

    (rx, handle)
}
