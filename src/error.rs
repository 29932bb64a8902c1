use crate::page::CardKey;

/// Result type for feed filter operations
pub type Result<T> = std::result::Result<T, FilterError>;

/// Error types for feed filter operations
#[derive(thiserror::Error, Debug)]
pub enum FilterError {
    #[error("Invalid selector '{selector}': {reason}")]
    Selector { selector: String, reason: String },

    #[error("Card {0} no longer resolves in the page")]
    StaleCard(CardKey),

    #[error("Settings store error: {0}")]
    SettingsStore(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("TOML encode error: {0}")]
    TomlEncode(#[from] toml::ser::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Monitor is no longer running")]
    MonitorClosed,
}
