/// User filter settings and the configuration snapshot derived from them
///
/// `FilterSettings` is the stored shape (the keys the options form writes).
/// `PartialSettings` is what stores and update messages carry: any subset of
/// keys, merged key-by-key. `Configuration` is the normalized, read-only
/// snapshot a scan pass runs against, and `ActiveConfig` pairs it with the
/// generation counter that decides which cards are stale.

pub mod gateway;
pub mod store;

pub use gateway::{watch_settings_file, ConfigGateway, FilterMessage, StatusReply, SETTINGS_APPLIED};
pub use store::{MemorySettingsStore, SettingsStore, TomlSettingsStore};

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// How a card that matched a filter rule is treated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SuppressStyle {
    /// Removed from layout
    Hide,
    /// Greyed out and made inert
    #[serde(rename = "gray", alias = "dim", alias = "grey")]
    Dim,
}

/// Persisted filter settings, in the key naming of the options form
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FilterSettings {
    pub min_duration_minutes: f64,
    /// `None` disables the upper bound; stored as `0`
    #[serde(serialize_with = "no_limit_as_zero", deserialize_with = "positive_or_none")]
    pub max_duration_minutes: Option<f64>,
    pub title_keywords: Vec<String>,
    pub hide_style: SuppressStyle,
    pub hide_unknown_durations: bool,
    /// Percent of a video watched before it is dimmed
    pub watched_threshold: f32,
    pub sort_by_date: bool,
}

impl Default for FilterSettings {
    fn default() -> Self {
        Self {
            min_duration_minutes: 10.0,
            max_duration_minutes: Some(120.0),
            title_keywords: vec!["Mix".to_string(), "Trailer".to_string(), "Teaser".to_string()],
            hide_style: SuppressStyle::Dim,
            hide_unknown_durations: true,
            watched_threshold: 10.0,
            sort_by_date: false,
        }
    }
}

/// Any subset of [`FilterSettings`]
///
/// `maxDurationMinutes: null` (or any non-positive value) is distinct from an
/// absent key: it explicitly removes the upper bound.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartialSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_duration_minutes: Option<f64>,
    #[serde(
        default,
        deserialize_with = "present_or_null",
        serialize_with = "present_no_limit_as_zero",
        skip_serializing_if = "Option::is_none"
    )]
    pub max_duration_minutes: Option<Option<f64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title_keywords: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hide_style: Option<SuppressStyle>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hide_unknown_durations: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub watched_threshold: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort_by_date: Option<bool>,
}

fn positive_or_none<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<f64>::deserialize(deserializer)?.filter(|max| max.is_finite() && *max > 0.0))
}

fn present_or_null<'de, D>(deserializer: D) -> Result<Option<Option<f64>>, D::Error>
where
    D: Deserializer<'de>,
{
    positive_or_none(deserializer).map(Some)
}

// TOML has no null, so "no limit" is written as 0
fn no_limit_as_zero<S>(max: &Option<f64>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_f64(max.unwrap_or(0.0))
}

fn present_no_limit_as_zero<S>(max: &Option<Option<f64>>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    no_limit_as_zero(&max.flatten(), serializer)
}

impl PartialSettings {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

impl From<&FilterSettings> for PartialSettings {
    fn from(settings: &FilterSettings) -> Self {
        Self {
            min_duration_minutes: Some(settings.min_duration_minutes),
            max_duration_minutes: Some(settings.max_duration_minutes),
            title_keywords: Some(settings.title_keywords.clone()),
            hide_style: Some(settings.hide_style),
            hide_unknown_durations: Some(settings.hide_unknown_durations),
            watched_threshold: Some(settings.watched_threshold),
            sort_by_date: Some(settings.sort_by_date),
        }
    }
}

impl FilterSettings {
    /// Overlay the keys present in `partial`, keeping the rest
    pub fn merged(&self, partial: &PartialSettings) -> Self {
        Self {
            min_duration_minutes: partial.min_duration_minutes.unwrap_or(self.min_duration_minutes),
            max_duration_minutes: partial.max_duration_minutes.unwrap_or(self.max_duration_minutes),
            title_keywords: partial
                .title_keywords
                .clone()
                .unwrap_or_else(|| self.title_keywords.clone()),
            hide_style: partial.hide_style.unwrap_or(self.hide_style),
            hide_unknown_durations: partial
                .hide_unknown_durations
                .unwrap_or(self.hide_unknown_durations),
            watched_threshold: partial.watched_threshold.unwrap_or(self.watched_threshold),
            sort_by_date: partial.sort_by_date.unwrap_or(self.sort_by_date),
        }
    }

    /// Normalize into the snapshot the classifier consumes
    pub fn to_configuration(&self) -> Configuration {
        Configuration {
            min_duration_seconds: minutes_to_seconds(self.min_duration_minutes),
            max_duration_seconds: self
                .max_duration_minutes
                .filter(|minutes| minutes.is_finite() && *minutes > 0.0)
                .map(minutes_to_seconds),
            banned_keywords: normalize_keywords(&self.title_keywords),
            hide_unknown_durations: self.hide_unknown_durations,
            watched_threshold_pct: if self.watched_threshold.is_finite() {
                self.watched_threshold.clamp(0.0, 100.0)
            } else {
                100.0
            },
            suppress_style: self.hide_style,
            sort_by_recency: self.sort_by_date,
        }
    }

    /// One-line summary for logs
    pub fn summary(&self) -> String {
        format!(
            "min: {} min, max: {} min, keywords: [{}], watched threshold: {}%, style: {:?}, hideUnknown: {}, sortByDate: {}",
            self.min_duration_minutes,
            self.max_duration_minutes
                .map(|m| m.to_string())
                .unwrap_or_else(|| "none".to_string()),
            self.title_keywords.join(", "),
            self.watched_threshold,
            self.hide_style,
            self.hide_unknown_durations,
            self.sort_by_date
        )
    }
}

fn minutes_to_seconds(minutes: f64) -> u32 {
    if !minutes.is_finite() || minutes <= 0.0 {
        return 0;
    }
    (minutes * 60.0).round().min(u32::MAX as f64) as u32
}

/// Lower-case, trim, drop empties and duplicates, keep first-seen order
pub fn normalize_keywords(keywords: &[String]) -> Vec<String> {
    let mut normalized: Vec<String> = Vec::new();
    for keyword in keywords {
        let keyword = keyword.trim().to_lowercase();
        if !keyword.is_empty() && !normalized.contains(&keyword) {
            normalized.push(keyword);
        }
    }
    normalized
}

/// Read-only rule snapshot for one scan pass
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Configuration {
    pub min_duration_seconds: u32,
    /// `None` means no upper bound
    pub max_duration_seconds: Option<u32>,
    pub banned_keywords: Vec<String>,
    pub hide_unknown_durations: bool,
    pub watched_threshold_pct: f32,
    pub suppress_style: SuppressStyle,
    pub sort_by_recency: bool,
}

impl Default for Configuration {
    fn default() -> Self {
        FilterSettings::default().to_configuration()
    }
}

/// Monotonic token identifying the active configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct Generation(pub u64);

/// The configuration currently in force, with its generation
#[derive(Debug, Clone)]
pub struct ActiveConfig {
    generation: Generation,
    settings: FilterSettings,
    config: Configuration,
}

impl ActiveConfig {
    pub fn new(settings: FilterSettings) -> Self {
        let config = settings.to_configuration();
        Self {
            generation: Generation(1),
            settings,
            config,
        }
    }

    pub fn generation(&self) -> Generation {
        self.generation
    }

    pub fn settings(&self) -> &FilterSettings {
        &self.settings
    }

    pub fn config(&self) -> &Configuration {
        &self.config
    }

    /// Replace wholesale and bump the generation
    pub fn replace(&mut self, settings: FilterSettings) -> Generation {
        self.config = settings.to_configuration();
        self.settings = settings;
        self.generation = Generation(self.generation.0 + 1);
        self.generation
    }
}

impl Default for ActiveConfig {
    fn default() -> Self {
        Self::new(FilterSettings::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings() {
        let settings = FilterSettings::default();
        assert_eq!(settings.min_duration_minutes, 10.0);
        assert_eq!(settings.max_duration_minutes, Some(120.0));
        assert_eq!(settings.title_keywords, vec!["Mix", "Trailer", "Teaser"]);
        assert_eq!(settings.hide_style, SuppressStyle::Dim);
        assert!(settings.hide_unknown_durations);
        assert_eq!(settings.watched_threshold, 10.0);
        assert!(!settings.sort_by_date);
    }

    #[test]
    fn test_to_configuration() {
        let config = FilterSettings::default().to_configuration();
        assert_eq!(config.min_duration_seconds, 600);
        assert_eq!(config.max_duration_seconds, Some(7200));
        assert_eq!(config.banned_keywords, vec!["mix", "trailer", "teaser"]);
    }

    #[test]
    fn test_non_positive_max_is_no_limit() {
        let settings = FilterSettings {
            max_duration_minutes: Some(0.0),
            ..Default::default()
        };
        assert_eq!(settings.to_configuration().max_duration_seconds, None);
    }

    #[test]
    fn test_keywords_normalized() {
        let keywords: Vec<String> = [" Mix ", "", "mix", "ASMR", "   "]
            .iter()
            .map(|k| k.to_string())
            .collect();
        assert_eq!(normalize_keywords(&keywords), vec!["mix", "asmr"]);
    }

    #[test]
    fn test_merge_is_key_by_key() {
        let partial: PartialSettings =
            serde_json::from_str(r#"{"minDurationMinutes": 2, "hideStyle": "hide"}"#).unwrap();
        let merged = FilterSettings::default().merged(&partial);
        assert_eq!(merged.min_duration_minutes, 2.0);
        assert_eq!(merged.hide_style, SuppressStyle::Hide);
        assert_eq!(merged.max_duration_minutes, Some(120.0));
        assert_eq!(merged.title_keywords.len(), 3);
    }

    #[test]
    fn test_explicit_null_clears_max() {
        let partial: PartialSettings =
            serde_json::from_str(r#"{"maxDurationMinutes": null}"#).unwrap();
        assert_eq!(partial.max_duration_minutes, Some(None));
        let merged = FilterSettings::default().merged(&partial);
        assert_eq!(merged.max_duration_minutes, None);

        let zero: PartialSettings = serde_json::from_str(r#"{"maxDurationMinutes": 0}"#).unwrap();
        assert_eq!(zero.max_duration_minutes, Some(None));

        let absent: PartialSettings = serde_json::from_str("{}").unwrap();
        assert!(absent.is_empty());
        assert_eq!(FilterSettings::default().merged(&absent), FilterSettings::default());
    }

    #[test]
    fn test_no_limit_is_written_as_zero() {
        let settings = FilterSettings {
            max_duration_minutes: None,
            ..Default::default()
        };
        let json = serde_json::to_value(&settings).unwrap();
        assert_eq!(json["maxDurationMinutes"], 0.0);

        let back: FilterSettings = serde_json::from_value(json).unwrap();
        assert_eq!(back.max_duration_minutes, None);
    }

    #[test]
    fn test_generation_bumps_on_replace() {
        let mut active = ActiveConfig::default();
        let first = active.generation();
        let second = active.replace(FilterSettings {
            sort_by_date: true,
            ..Default::default()
        });
        assert!(second > first);
        assert!(active.config().sort_by_recency);
    }

    #[test]
    fn test_hide_style_aliases() {
        let partial: PartialSettings = serde_json::from_str(r#"{"hideStyle": "gray"}"#).unwrap();
        assert_eq!(partial.hide_style, Some(SuppressStyle::Dim));
        let partial: PartialSettings = serde_json::from_str(r#"{"hideStyle": "dim"}"#).unwrap();
        assert_eq!(partial.hide_style, Some(SuppressStyle::Dim));
    }
}
