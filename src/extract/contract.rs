/// Structural contract with the host page markup
///
/// Everything the filter knows about the vendor's element taxonomy lives here.
/// The markup drifts over time, so the lists are deliberately broad and ordered
/// from most to least reliable.
use crate::error::{FilterError, Result};
use scraper::Selector;

/// Element tags that may represent a single video listing
pub const CARD_SELECTORS: [&str; 13] = [
    "ytd-rich-item-renderer",
    "ytd-rich-grid-media",
    "ytd-video-renderer",
    "ytd-grid-video-renderer",
    "ytd-compact-video-renderer",
    "ytd-playlist-video-renderer",
    "ytd-reel-item-renderer",
    "ytd-rich-grid-video-renderer",
    "ytd-grid-media",
    "ytd-grid-renderer",
    "ytd-shelf-renderer",
    "ytd-item-section-renderer",
    "ytd-rich-section-renderer",
];

pub const TITLE_PRIMARY: &str = "a#video-title";

pub const TITLE_FALLBACKS: [&str; 7] = [
    "yt-formatted-string#video-title",
    "[id='video-title-link']",
    "h3",
    "[title]",
    "a[aria-label]",
    ".title",
    ".yt-formatted-string",
];

/// Tag of title containers that keep their text in an encapsulated sub-tree
pub const FORMATTED_STRING_TAG: &str = "yt-formatted-string";

/// Encapsulated sub-trees are declared as `<template>` children
pub const ENCAPSULATED_ROOT: &str = "template";
pub const ENCAPSULATED_TEXT: &str = "template span";

pub const DURATION_BADGES: [&str; 8] = [
    ".yt-badge-shape__text",
    "ytd-thumbnail-overlay-time-status-renderer",
    ".ytd-thumbnail-overlay-time-status-renderer",
    "#time-status",
    "span.ytd-thumbnail-overlay-time-status-renderer",
    "[aria-label*='duration']",
    "span[aria-label]",
    ".badge-shape-wiz__text",
];

/// Elements whose `aria-label` may spell out the duration, tried before the card root
pub const DURATION_LABEL_FALLBACKS: [&str; 2] = [
    "a#thumbnail, [id='thumbnail'], ytd-thumbnail",
    "a[aria-label]",
];

pub const WATCHED_PROGRESS: &str = ".ytThumbnailOverlayProgressBarHostWatchedProgressBarSegment";
pub const WATCHED_PROGRESS_LEGACY: &str =
    "ytd-thumbnail-overlay-resume-playback-renderer #progress";

pub const METADATA_SPANS: &str = "#metadata-line span, span.inline-metadata-item, \
     .yt-content-metadata-view-model-wiz__metadata-text, \
     .yt-content-metadata-view-model__metadata-text";

/// Container-level nodes whose arrival means the whole feed was swapped
pub const MAJOR_CONTAINERS: [&str; 4] = [
    "ytd-rich-grid-renderer",
    "ytd-item-section-renderer",
    "[id='contents']",
    "ytd-chip-cloud-renderer",
];

/// Parsed form of the contract, built once and shared
#[derive(Debug, Clone)]
pub struct PageContract {
    /// Union of all card selectors
    pub cards: Selector,
    /// Each card selector on its own, for diagnostics
    pub card_selectors: Vec<(&'static str, Selector)>,
    pub title_primary: Selector,
    pub title_fallbacks: Vec<(&'static str, Selector)>,
    pub encapsulated_root: Selector,
    pub encapsulated_text: Selector,
    pub duration_badges: Vec<Selector>,
    pub duration_label_fallbacks: Vec<Selector>,
    pub watched_progress: Selector,
    pub watched_progress_legacy: Selector,
    pub metadata_spans: Selector,
    pub major_containers: Selector,
    /// Union of title selectors, for diagnostics
    pub title_candidates: Selector,
    /// Union of duration selectors, for diagnostics
    pub duration_candidates: Selector,
}

impl PageContract {
    pub fn new() -> Result<Self> {
        let title_all: Vec<&str> = std::iter::once(TITLE_PRIMARY)
            .chain(TITLE_FALLBACKS.iter().copied())
            .collect();
        let duration_all: Vec<&str> = DURATION_BADGES
            .iter()
            .copied()
            .chain(DURATION_LABEL_FALLBACKS.iter().copied().take(1))
            .collect();

        Ok(Self {
            cards: parse_selector(&CARD_SELECTORS.join(", "))?,
            card_selectors: parse_named(&CARD_SELECTORS)?,
            title_primary: parse_selector(TITLE_PRIMARY)?,
            title_fallbacks: parse_named(&TITLE_FALLBACKS)?,
            encapsulated_root: parse_selector(ENCAPSULATED_ROOT)?,
            encapsulated_text: parse_selector(ENCAPSULATED_TEXT)?,
            duration_badges: DURATION_BADGES
                .iter()
                .map(|s| parse_selector(s))
                .collect::<Result<Vec<_>>>()?,
            duration_label_fallbacks: DURATION_LABEL_FALLBACKS
                .iter()
                .map(|s| parse_selector(s))
                .collect::<Result<Vec<_>>>()?,
            watched_progress: parse_selector(WATCHED_PROGRESS)?,
            watched_progress_legacy: parse_selector(WATCHED_PROGRESS_LEGACY)?,
            metadata_spans: parse_selector(METADATA_SPANS)?,
            major_containers: parse_selector(&MAJOR_CONTAINERS.join(", "))?,
            title_candidates: parse_selector(&title_all.join(", "))?,
            duration_candidates: parse_selector(&duration_all.join(", "))?,
        })
    }
}

/// Parse a CSS selector, mapping failures into the crate error
pub fn parse_selector(selector: &str) -> Result<Selector> {
    Selector::parse(selector).map_err(|e| FilterError::Selector {
        selector: selector.to_string(),
        reason: format!("{:?}", e),
    })
}

fn parse_named(selectors: &[&'static str]) -> Result<Vec<(&'static str, Selector)>> {
    selectors
        .iter()
        .map(|s| parse_selector(s).map(|parsed| (*s, parsed)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contract_parses() {
        let contract = PageContract::new().unwrap();
        assert_eq!(contract.card_selectors.len(), CARD_SELECTORS.len());
        assert_eq!(contract.title_fallbacks.len(), TITLE_FALLBACKS.len());
        assert_eq!(contract.duration_badges.len(), DURATION_BADGES.len());
    }

    #[test]
    fn test_invalid_selector_is_reported() {
        match parse_selector("a[[") {
            Err(FilterError::Selector { selector, .. }) => assert_eq!(selector, "a[["),
            other => panic!("expected selector error, got {:?}", other.map(|_| ())),
        }
    }
}
