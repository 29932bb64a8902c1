/// Attribute extraction from card markup
///
/// Pure functions over the card sub-tree. A miss is never an error: it yields
/// an empty title, an unknown duration, zero watched progress or an unknown
/// upload time, and the classifier decides what that means.

pub mod contract;
pub mod duration;
pub mod recency;

pub use contract::PageContract;
pub use duration::parse_duration_to_seconds;
pub use recency::parse_relative_date;

use crate::page::inline_style_property;
use chrono::{DateTime, Utc};
use scraper::{ElementRef, Selector};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, warn};

/// Semantic attributes of one card, recomputed on every classification
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ExtractedAttributes {
    /// Lower-cased display title, empty when unrecoverable
    pub title: String,
    /// Raw duration badge text
    pub duration_text: Option<String>,
    /// `None` when the duration is unknown
    pub duration_seconds: Option<u32>,
    /// Watched progress in percent, 0 when there is no indicator
    pub watched_pct: f32,
    /// Raw relative upload text ("3 hours ago")
    pub upload_text: Option<String>,
    /// Unix timestamp inferred from `upload_text`, `None` when unknown
    pub upload_timestamp: Option<i64>,
}

/// Derives [`ExtractedAttributes`] from a card element
pub trait AttributeExtractor {
    fn extract(&self, card: ElementRef<'_>, now: DateTime<Utc>) -> ExtractedAttributes;
}

/// Extractor driven by the ordered selector fallbacks of the page contract
#[derive(Debug, Clone)]
pub struct SelectorExtractor {
    contract: Arc<PageContract>,
}

impl SelectorExtractor {
    pub fn new(contract: Arc<PageContract>) -> Self {
        Self { contract }
    }

    /// Display title, lower-cased and trimmed; `""` when nothing matches
    pub fn extract_title(&self, card: ElementRef<'_>) -> String {
        if let Some(element) = card.select(&self.contract.title_primary).next() {
            let title = self.title_from(element, false);
            if !title.is_empty() {
                return title;
            }
        }

        for (selector, parsed) in &self.contract.title_fallbacks {
            if let Some(element) = card.select(parsed).next() {
                let title = self.title_from(element, *selector == "[title]");
                if !title.is_empty() {
                    debug!(selector, title = %title, "title from fallback");
                    return title;
                }
            }
        }

        if let Some(label) = non_empty_attr(card, "aria-label") {
            debug!(title = %label, "title from card aria-label");
            return label.to_lowercase();
        }

        warn!(tag = card.value().name(), "⚠️ empty title");
        String::new()
    }

    fn title_from(&self, element: ElementRef<'_>, use_title_attr: bool) -> String {
        let text = normalized_text(element).to_lowercase();
        if !text.is_empty() {
            return text;
        }

        if element.value().name() == contract::FORMATTED_STRING_TAG {
            let encapsulated = element
                .select(&self.contract.encapsulated_text)
                .next()
                .or_else(|| element.select(&self.contract.encapsulated_root).next())
                .map(|root| collapse_whitespace(&root.text().collect::<String>()).to_lowercase())
                .unwrap_or_default();
            if !encapsulated.is_empty() {
                return encapsulated;
            }
            if let Some(label) = non_empty_attr(element, "aria-label") {
                return label.to_lowercase();
            }
        }

        if use_title_attr {
            if let Some(title) = non_empty_attr(element, "title") {
                return title.to_lowercase();
            }
        }

        String::new()
    }

    /// Literal duration badge text, or a duration/marker found in an accessible label
    pub fn extract_duration_text(&self, card: ElementRef<'_>) -> Option<String> {
        for selector in &self.contract.duration_badges {
            if let Some(element) = card.select(selector).next() {
                let text = collapse_whitespace(&element.text().collect::<String>());
                if !text.is_empty() {
                    return Some(text);
                }
            }
        }

        let labelled = self
            .contract
            .duration_label_fallbacks
            .iter()
            .filter_map(|selector| card.select(selector).next())
            .chain(std::iter::once(card));

        for element in labelled {
            if let Some(label) = element.value().attr("aria-label") {
                let found = duration::label_duration_pattern().and_then(|re| re.find(label));
                if let Some(found) = found {
                    debug!(
                        text = found.as_str(),
                        tag = element.value().name(),
                        "duration from aria-label"
                    );
                    return Some(found.as_str().to_string());
                }
            }
        }

        debug!(tag = card.value().name(), "no duration text");
        None
    }

    /// Watched progress from the current progress-bar segment, then the legacy bar
    pub fn extract_watched_pct(&self, card: ElementRef<'_>) -> f32 {
        [&self.contract.watched_progress, &self.contract.watched_progress_legacy]
            .into_iter()
            .find_map(|selector| progress_width(card, selector))
            .unwrap_or(0.0)
    }

    /// First metadata span whose text ends in " ago"
    pub fn extract_upload_text(&self, card: ElementRef<'_>) -> Option<String> {
        card.select(&self.contract.metadata_spans)
            .map(normalized_text)
            .find(|text| text.to_lowercase().ends_with(" ago"))
    }
}

impl AttributeExtractor for SelectorExtractor {
    fn extract(&self, card: ElementRef<'_>, now: DateTime<Utc>) -> ExtractedAttributes {
        let title = self.extract_title(card);
        let duration_text = self.extract_duration_text(card);
        let duration_seconds = duration_text.as_deref().and_then(parse_duration_to_seconds);
        let upload_text = self.extract_upload_text(card);
        let upload_timestamp = upload_text
            .as_deref()
            .and_then(|text| parse_relative_date(text, now));

        ExtractedAttributes {
            title,
            duration_text,
            duration_seconds,
            watched_pct: self.extract_watched_pct(card),
            upload_text,
            upload_timestamp,
        }
    }
}

/// Human-readable watched status used in per-card log lines
pub fn watched_label(pct: f32) -> String {
    if pct >= 99.0 {
        "Watched 100%".to_string()
    } else if pct > 0.0 {
        format!("Watched ~{}%", pct)
    } else {
        "Not watched".to_string()
    }
}

fn progress_width(card: ElementRef<'_>, selector: &Selector) -> Option<f32> {
    let element = card.select(selector).next()?;
    let width = inline_style_property(element.value().attr("style")?, "width")?;
    let number = width.strip_suffix('%')?.trim().parse::<f32>().ok()?;
    number.is_finite().then(|| number.clamp(0.0, 100.0))
}

fn non_empty_attr(element: ElementRef<'_>, name: &str) -> Option<String> {
    element
        .value()
        .attr(name)
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

/// Descendant text excluding encapsulated sub-trees, whitespace collapsed
pub(crate) fn normalized_text(element: ElementRef<'_>) -> String {
    let mut raw = String::new();
    collect_light_text(element, &mut raw);
    collapse_whitespace(&raw)
}

fn collect_light_text(element: ElementRef<'_>, out: &mut String) {
    for child in element.children() {
        if let Some(text) = child.value().as_text() {
            out.push_str(text);
        } else if let Some(child_element) = ElementRef::wrap(child) {
            if child_element.value().name() != contract::ENCAPSULATED_ROOT {
                collect_light_text(child_element, out);
            }
        }
    }
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
