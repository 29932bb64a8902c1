/// Host page model
///
/// The feed page is modelled as an ordered list of immutable sections, each a
/// parsed HTML fragment. Infinite scroll appends sections, a feed swap replaces
/// them. Cards are addressed by section plus their ordinal among the innermost
/// card-selector matches, which stays stable for the lifetime of the section. Rendering never
/// touches the parsed markup; it writes to a per-card style overlay instead.

pub mod style;

pub use style::{inline_style_property, CardStyle};

use crate::error::{FilterError, Result};
use scraper::{ElementRef, Html, Selector};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use tracing::debug;

fn innermost<'a>(
    html: &'a Html,
    selector: &'a Selector,
) -> impl Iterator<Item = ElementRef<'a>> + 'a {
    html.select(selector)
        .filter(move |element| element.select(selector).next().is_none())
}

/// Identity of one inserted section of the page
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct SectionId(pub u64);

/// Stable identity of a card within the live page
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct CardKey {
    pub section: SectionId,
    pub ordinal: usize,
}

impl fmt::Display for CardKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "s{}#{}", self.section.0, self.ordinal)
    }
}

/// One parsed fragment of the page
pub struct Section {
    pub id: SectionId,
    pub html: Html,
}

/// A change the host applies to the page
#[derive(Debug, Clone, PartialEq)]
pub enum PageEdit {
    /// Append a fragment at the end of the feed (infinite scroll)
    Append(String),
    /// Drop every section and insert the fragment (tab or topic switch)
    ReplaceFeed(String),
    /// Detach a single section
    Remove(SectionId),
    /// Client-side navigation: location changes, content stays until replaced
    Navigate(String),
}

/// What a mutation observer reports after an edit
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MutationRecord {
    pub added: Vec<SectionId>,
    pub removed: Vec<SectionId>,
}

impl MutationRecord {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

/// The live page: location, sections in document order and the style overlay
pub struct Page {
    url: String,
    sections: Vec<Section>,
    next_section_id: u64,
    styles: HashMap<CardKey, CardStyle>,
}

impl Page {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            sections: Vec::new(),
            next_section_id: 0,
            styles: HashMap::new(),
        }
    }

    /// Page with a single section holding `html`
    pub fn from_html(url: impl Into<String>, html: &str) -> Self {
        let mut page = Self::new(url);
        page.append_section(html);
        page
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Change the location. Returns true when it actually changed.
    pub fn navigate(&mut self, url: impl Into<String>) -> bool {
        let url = url.into();
        if url == self.url {
            return false;
        }
        debug!("🧭 Page location {} -> {}", self.url, url);
        self.url = url;
        true
    }

    pub fn append_section(&mut self, html: &str) -> SectionId {
        let id = SectionId(self.next_section_id);
        self.next_section_id += 1;
        self.sections.push(Section {
            id,
            html: Html::parse_fragment(html),
        });
        id
    }

    pub fn remove_section(&mut self, id: SectionId) -> bool {
        let before = self.sections.len();
        self.sections.retain(|section| section.id != id);
        self.styles.retain(|key, _| key.section != id);
        self.sections.len() != before
    }

    /// Apply a host edit and report what an observer would see
    pub fn apply(&mut self, edit: PageEdit) -> MutationRecord {
        match edit {
            PageEdit::Append(html) => MutationRecord {
                added: vec![self.append_section(&html)],
                removed: Vec::new(),
            },
            PageEdit::ReplaceFeed(html) => {
                let removed: Vec<SectionId> = self.sections.iter().map(|s| s.id).collect();
                self.sections.clear();
                self.styles.clear();
                MutationRecord {
                    added: vec![self.append_section(&html)],
                    removed,
                }
            }
            PageEdit::Remove(id) => MutationRecord {
                added: Vec::new(),
                removed: if self.remove_section(id) { vec![id] } else { Vec::new() },
            },
            PageEdit::Navigate(url) => {
                self.navigate(url);
                MutationRecord::default()
            }
        }
    }

    pub fn sections(&self) -> impl Iterator<Item = &Section> {
        self.sections.iter()
    }

    pub fn has_section(&self, id: SectionId) -> bool {
        self.sections.iter().any(|section| section.id == id)
    }

    /// All cards matching `selector`, in document order.
    ///
    /// A match that contains another match is a container, not a card.
    pub fn cards<'a>(
        &'a self,
        selector: &'a Selector,
    ) -> impl Iterator<Item = (CardKey, ElementRef<'a>)> + 'a {
        self.sections.iter().flat_map(move |section| {
            innermost(&section.html, selector)
                .enumerate()
                .map(move |(ordinal, element)| {
                    (
                        CardKey {
                            section: section.id,
                            ordinal,
                        },
                        element,
                    )
                })
        })
    }

    /// Resolve a key obtained from `cards` with the same selector
    pub fn card<'a>(&'a self, key: CardKey, selector: &'a Selector) -> Option<ElementRef<'a>> {
        self.sections
            .iter()
            .find(|section| section.id == key.section)
            .and_then(|section| innermost(&section.html, selector).nth(key.ordinal))
    }

    pub fn card_count(&self, selector: &Selector) -> usize {
        self.cards(selector).count()
    }

    /// Number of elements matching `selector` anywhere in the page
    pub fn count(&self, selector: &Selector) -> usize {
        self.sections
            .iter()
            .map(|section| section.html.select(selector).count())
            .sum()
    }

    /// First element matching `selector` anywhere in the page
    pub fn first<'a>(&'a self, selector: &'a Selector) -> Option<ElementRef<'a>> {
        self.sections
            .iter()
            .find_map(|section| section.html.select(selector).next())
    }

    /// Whether the section is, or contains, an element matching `selector`
    pub fn section_contains(&self, id: SectionId, selector: &Selector) -> bool {
        self.sections
            .iter()
            .find(|section| section.id == id)
            .map_or(false, |section| section.html.select(selector).next().is_some())
    }

    pub fn style(&self, key: CardKey) -> CardStyle {
        self.styles.get(&key).cloned().unwrap_or_default()
    }

    pub fn style_mut(&mut self, key: CardKey) -> &mut CardStyle {
        self.styles.entry(key).or_default()
    }

    /// Style overlay of a card that must still be attached to the page
    pub fn try_style_mut(&mut self, key: CardKey) -> Result<&mut CardStyle> {
        if !self.has_section(key.section) {
            return Err(FilterError::StaleCard(key));
        }
        Ok(self.style_mut(key))
    }
}
