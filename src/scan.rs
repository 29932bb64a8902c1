/// Card registry and scan driver
///
/// A scan pass walks every card in the page, skips those already classified
/// under the active generation and runs extract → classify → render on the
/// rest. The processed marker lives in a side-table keyed by [`CardKey`] and is
/// written only after the card has been rendered.
use crate::classify::{Classification, Classifier, Disposition, RuleClassifier};
use crate::error::Result;
use crate::extract::{
    watched_label, AttributeExtractor, ExtractedAttributes, PageContract, SelectorExtractor,
};
use crate::page::{CardKey, Page};
use crate::render::{Renderer, StyleRenderer};
use crate::settings::{ActiveConfig, Generation};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, Level};

/// Source of "now" for relative upload dates
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Always reports the same instant
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

/// What the registry remembers about a card
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CardRecord {
    /// Generation the card was last classified under; `None` after a reset
    pub epoch: Option<Generation>,
    pub attributes: ExtractedAttributes,
    pub classification: Classification,
}

impl CardRecord {
    pub fn disposition(&self) -> Disposition {
        self.classification.disposition
    }

    pub fn upload_timestamp(&self) -> Option<i64> {
        self.attributes.upload_timestamp
    }
}

/// Side-table of processed markers
#[derive(Debug, Default)]
pub struct CardRegistry {
    records: HashMap<CardKey, CardRecord>,
}

impl CardRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_current(&self, key: CardKey, generation: Generation) -> bool {
        self.records
            .get(&key)
            .map_or(false, |record| record.epoch == Some(generation))
    }

    pub fn mark(&mut self, key: CardKey, record: CardRecord) {
        self.records.insert(key, record);
    }

    /// Clear every processed marker. Returns how many were cleared.
    pub fn reset(&mut self) -> usize {
        let mut cleared = 0;
        for record in self.records.values_mut() {
            if record.epoch.take().is_some() {
                cleared += 1;
            }
        }
        cleared
    }

    /// Drop records of cards whose section left the page
    pub fn prune(&mut self, page: &Page) -> usize {
        let before = self.records.len();
        self.records.retain(|key, _| page.has_section(key.section));
        before - self.records.len()
    }

    pub fn get(&self, key: CardKey) -> Option<&CardRecord> {
        self.records.get(&key)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Outcome of one scan pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ScanReport {
    /// Cards classified and rendered in this pass
    pub processed: usize,
    /// Cards present in the page
    pub total_cards: usize,
    /// Present cards currently hidden or grayed by a filter rule
    pub suppressed: usize,
    /// Present cards currently dimmed as watched
    pub dimmed: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SelectorCount {
    pub selector: String,
    pub count: usize,
}

/// Snapshot of how the page contract matches the current markup
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DomDiagnostics {
    pub url: String,
    pub sections: usize,
    pub total_cards: usize,
    pub card_selectors: Vec<SelectorCount>,
    pub title_candidates: usize,
    pub duration_candidates: usize,
    pub sample_title: Option<String>,
    pub sample_duration: Option<String>,
}

/// One card as shown by the CLI
#[derive(Debug, Clone, Serialize)]
pub struct CardRow {
    pub key: CardKey,
    pub title: String,
    pub duration_text: Option<String>,
    pub duration_seconds: Option<u32>,
    pub watched: String,
    pub upload_text: Option<String>,
    pub disposition: Disposition,
    pub reasons: Vec<crate::classify::SuppressReason>,
    pub order: Option<usize>,
    pub style: String,
}

/// Runs scan passes over a page
pub struct ScanDriver<E, C, R> {
    contract: Arc<PageContract>,
    extractor: E,
    classifier: C,
    renderer: R,
    clock: Box<dyn Clock>,
    registry: CardRegistry,
}

impl ScanDriver<SelectorExtractor, RuleClassifier, StyleRenderer> {
    /// Selector extractor, rule classifier and style renderer over the built-in contract
    pub fn standard() -> Result<Self> {
        let contract = Arc::new(PageContract::new()?);
        Ok(Self::new(
            contract.clone(),
            SelectorExtractor::new(contract),
            RuleClassifier::new(),
            StyleRenderer::new(),
        ))
    }
}

impl<E, C, R> ScanDriver<E, C, R>
where
    E: AttributeExtractor,
    C: Classifier,
    R: Renderer,
{
    pub fn new(contract: Arc<PageContract>, extractor: E, classifier: C, renderer: R) -> Self {
        Self {
            contract,
            extractor,
            classifier,
            renderer,
            clock: Box::new(SystemClock),
            registry: CardRegistry::new(),
        }
    }

    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    pub fn contract(&self) -> &Arc<PageContract> {
        &self.contract
    }

    pub fn registry(&self) -> &CardRegistry {
        &self.registry
    }

    pub fn card_count(&self, page: &Page) -> usize {
        page.card_count(&self.contract.cards)
    }

    /// Forget every processed marker so the next pass reclassifies all cards
    pub fn reset(&mut self) {
        let cleared = self.registry.reset();
        debug!(cleared, "🔄 Card markers reset");
    }

    /// Classify and render every card not yet processed under `active`
    pub fn scan(&mut self, page: &mut Page, active: &ActiveConfig) -> Result<ScanReport> {
        let pruned = self.registry.prune(page);
        if pruned > 0 {
            debug!(pruned, "Dropped records of detached cards");
        }

        if tracing::enabled!(Level::DEBUG) {
            let diagnostics = self.diagnose(page);
            debug!(
                cards = diagnostics.total_cards,
                titles = diagnostics.title_candidates,
                durations = diagnostics.duration_candidates,
                sample_title = ?diagnostics.sample_title,
                sample_duration = ?diagnostics.sample_duration,
                "🔍 DOM diagnostics"
            );
        }

        let generation = active.generation();
        let config = active.config();
        let now = self.clock.now();

        let mut keys = Vec::new();
        let mut pending = Vec::new();
        for (key, card) in page.cards(&self.contract.cards) {
            keys.push(key);
            if self.registry.is_current(key, generation) {
                continue;
            }
            let attributes = self.extractor.extract(card, now);
            let classification = self.classifier.classify(&attributes, config);
            pending.push((key, attributes, classification));
        }

        let processed = pending.len();
        for (key, attributes, classification) in pending {
            self.renderer.render(page, key, &classification.disposition)?;
            debug!(
                card = %key,
                title = %attributes.title,
                duration = attributes.duration_text.as_deref().unwrap_or("unknown"),
                watched = %watched_label(attributes.watched_pct),
                disposition = classification.disposition.label(),
                reason = ?classification.disposition.reason(),
                "Card classified"
            );
            self.registry.mark(
                key,
                CardRecord {
                    epoch: Some(generation),
                    attributes,
                    classification,
                },
            );
        }

        self.apply_order(page, &keys, config.sort_by_recency);

        let mut report = ScanReport {
            processed,
            total_cards: keys.len(),
            ..Default::default()
        };
        for key in &keys {
            match self.registry.get(*key).map(CardRecord::disposition) {
                Some(Disposition::Suppressed { .. }) => report.suppressed += 1,
                Some(Disposition::Dimmed) => report.dimmed += 1,
                _ => {}
            }
        }

        if processed > 0 {
            info!(
                "🎬 Processed {} of {} cards ({} filtered, {} watched)",
                report.processed, report.total_cards, report.suppressed, report.dimmed
            );
        }
        Ok(report)
    }

    fn apply_order(&self, page: &mut Page, keys: &[CardKey], sort_by_recency: bool) {
        if !sort_by_recency {
            for key in keys {
                if page.style(*key).order.is_some() {
                    self.renderer.clear_order(page.style_mut(*key));
                }
            }
            return;
        }

        let mut ordered = Vec::new();
        for key in keys {
            match self.registry.get(*key) {
                Some(record) if !record.disposition().is_suppressed() => {
                    ordered.push((*key, record.upload_timestamp()));
                }
                _ => self.renderer.clear_order(page.style_mut(*key)),
            }
        }
        self.renderer.assign_order(page, &ordered);
    }

    /// How each part of the page contract matches the current markup
    pub fn diagnose(&self, page: &Page) -> DomDiagnostics {
        let card_selectors = self
            .contract
            .card_selectors
            .iter()
            .map(|(selector, parsed)| SelectorCount {
                selector: selector.to_string(),
                count: page.count(parsed),
            })
            .collect();

        let sample_title = page
            .cards(&self.contract.cards)
            .find_map(|(_, card)| card.select(&self.contract.title_candidates).next())
            .map(crate::extract::normalized_text)
            .filter(|text| !text.is_empty());
        let sample_duration = page
            .first(&self.contract.duration_candidates)
            .map(crate::extract::normalized_text)
            .filter(|text| !text.is_empty());

        DomDiagnostics {
            url: page.url().to_string(),
            sections: page.sections().count(),
            total_cards: page.card_count(&self.contract.cards),
            card_selectors,
            title_candidates: page.count(&self.contract.title_candidates),
            duration_candidates: page.count(&self.contract.duration_candidates),
            sample_title,
            sample_duration,
        }
    }

    /// Present cards with their last classification, in document order
    pub fn rows(&self, page: &Page) -> Vec<CardRow> {
        page.cards(&self.contract.cards)
            .filter_map(|(key, _)| {
                let record = self.registry.get(key)?;
                let style = page.style(key);
                Some(CardRow {
                    key,
                    title: record.attributes.title.clone(),
                    duration_text: record.attributes.duration_text.clone(),
                    duration_seconds: record.attributes.duration_seconds,
                    watched: watched_label(record.attributes.watched_pct),
                    upload_text: record.attributes.upload_text.clone(),
                    disposition: record.disposition(),
                    reasons: record.classification.reasons.clone(),
                    order: style.order,
                    style: style.to_css(),
                })
            })
            .collect()
    }
}
