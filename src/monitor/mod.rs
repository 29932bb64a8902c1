/// Change monitor
///
/// `FeedMonitor` owns the page, the scan driver and the active configuration,
/// and decides when a scan pass runs. It is a plain state machine: events and
/// timer expiries come in with an explicit `now`, deadlines come out through
/// [`FeedMonitor::next_deadline`]. The async driver in [`runtime`] feeds it
/// from a channel and sleeps until the next deadline.

pub mod runtime;

pub use runtime::{forward_settings, spawn, MonitorHandle, MonitorTask};

use crate::classify::Classifier;
use crate::extract::AttributeExtractor;
use crate::page::{MutationRecord, Page, PageEdit};
use crate::render::Renderer;
use crate::scan::{CardRow, ScanDriver, ScanReport};
use crate::settings::{ActiveConfig, FilterSettings, Generation, PartialSettings, StatusReply};
use serde::Serialize;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonitorTimings {
    pub debounce: Duration,
    pub settle: Duration,
    pub url_poll: Duration,
    pub startup_delay: Duration,
    pub retry_interval: Duration,
    pub retry_attempts: u32,
}

impl Default for MonitorTimings {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(250),
            settle: Duration::from_millis(500),
            url_poll: Duration::from_millis(500),
            startup_delay: Duration::from_millis(200),
            retry_interval: Duration::from_millis(300),
            retry_attempts: 15,
        }
    }
}

/// Inputs to the monitor
#[derive(Debug, Clone, PartialEq)]
pub enum MonitorEvent {
    /// The host changed the page
    Page(PageEdit),
    /// Platform navigation-finished signal
    NavigateFinished,
    /// The persisted settings changed
    StorageChanged(PartialSettings),
    /// Settings pushed from the options surface
    UpdateFilters(PartialSettings),
    /// Detach the mutation observer
    Stop,
    /// Attach the mutation observer
    Start,
    /// Scan without resetting markers
    ScanNow,
    /// Reset markers and scan
    Reapply,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Timer {
    Startup,
    Debounce,
    Settle,
    UrlPoll,
}

#[derive(Debug, Default)]
struct Timers {
    startup: Option<Instant>,
    debounce: Option<Instant>,
    settle: Option<Instant>,
    url_poll: Option<Instant>,
}

impl Timers {
    fn slot(&mut self, timer: Timer) -> &mut Option<Instant> {
        match timer {
            Timer::Startup => &mut self.startup,
            Timer::Debounce => &mut self.debounce,
            Timer::Settle => &mut self.settle,
            Timer::UrlPoll => &mut self.url_poll,
        }
    }

    fn all(&self) -> [(Timer, Option<Instant>); 4] {
        [
            (Timer::Startup, self.startup),
            (Timer::Debounce, self.debounce),
            (Timer::Settle, self.settle),
            (Timer::UrlPoll, self.url_poll),
        ]
    }

    /// Earliest expired timer, removed from its slot
    fn take_due(&mut self, now: Instant) -> Option<Timer> {
        let (timer, _) = self
            .all()
            .into_iter()
            .filter_map(|(timer, deadline)| deadline.filter(|d| *d <= now).map(|d| (timer, d)))
            .min_by_key(|(_, deadline)| *deadline)?;
        self.slot(timer).take();
        Some(timer)
    }

    fn next(&self) -> Option<Instant> {
        self.all().into_iter().filter_map(|(_, deadline)| deadline).min()
    }
}

/// Counters exposed for diagnostics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MonitorStats {
    pub scans: usize,
    pub failed_scans: usize,
    pub resets: usize,
    pub startup_attempts: u32,
    pub last_report: Option<ScanReport>,
}

/// Point-in-time view of the monitor
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonitorSnapshot {
    pub url: String,
    pub generation: Generation,
    pub observing: bool,
    pub total_cards: usize,
    pub stats: MonitorStats,
}

pub struct FeedMonitor<E, C, R> {
    page: Page,
    driver: ScanDriver<E, C, R>,
    active: ActiveConfig,
    defaults: FilterSettings,
    timings: MonitorTimings,
    timers: Timers,
    started: bool,
    observing: bool,
    last_url: String,
    stats: MonitorStats,
}

impl<E, C, R> FeedMonitor<E, C, R>
where
    E: AttributeExtractor,
    C: Classifier,
    R: Renderer,
{
    pub fn new(page: Page, driver: ScanDriver<E, C, R>, settings: FilterSettings) -> Self {
        let last_url = page.url().to_string();
        Self {
            page,
            driver,
            active: ActiveConfig::new(settings),
            defaults: FilterSettings::default(),
            timings: MonitorTimings::default(),
            timers: Timers::default(),
            started: false,
            observing: false,
            last_url,
            stats: MonitorStats::default(),
        }
    }

    pub fn with_timings(mut self, timings: MonitorTimings) -> Self {
        self.timings = timings;
        self
    }

    /// Settings that stored keys are merged over on a storage change
    pub fn with_defaults(mut self, defaults: FilterSettings) -> Self {
        self.defaults = defaults;
        self
    }

    pub fn page(&self) -> &Page {
        &self.page
    }

    pub fn driver(&self) -> &ScanDriver<E, C, R> {
        &self.driver
    }

    pub fn settings(&self) -> &FilterSettings {
        self.active.settings()
    }

    pub fn active(&self) -> &ActiveConfig {
        &self.active
    }

    pub fn is_observing(&self) -> bool {
        self.observing
    }

    pub fn stats(&self) -> &MonitorStats {
        &self.stats
    }

    pub fn snapshot(&self) -> MonitorSnapshot {
        MonitorSnapshot {
            url: self.page.url().to_string(),
            generation: self.active.generation(),
            observing: self.observing,
            total_cards: self.driver.card_count(&self.page),
            stats: self.stats.clone(),
        }
    }

    pub fn rows(&self) -> Vec<CardRow> {
        self.driver.rows(&self.page)
    }

    /// Attach the observer. The first call also starts the URL watcher and
    /// schedules the startup scan.
    pub fn start(&mut self, now: Instant) {
        if !self.observing {
            self.observing = true;
            info!("👀 Observer started");
        }
        if self.started {
            return;
        }
        self.started = true;
        self.last_url = self.page.url().to_string();
        *self.timers.slot(Timer::UrlPoll) = Some(now + self.timings.url_poll);
        *self.timers.slot(Timer::Startup) = Some(now + self.timings.startup_delay);
        debug!(url = %self.last_url, "URL watcher attached");
    }

    /// Detach the observer; pending mutation-driven scans are dropped.
    /// Stopping a stopped monitor does nothing.
    pub fn stop(&mut self) {
        if !self.observing {
            return;
        }
        self.observing = false;
        self.timers.debounce = None;
        self.timers.settle = None;
        info!("🛑 Observer stopped");
    }

    /// Handle one event to completion. Only `UpdateFilters` produces a reply.
    pub fn handle(&mut self, event: MonitorEvent, now: Instant) -> Option<StatusReply> {
        match event {
            MonitorEvent::Page(edit) => {
                let record = self.page.apply(edit);
                self.observe(&record, now);
                self.check_url("observer");
                None
            }
            MonitorEvent::NavigateFinished => {
                debug!("Navigation finished");
                self.last_url = self.page.url().to_string();
                self.reapply("navigate finished");
                None
            }
            MonitorEvent::StorageChanged(stored) => {
                let settings = self.defaults.merged(&stored);
                let generation = self.active.replace(settings);
                info!(
                    generation = generation.0,
                    "⚙️ Settings changed in storage: {}",
                    self.active.settings().summary()
                );
                self.reapply("storage changed");
                None
            }
            MonitorEvent::UpdateFilters(partial) => {
                let settings = self.active.settings().merged(&partial);
                let generation = self.active.replace(settings);
                info!(
                    generation = generation.0,
                    "⚙️ Filters updated: {}",
                    self.active.settings().summary()
                );
                self.reapply("filters updated");
                Some(StatusReply::applied())
            }
            MonitorEvent::Stop => {
                self.stop();
                None
            }
            MonitorEvent::Start => {
                self.start(now);
                None
            }
            MonitorEvent::ScanNow => {
                self.run_scan("manual");
                None
            }
            MonitorEvent::Reapply => {
                self.reapply("manual");
                None
            }
        }
    }

    /// Earliest pending timer deadline
    pub fn next_deadline(&self) -> Option<Instant> {
        self.timers.next()
    }

    /// Run every timer whose deadline is at or before `now`
    pub fn fire_due(&mut self, now: Instant) {
        while let Some(timer) = self.timers.take_due(now) {
            match timer {
                Timer::Startup => self.startup_attempt(now),
                Timer::Debounce => {
                    debug!("Debounced scan");
                    self.run_scan("debounce");
                }
                Timer::Settle => {
                    debug!("Settle scan after feed swap");
                    self.run_scan("settle");
                }
                Timer::UrlPoll => {
                    self.check_url("poll");
                    *self.timers.slot(Timer::UrlPoll) = Some(now + self.timings.url_poll);
                }
            }
        }
    }

    fn observe(&mut self, record: &MutationRecord, now: Instant) {
        if !self.observing || record.added.is_empty() {
            return;
        }

        let contract = self.driver.contract().clone();
        let major = record
            .added
            .iter()
            .any(|id| self.page.section_contains(*id, &contract.major_containers));
        if major {
            info!(added = record.added.len(), "📺 Feed container replaced");
            self.reapply("feed swap");
            *self.timers.slot(Timer::Settle) = Some(now + self.timings.settle);
            return;
        }

        let has_cards = record
            .added
            .iter()
            .any(|id| self.page.section_contains(*id, &contract.cards));
        if has_cards {
            debug!(added = record.added.len(), "Card mutation, debouncing scan");
            *self.timers.slot(Timer::Debounce) = Some(now + self.timings.debounce);
        }
    }

    fn check_url(&mut self, source: &str) {
        if self.page.url() == self.last_url {
            return;
        }
        info!(source, from = %self.last_url, to = %self.page.url(), "🧭 URL changed");
        self.last_url = self.page.url().to_string();
        self.reapply("url change");
    }

    fn startup_attempt(&mut self, now: Instant) {
        let report = self.run_scan("startup");
        let empty = self.driver.card_count(&self.page) == 0;

        if !empty {
            match report {
                Some(report) => info!(
                    attempts = self.stats.startup_attempts,
                    cards = report.total_cards,
                    "✅ Initial scan completed"
                ),
                None => warn!("Initial scan failed on a populated feed"),
            }
        } else if self.stats.startup_attempts < self.timings.retry_attempts {
            self.stats.startup_attempts += 1;
            warn!(
                "Initial scan found no cards (attempt {}/{})",
                self.stats.startup_attempts, self.timings.retry_attempts
            );
            *self.timers.slot(Timer::Startup) = Some(now + self.timings.retry_interval);
        } else {
            warn!(
                attempts = self.stats.startup_attempts,
                "Initial scan gave up, feed still empty"
            );
        }
    }

    fn reapply(&mut self, trigger: &str) {
        self.driver.reset();
        self.stats.resets += 1;
        self.run_scan(trigger);
    }

    fn run_scan(&mut self, trigger: &str) -> Option<ScanReport> {
        self.stats.scans += 1;
        match self.driver.scan(&mut self.page, &self.active) {
            Ok(report) => {
                debug!(
                    trigger,
                    processed = report.processed,
                    total = report.total_cards,
                    "Scan pass done"
                );
                self.stats.last_report = Some(report);
                Some(report)
            }
            Err(e) => {
                self.stats.failed_scans += 1;
                warn!(trigger, "Scan pass aborted: {}", e);
                None
            }
        }
    }
}
