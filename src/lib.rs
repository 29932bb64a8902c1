/// YouTube Feed Filter - Rust Implementation
///
/// Keeps a video feed page consistent with the user's filter rules: every card
/// is classified by duration, title keywords and watched progress, then hidden,
/// grayed or dimmed, and optionally re-ordered by upload recency. New cards
/// arriving through infinite scroll or feed swaps are picked up incrementally.

pub mod classify;
pub mod config;
pub mod error;
pub mod extract;
pub mod monitor;
pub mod page;
pub mod render;
pub mod scan;
pub mod settings;

// Re-export main types for easy access
pub use crate::classify::{Classification, Classifier, Disposition, RuleClassifier, SuppressReason};
pub use crate::config::{AppConfig, AppConfigBuilder};
pub use crate::error::{FilterError, Result};
pub use crate::extract::{AttributeExtractor, ExtractedAttributes, PageContract, SelectorExtractor};
pub use crate::monitor::{FeedMonitor, MonitorEvent, MonitorHandle, MonitorSnapshot, MonitorTimings};
pub use crate::page::{CardKey, CardStyle, MutationRecord, Page, PageEdit, SectionId};
pub use crate::render::{Renderer, StyleRenderer};
pub use crate::scan::{
    CardRegistry, CardRow, Clock, DomDiagnostics, FixedClock, ScanDriver, ScanReport, SystemClock,
};
pub use crate::settings::{
    ActiveConfig, ConfigGateway, Configuration, FilterMessage, FilterSettings, PartialSettings,
    StatusReply, SuppressStyle,
};
