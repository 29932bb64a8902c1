/// Card classification against the active rule set
use crate::extract::ExtractedAttributes;
use crate::settings::{Configuration, SuppressStyle};
use serde::Serialize;
use std::fmt;

/// Why a card was suppressed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SuppressReason {
    NoTitle,
    TooShort,
    TooLong,
    Keyword,
    UnknownDuration,
}

impl SuppressReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SuppressReason::NoTitle => "no_title",
            SuppressReason::TooShort => "too_short",
            SuppressReason::TooLong => "too_long",
            SuppressReason::Keyword => "keyword",
            SuppressReason::UnknownDuration => "unknown_duration",
        }
    }
}

impl fmt::Display for SuppressReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Visual outcome for a card
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Disposition {
    Visible,
    /// Watched past the threshold; always dimmed, never hidden
    Dimmed,
    Suppressed {
        style: SuppressStyle,
        reason: SuppressReason,
    },
}

impl Disposition {
    pub fn is_suppressed(&self) -> bool {
        matches!(self, Disposition::Suppressed { .. })
    }

    pub fn reason(&self) -> Option<SuppressReason> {
        match self {
            Disposition::Suppressed { reason, .. } => Some(*reason),
            _ => None,
        }
    }

    /// Short label used in logs and CLI output
    pub fn label(&self) -> &'static str {
        match self {
            Disposition::Visible => "visible",
            Disposition::Dimmed => "dimmed",
            Disposition::Suppressed {
                style: SuppressStyle::Hide,
                ..
            } => "hidden",
            Disposition::Suppressed {
                style: SuppressStyle::Dim,
                ..
            } => "grayed",
        }
    }
}

/// Disposition plus every rule that matched, for diagnostics
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Classification {
    pub disposition: Disposition,
    pub reasons: Vec<SuppressReason>,
}

/// Decides a card's disposition
pub trait Classifier {
    fn classify(&self, attrs: &ExtractedAttributes, config: &Configuration) -> Classification;
}

/// Duration, keyword, unknown-duration and watched rules.
///
/// Filter rules outrank watched dimming: a card matching both is suppressed.
#[derive(Debug, Clone, Copy, Default)]
pub struct RuleClassifier;

impl RuleClassifier {
    pub fn new() -> Self {
        Self
    }
}

impl Classifier for RuleClassifier {
    fn classify(&self, attrs: &ExtractedAttributes, config: &Configuration) -> Classification {
        if attrs.title.is_empty() {
            return Classification {
                disposition: Disposition::Suppressed {
                    style: config.suppress_style,
                    reason: SuppressReason::NoTitle,
                },
                reasons: vec![SuppressReason::NoTitle],
            };
        }

        let mut reasons = Vec::new();

        if let Some(seconds) = attrs.duration_seconds {
            if seconds < config.min_duration_seconds {
                reasons.push(SuppressReason::TooShort);
            }
            if config.max_duration_seconds.map_or(false, |max| seconds > max) {
                reasons.push(SuppressReason::TooLong);
            }
        }

        if config
            .banned_keywords
            .iter()
            .any(|keyword| attrs.title.contains(keyword.as_str()))
        {
            reasons.push(SuppressReason::Keyword);
        }

        if attrs.duration_seconds.is_none() && config.hide_unknown_durations {
            reasons.push(SuppressReason::UnknownDuration);
        }

        let disposition = match reasons.first() {
            Some(reason) => Disposition::Suppressed {
                style: config.suppress_style,
                reason: *reason,
            },
            None if attrs.watched_pct >= config.watched_threshold_pct => Disposition::Dimmed,
            None => Disposition::Visible,
        };

        Classification {
            disposition,
            reasons,
        }
    }
}
