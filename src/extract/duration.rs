/// Duration badge parsing
///
/// This is the single source of truth for what counts as a real duration:
/// marker tokens never parse, everything else must match `[[h:]m]m:ss`.
use regex::Regex;
use std::sync::OnceLock;
use tracing::debug;

/// Badge texts that denote a listing without a fixed length
pub const NON_DURATION_MARKERS: [&str; 4] = ["LIVE", "SHORTS", "PREMIERE", "PLAYLIST"];

fn duration_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"(?:(\d{1,2}):)?(\d{1,2}):(\d{2})").ok())
        .as_ref()
}

/// Pattern used to pull a duration (or a marker) out of an accessible label
pub(crate) fn label_duration_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"(?i)(\d{1,2}:)?\d{1,2}:\d{2}|LIVE|SHORTS|PREMIERE").ok())
        .as_ref()
}

/// Convert badge text to seconds. `None` means unknown.
///
/// ```
/// use yt_feed_filter::extract::parse_duration_to_seconds;
/// assert_eq!(parse_duration_to_seconds("1:02:03"), Some(3723));
/// assert_eq!(parse_duration_to_seconds("9:05"), Some(545));
/// assert_eq!(parse_duration_to_seconds("LIVE"), None);
/// ```
pub fn parse_duration_to_seconds(text: &str) -> Option<u32> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }

    let upper = trimmed.to_uppercase();
    if let Some(marker) = NON_DURATION_MARKERS.iter().find(|m| upper.contains(*m)) {
        debug!(text = trimmed, marker, "non-duration marker");
        return None;
    }

    let captures = match duration_pattern().and_then(|re| re.captures(trimmed)) {
        Some(captures) => captures,
        None => {
            debug!(text = trimmed, "no duration match");
            return None;
        }
    };

    let part = |index: usize| -> Option<u32> {
        captures.get(index).and_then(|m| m.as_str().parse().ok())
    };
    let minutes = part(2)?;
    let seconds = part(3)?;

    Some(match part(1) {
        Some(hours) => hours * 3600 + minutes * 60 + seconds,
        None => minutes * 60 + seconds,
    })
}
