/// Visual side effects: hide, dim, restore and recency ordering
use crate::classify::Disposition;
use crate::error::Result;
use crate::page::{CardKey, CardStyle, Page};
use crate::settings::SuppressStyle;

pub const DIM_OPACITY: &str = "0.4";
pub const DIM_FILTER: &str = "grayscale(100%)";

/// Applies dispositions and layout order to cards
pub trait Renderer {
    /// Bring the card's style to the state `disposition` calls for.
    ///
    /// Fails with `StaleCard` when the card is no longer attached.
    fn render(&self, page: &mut Page, key: CardKey, disposition: &Disposition) -> Result<()>;

    /// Order `cards` (document order, with upload timestamps) newest first
    fn assign_order(&self, page: &mut Page, cards: &[(CardKey, Option<i64>)]);

    fn clear_order(&self, style: &mut CardStyle) {
        style.order = None;
    }
}

/// Renders through the page's inline style overlay
#[derive(Debug, Clone, Copy, Default)]
pub struct StyleRenderer;

impl StyleRenderer {
    pub fn new() -> Self {
        Self
    }

    fn dim(style: &mut CardStyle) {
        style.opacity = Some(DIM_OPACITY.to_string());
        style.pointer_events = Some("none".to_string());
        style.filter = Some(DIM_FILTER.to_string());
        style.aria_hidden = true;
    }

    fn hide(style: &mut CardStyle) {
        style.display = Some("none".to_string());
        style.aria_hidden = true;
    }
}

/// Rewrite the suppression properties of `style`; the end state depends only
/// on `disposition`, whatever was there before
pub fn apply_disposition(style: &mut CardStyle, disposition: &Disposition) {
    style.clear_suppression();
    match disposition {
        Disposition::Visible => {}
        Disposition::Dimmed => StyleRenderer::dim(style),
        Disposition::Suppressed {
            style: SuppressStyle::Dim,
            ..
        } => StyleRenderer::dim(style),
        Disposition::Suppressed {
            style: SuppressStyle::Hide,
            ..
        } => StyleRenderer::hide(style),
    }
}

impl Renderer for StyleRenderer {
    fn render(&self, page: &mut Page, key: CardKey, disposition: &Disposition) -> Result<()> {
        apply_disposition(page.try_style_mut(key)?, disposition);
        Ok(())
    }

    fn assign_order(&self, page: &mut Page, cards: &[(CardKey, Option<i64>)]) {
        let mut dated: Vec<(CardKey, i64)> = cards
            .iter()
            .filter_map(|(key, timestamp)| timestamp.map(|ts| (*key, ts)))
            .collect();
        // Stable: equal timestamps keep document order.
        dated.sort_by(|a, b| b.1.cmp(&a.1));

        for (order, (key, _)) in dated.iter().enumerate() {
            page.style_mut(*key).order = Some(order);
        }
        for (key, timestamp) in cards {
            if timestamp.is_none() {
                self.clear_order(page.style_mut(*key));
            }
        }
    }
}
