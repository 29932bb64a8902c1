/// Inline style overlay applied to a card by the renderer
use serde::Serialize;

/// The subset of inline style a card can carry.
///
/// `None` means the property is unset, so the element falls back to its
/// stylesheet/inherited value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CardStyle {
    pub display: Option<String>,
    pub opacity: Option<String>,
    pub pointer_events: Option<String>,
    pub filter: Option<String>,
    /// `aria-hidden="true"` on the element
    pub aria_hidden: bool,
    /// Flex/grid layout order
    pub order: Option<usize>,
}

impl CardStyle {
    /// Reset every suppression-related property. Layout order is left alone.
    pub fn clear_suppression(&mut self) {
        self.display = None;
        self.opacity = None;
        self.pointer_events = None;
        self.filter = None;
        self.aria_hidden = false;
    }

    pub fn is_hidden(&self) -> bool {
        self.display.as_deref() == Some("none")
    }

    pub fn is_dimmed(&self) -> bool {
        self.opacity.is_some() && self.filter.is_some()
    }

    /// Render as an inline `style` attribute value
    pub fn to_css(&self) -> String {
        let mut decls = Vec::new();
        if let Some(display) = &self.display {
            decls.push(format!("display: {}", display));
        }
        if let Some(opacity) = &self.opacity {
            decls.push(format!("opacity: {}", opacity));
        }
        if let Some(pointer_events) = &self.pointer_events {
            decls.push(format!("pointer-events: {}", pointer_events));
        }
        if let Some(filter) = &self.filter {
            decls.push(format!("filter: {}", filter));
        }
        if let Some(order) = self.order {
            decls.push(format!("order: {}", order));
        }
        decls.join("; ")
    }
}

/// Look up a single property in an inline `style` attribute value.
///
/// `inline_style_property("width: 40%; height: 3px", "width") == Some("40%")`
pub fn inline_style_property(style_attr: &str, property: &str) -> Option<String> {
    style_attr
        .split(';')
        .filter_map(|decl| decl.split_once(':'))
        .find(|(name, _)| name.trim().eq_ignore_ascii_case(property))
        .map(|(_, value)| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
