/// Core domain types for footnote references, sidenote entries, and overlays.
use serde::{Deserialize, Serialize};

/// One inline footnote marker in the article body.
/// Built by the scanner; a rescan supersedes it rather than mutating it.
#[derive(Debug, Clone, PartialEq)]
pub struct FootnoteReference {
    /// Vertical position relative to the top of the article container.
    pub document_offset_top: f64,
    /// Content identifier derived from the marker's element id.
    pub identifier: String,
}

/// One body in the footnote list at the end of the article.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FootnoteContent {
    /// Inner markup with the backlink removed where one was found.
    pub html: String,
    /// Element id of the list item; same key space as `FootnoteReference::identifier`.
    pub identifier: String,
}

/// Lifecycle phase of the entry list held by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    /// Scanned, nothing measured yet.
    Built,
    /// No footnotes on the page.
    Empty,
    /// Some heights known, not every entry positioned.
    Measured,
    /// Every entry has a final position.
    Resolved,
}

/// A matched reference/content pair plus its computed layout.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SidenoteEntry {
    /// Rendered footnote body.
    pub content: String,
    /// Unique join key within one scan.
    pub identifier: String,
    /// Reference offset plus the configured vertical offset.
    pub initial_top: f64,
    /// Overlay height, once the overlay has been rendered and measured.
    pub measured_height: Option<f64>,
    /// Overlap-free position, once computed.
    pub resolved_top: Option<f64>,
}

impl SidenoteEntry {
    /// Bottom edge including the gap required before the next note.
    /// `None` until both height and position are known.
    pub fn bottom_with_spacing(&self, spacing: f64) -> Option<f64> {
        let top = self.resolved_top?;
        let height = self.measured_height?;
        return Some(top + height + spacing);
    }

    /// Fresh entry straight out of a scan: nothing measured, nothing resolved.
    pub fn unmeasured(identifier: String, content: String, initial_top: f64) -> Self {
        return Self {
            content,
            identifier,
            initial_top,
            measured_height: None,
            resolved_top: None,
        };
    }
}

/// A measured overlay element as reported by the rendering layer.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct Measurement {
    /// Rendered pixel height.
    pub height: f64,
    /// Whether the element participates in layout (not `display: none`).
    #[serde(default = "participates_in_layout")]
    pub in_layout: bool,
}

/// Descriptor handed to the renderer for one margin note.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Overlay {
    /// Rendered markup, including the number label when enabled.
    pub html: String,
    /// Identifier of the footnote this overlay shows.
    pub identifier: String,
    /// Resolved position, or the initial position while still pending.
    pub top: f64,
    /// False until the entry has a resolved position.
    pub visible: bool,
}

/// Viewport-relative bounding box of an element.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct Rect {
    /// Box height.
    #[serde(default)]
    pub height: f64,
    /// Distance from the top of the viewport.
    pub top: f64,
}

/// Serde default for `Measurement::in_layout`.
const fn participates_in_layout() -> bool {
    return true;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bottom_requires_height_and_position() {
        let mut entry = SidenoteEntry::unmeasured("fn-1".to_string(), "a".to_string(), 91.0);
        assert_eq!(entry.bottom_with_spacing(16.0), None);

        entry.resolved_top = Some(91.0);
        assert_eq!(entry.bottom_with_spacing(16.0), None);

        entry.measured_height = Some(80.0);
        assert_eq!(entry.bottom_with_spacing(16.0), Some(187.0));
    }

    #[test]
    fn measurement_defaults_to_in_layout() {
        let m: Measurement = serde_json::from_str(r#"{ "height": 12.5 }"#).unwrap();
        assert!(m.in_layout);
        assert!((m.height - 12.5).abs() < f64::EPSILON);
    }
}
