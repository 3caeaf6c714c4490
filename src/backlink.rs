//! Footnote body extraction: drop the "back to reference" link, keep the text.
//!
//! The link is found by the configured marker attribute. Renderers that do not
//! emit the marker are handled by two fallbacks, tried in order: an href that
//! points at a reference marker, then a trailing anchor that only holds a
//! return glyph or icon. If nothing matches, the link stays in the body.

use crate::config::Config;
use crate::markup::{Markup, text_content};

/// Glyphs renderers use for the return link.
const RETURN_GLYPHS: &[&str] = &["↩", "↩\u{fe0e}", "↩\u{fe0f}", "⤴", "↑"];

/// How the backlink was located, if at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Removal {
    /// Trailing anchor holding only a return glyph or icon.
    Glyph,
    /// Anchor whose href targets a reference marker.
    Href,
    /// Anchor carrying the configured marker attribute.
    Marker,
    /// No backlink found; the body is left as rendered.
    NotFound,
}

/// Footnote body ready for display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Body {
    /// Markup of the first paragraph, or the whole item when it has none.
    pub html: String,
    /// Which rule removed the backlink.
    pub removal: Removal,
}

/// Turn a footnote list item's inner markup into a sidenote body.
pub fn extract_body(item_html: &str, config: &Config) -> Body {
    let Some(markup) = Markup::parse_fragment(item_html).filter(|m| return !m.is_empty()) else {
        log::debug!("footnote body has no markup, using it verbatim");
        return Body {
            html: item_html.trim().to_string(),
            removal: Removal::NotFound,
        };
    };

    let (stripped, removal) = match find_backlink(&markup, config) {
        Some((idx, removal)) => (strip_repeats(markup.without(idx), removal, config), removal),
        None => (item_html.to_string(), Removal::NotFound),
    };
    if removal == Removal::NotFound {
        log::debug!("no backlink found in footnote body, leaving it in place");
    }

    return Body {
        html: first_paragraph_or_whole(&stripped),
        removal,
    };
}

/// Locate the backlink anchor, trying the marker, then href, then glyph rules.
fn find_backlink(markup: &Markup, config: &Config) -> Option<(usize, Removal)> {
    let anchors: Vec<usize> = (0..markup.len())
        .filter(|&i| return markup.element(i).is_some_and(|e| return e.tag() == "a"))
        .collect();

    let marked = anchors.iter().copied().find(|&i| {
        return markup
            .element(i)
            .is_some_and(|e| return e.attribute(&config.backref_attribute).is_some());
    });
    if let Some(idx) = marked {
        return Some((idx, Removal::Marker));
    }

    let href_target = format!("#{}", config.reference_prefix);
    let by_href = anchors.iter().copied().find(|&i| {
        return markup
            .element(i)
            .and_then(|e| return e.attribute("href"))
            .is_some_and(|href| return href.starts_with(&href_target));
    });
    if let Some(idx) = by_href {
        return Some((idx, Removal::Href));
    }

    let last = *anchors.last()?;
    if is_return_glyph(markup, last) {
        return Some((last, Removal::Glyph));
    }
    return None;
}

/// A note cited several times carries one backlink per citation. Remove the
/// rest of them, but only those matched by the same rule as the first.
fn strip_repeats(mut html: String, removal: Removal, config: &Config) -> String {
    if removal == Removal::Glyph {
        return html;
    }
    while let Some(markup) = Markup::parse_fragment(&html)
        && let Some((idx, again)) = find_backlink(&markup, config)
        && again == removal
    {
        html = markup.without(idx);
    }
    return html;
}

/// Whether an anchor holds nothing but a return glyph or an icon element.
fn is_return_glyph(markup: &Markup, anchor: usize) -> bool {
    let inner = markup.inner_html(anchor);
    let text = text_content(inner);
    if RETURN_GLYPHS.contains(&text.as_str()) {
        return true;
    }
    let has_icon = ["svg", "i", "img"]
        .iter()
        .any(|tag| return !markup.descendants_by_tag(anchor, tag).is_empty());
    return text.is_empty() && has_icon;
}

/// Inner markup of the first `<p>`, or the whole fragment trimmed.
fn first_paragraph_or_whole(html: &str) -> String {
    let paragraph = Markup::parse_fragment(html).and_then(|markup| {
        let first = (0..markup.len()).find(|&i| return markup.element(i).is_some_and(|e| return e.tag() == "p"))?;
        return Some(markup.inner_html(first).trim().to_string());
    });
    return paragraph
        .filter(|p| return !p.is_empty())
        .unwrap_or_else(|| return html.trim().to_string());
}
