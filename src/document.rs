//! Read-only query surface over a rendered page.
//!
//! The scanner never touches markup or geometry directly; it goes through
//! `DocumentQuery`, which `HtmlDocument` implements for an exported page plus
//! its layout snapshot.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::Error;
use crate::markup::Markup;
use crate::types::{Measurement, Rect};

/// Capability interface the scanner reads the page through.
pub trait DocumentQuery {
    /// Opaque handle to one element.
    type Handle: Copy;

    /// Viewport-relative bounding box, or `None` when the element has no layout.
    fn bounding_box(&self, element: Self::Handle) -> Option<Rect>;

    /// Descendants of `ancestor` with the given tag, in document order.
    fn descendants_by_tag(&self, ancestor: Self::Handle, tag: &str) -> Vec<Self::Handle>;

    /// Every element whose id starts with `prefix`, in document order.
    fn find_all_by_id_prefix(&self, prefix: &str) -> Vec<Self::Handle>;

    /// First element carrying `class`.
    fn find_by_class(&self, class: &str) -> Option<Self::Handle>;

    /// The element's id attribute.
    fn id(&self, element: Self::Handle) -> Option<String>;

    /// Markup between the element's tags.
    fn inner_html(&self, element: Self::Handle) -> String;

    /// Current vertical scroll of the viewport.
    fn scroll_y(&self) -> f64;
}

/// Geometry exported from a browser session alongside the page markup.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LayoutSnapshot {
    /// Bounding boxes keyed by element id, or `.class` for elements without one.
    #[serde(default)]
    pub boxes: HashMap<String, Rect>,
    /// Measured overlay elements keyed by content identifier.
    #[serde(default)]
    pub overlays: HashMap<String, Measurement>,
    /// Vertical scroll of the viewport when the boxes were taken.
    #[serde(default)]
    pub scroll_y: f64,
}

impl LayoutSnapshot {
    /// Parse snapshot JSON.
    ///
    /// # Errors
    ///
    /// Returns `Error::LayoutInvalid` if the content is not a snapshot document.
    pub fn parse(path: &Path, content: &str) -> Result<Self, Error> {
        return serde_json::from_str(content).map_err(|e| {
            return Error::LayoutInvalid {
                path: path.to_path_buf(),
                reason: e.to_string(),
            };
        });
    }

    /// Read and parse a snapshot from disk.
    ///
    /// # Errors
    ///
    /// Returns `Error::FileNotFound` if the file doesn't exist,
    /// `Error::Io` for other read failures,
    /// or `Error::LayoutInvalid` if the content cannot be parsed.
    pub fn read(path: &Path) -> Result<Self, Error> {
        let content = read_input(path)?;
        return Self::parse(path, &content);
    }
}

/// A page's markup joined with its layout snapshot.
#[derive(Debug, Clone)]
pub struct HtmlDocument {
    /// Geometry for the page.
    layout: LayoutSnapshot,
    /// Parsed page markup.
    markup: Markup,
}

impl HtmlDocument {
    /// Parse an in-memory page and snapshot.
    ///
    /// # Errors
    ///
    /// Returns `Error::ParseFailed` or `Error::LayoutInvalid`.
    #[cfg(test)]
    pub fn from_strings(html: &str, layout_json: &str) -> Result<Self, Error> {
        let markup = Markup::parse(Path::new("<memory>"), html.to_string())?;
        let layout = LayoutSnapshot::parse(Path::new("<memory>"), layout_json)?;
        return Ok(Self::new(markup, layout));
    }

    /// The page's geometry snapshot.
    pub const fn layout(&self) -> &LayoutSnapshot {
        return &self.layout;
    }

    /// Join already-parsed markup with a snapshot.
    pub fn new(markup: Markup, layout: LayoutSnapshot) -> Self {
        return Self { layout, markup };
    }

    /// Read and parse a page and its snapshot from disk.
    ///
    /// # Errors
    ///
    /// Returns file, parse, or snapshot errors for either input.
    pub fn open(page: &Path, layout: &Path) -> Result<Self, Error> {
        let source = read_input(page)?;
        let markup = Markup::parse(page, source)?;
        let snapshot = LayoutSnapshot::read(layout)?;
        return Ok(Self::new(markup, snapshot));
    }
}

impl DocumentQuery for HtmlDocument {
    type Handle = usize;

    /// Look the element up by id first, then by each of its classes.
    fn bounding_box(&self, element: usize) -> Option<Rect> {
        let node = self.markup.element(element)?;
        if let Some(rect) = node.id().and_then(|id| return self.layout.boxes.get(id)) {
            return Some(*rect);
        }
        return node
            .classes()
            .find_map(|class| return self.layout.boxes.get(&format!(".{class}")))
            .copied();
    }

    fn descendants_by_tag(&self, ancestor: usize, tag: &str) -> Vec<usize> {
        return self.markup.descendants_by_tag(ancestor, tag);
    }

    fn find_all_by_id_prefix(&self, prefix: &str) -> Vec<usize> {
        return self.markup.find_all_by_id_prefix(prefix);
    }

    fn find_by_class(&self, class: &str) -> Option<usize> {
        return self.markup.find_by_class(class);
    }

    fn id(&self, element: usize) -> Option<String> {
        return self.markup.element(element).and_then(|e| return e.id()).map(str::to_string);
    }

    fn inner_html(&self, element: usize) -> String {
        return self.markup.inner_html(element).to_string();
    }

    fn scroll_y(&self) -> f64 {
        return self.layout.scroll_y;
    }
}

/// Default snapshot location for a page: `post.html` → `post.layout.json`.
pub fn default_layout_path(page: &Path) -> PathBuf {
    return page.with_extension("layout.json");
}

/// Read an input file, mapping not-found to a diagnostic that names the path.
///
/// # Errors
///
/// Returns `Error::FileNotFound` or `Error::Io`.
pub fn read_input(path: &Path) -> Result<String, Error> {
    return match std::fs::read_to_string(path) {
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Err(Error::FileNotFound { path: path.to_path_buf() })
        },
        Err(e) => Err(Error::Io(e)),
        Ok(c) => Ok(c),
    };
}
