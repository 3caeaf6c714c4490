//! HTML parsing via tree-sitter into an owned element table.
//!
//! The tree is walked once and flattened so later queries hold no borrows
//! into the tree-sitter `Tree`.

use std::ops::Range;
use std::path::Path;
use std::sync::LazyLock;

use regex::{Captures, Regex};
use tree_sitter::{Language, Node, Parser};

use crate::error::Error;

/// Maximum page size accepted (16 MiB).
const MAX_PAGE_SIZE: usize = 16 * 1024 * 1024;

/// Named or numeric character reference: `&amp;`, `&#8617;`, `&#x21A9;`.
static CHARACTER_REFERENCE: LazyLock<Option<Regex>> =
    LazyLock::new(|| return Regex::new(r"&(#[xX][0-9a-fA-F]{1,6}|#[0-9]{1,7}|[A-Za-z][A-Za-z0-9]{1,7});").ok());

/// One element of the parsed page, in document order.
#[derive(Debug, Clone)]
pub struct Element {
    /// Attribute name/value pairs in source order; names are lowercased.
    attributes: Vec<(String, String)>,
    /// Byte range between the end of the start tag and the start of the end tag.
    inner: Range<usize>,
    /// Byte range of the whole element including its tags.
    outer: Range<usize>,
    /// Index of the enclosing element, `None` at top level.
    parent: Option<usize>,
    /// Lowercased tag name.
    tag: String,
}

impl Element {
    /// Value of an attribute, or `None` when absent.
    /// Boolean attributes (no value) read as the empty string.
    pub fn attribute(&self, name: &str) -> Option<&str> {
        return self
            .attributes
            .iter()
            .find(|(n, _)| return n == name)
            .map(|(_, v)| return v.as_str());
    }

    /// Classes listed on the element, in source order.
    pub fn classes(&self) -> impl Iterator<Item = &str> {
        return self.attribute("class").unwrap_or("").split_ascii_whitespace();
    }

    /// Whether the `class` attribute lists the given class.
    pub fn has_class(&self, class: &str) -> bool {
        return self
            .attribute("class")
            .is_some_and(|classes| return classes.split_ascii_whitespace().any(|c| return c == class));
    }

    /// The element's `id`, if it has a non-empty one.
    pub fn id(&self) -> Option<&str> {
        return self.attribute("id").filter(|id| return !id.is_empty());
    }

    /// Lowercased tag name.
    pub fn tag(&self) -> &str {
        return &self.tag;
    }
}

/// A parsed HTML document or fragment.
#[derive(Debug, Clone)]
pub struct Markup {
    /// Every element in document (pre-)order.
    elements: Vec<Element>,
    /// The original markup text.
    source: String,
}

impl Markup {
    /// Run tree-sitter and flatten the element tree.
    fn build(source: String) -> Result<Self, String> {
        let language: Language = tree_sitter_html::LANGUAGE.into();
        let mut parser = Parser::new();
        parser.set_language(&language).map_err(|e| return e.to_string())?;
        let tree = parser
            .parse(&source, None)
            .ok_or_else(|| return "tree-sitter returned None".to_string())?;

        let elements = collect_elements(tree.root_node(), &source);
        return Ok(Self { elements, source });
    }

    /// Ancestor-or-self test over the parent chain.
    pub fn contains(&self, ancestor: usize, idx: usize) -> bool {
        let mut current = Some(idx);
        while let Some(i) = current {
            if i == ancestor {
                return true;
            }
            current = self.elements.get(i).and_then(|e| return e.parent);
        }
        return false;
    }

    /// Descendants of `ancestor` with the given tag, in document order.
    pub fn descendants_by_tag(&self, ancestor: usize, tag: &str) -> Vec<usize> {
        return self
            .elements
            .iter()
            .enumerate()
            .skip(ancestor.saturating_add(1))
            .take_while(|(i, _)| return self.contains(ancestor, *i))
            .filter(|(_, e)| return e.tag == tag)
            .map(|(i, _)| return i)
            .collect();
    }

    /// Element at an index of the table.
    pub fn element(&self, idx: usize) -> Option<&Element> {
        return self.elements.get(idx);
    }

    /// All elements whose id starts with `prefix`, in document order.
    pub fn find_all_by_id_prefix(&self, prefix: &str) -> Vec<usize> {
        return self
            .elements
            .iter()
            .enumerate()
            .filter(|(_, e)| return e.id().is_some_and(|id| return id.starts_with(prefix)))
            .map(|(i, _)| return i)
            .collect();
    }

    /// First element carrying the given class.
    pub fn find_by_class(&self, class: &str) -> Option<usize> {
        return self.elements.iter().position(|e| return e.has_class(class));
    }

    /// Markup between the element's start and end tags.
    pub fn inner_html(&self, idx: usize) -> &str {
        return self
            .elements
            .get(idx)
            .and_then(|e| return self.source.get(e.inner.clone()))
            .unwrap_or("");
    }

    /// True when the markup holds no elements at all.
    pub fn is_empty(&self) -> bool {
        return self.elements.is_empty();
    }

    /// Number of elements parsed.
    pub fn len(&self) -> usize {
        return self.elements.len();
    }

    /// Parse a whole page.
    ///
    /// # Errors
    ///
    /// Returns `Error::ParseFailed` if the page is too large or tree-sitter
    /// cannot produce a tree.
    pub fn parse(file: &Path, source: String) -> Result<Self, Error> {
        if source.len() > MAX_PAGE_SIZE {
            return Err(Error::ParseFailed {
                file: file.to_path_buf(),
                reason: format!("page is {} bytes (max {MAX_PAGE_SIZE})", source.len()),
            });
        }
        return Self::build(source).map_err(|reason| {
            return Error::ParseFailed {
                file: file.to_path_buf(),
                reason,
            };
        });
    }

    /// Parse a markup fragment such as the inside of a list item.
    /// Returns `None` only if tree-sitter itself refuses the input.
    pub fn parse_fragment(source: &str) -> Option<Self> {
        return Self::build(source.to_string()).ok();
    }

    /// Source text with one element (tags and content) cut out.
    pub fn without(&self, idx: usize) -> String {
        let Some(element) = self.elements.get(idx) else {
            return self.source.clone();
        };
        let before = self.source.get(..element.outer.start).unwrap_or("");
        let after = self.source.get(element.outer.end..).unwrap_or("");
        return format!("{before}{after}");
    }
}

/// Visible text of a markup string: tags dropped, whitespace runs collapsed.
pub fn text_content(html: &str) -> String {
    let mut text = String::with_capacity(html.len());
    let mut in_tag = false;
    for ch in html.chars() {
        match ch {
            '<' => in_tag = true,
            '>' if in_tag => {
                in_tag = false;
                text.push(' ');
            },
            _ if !in_tag => text.push(ch),
            _ => {},
        }
    }
    let decoded = decode_character_references(&text);
    return decoded.split_whitespace().collect::<Vec<_>>().join(" ");
}

/// Replace the common named references and every numeric one with the
/// character they stand for. Unknown names are left as written.
fn decode_character_references(text: &str) -> String {
    let Some(pattern) = CHARACTER_REFERENCE.as_ref() else {
        return text.to_string();
    };
    return pattern
        .replace_all(text, |caps: &Captures<'_>| {
            let whole = caps.get(0).map_or("", |m| return m.as_str());
            let name = caps.get(1).map_or("", |m| return m.as_str());
            return reference_char(name).map_or_else(|| return whole.to_string(), String::from);
        })
        .into_owned();
}

/// Character for one reference name (the part between `&` and `;`).
fn reference_char(name: &str) -> Option<char> {
    if let Some(hex) = name.strip_prefix("#x").or_else(|| return name.strip_prefix("#X")) {
        return u32::from_str_radix(hex, 16).ok().and_then(char::from_u32);
    }
    if let Some(decimal) = name.strip_prefix('#') {
        return decimal.parse::<u32>().ok().and_then(char::from_u32);
    }
    return match name {
        "amp" => Some('&'),
        "apos" => Some('\''),
        "gt" => Some('>'),
        "lt" => Some('<'),
        "nbsp" => Some('\u{a0}'),
        "quot" => Some('"'),
        _ => None,
    };
}

/// Walk the tree in document order and record every element.
/// Uses an explicit stack so deeply nested pages cannot exhaust the call stack.
fn collect_elements(root: Node<'_>, source: &str) -> Vec<Element> {
    let mut elements = Vec::new();
    let mut stack: Vec<(Node<'_>, Option<usize>)> = vec![(root, None)];

    while let Some((node, parent)) = stack.pop() {
        let own_index = match element_from_node(node, source, parent) {
            Some(element) => {
                elements.push(element);
                Some(elements.len().saturating_sub(1))
            },
            None => parent,
        };

        let mut cursor = node.walk();
        let children: Vec<Node<'_>> = node.named_children(&mut cursor).collect();
        for child in children.into_iter().rev() {
            stack.push((child, own_index));
        }
    }

    return elements;
}

/// Build an `Element` from an `element`, `script_element`, or `style_element` node.
fn element_from_node(node: Node<'_>, source: &str, parent: Option<usize>) -> Option<Element> {
    match node.kind() {
        "element" | "script_element" | "style_element" => {},
        _ => return None,
    }

    let mut cursor = node.walk();
    let mut open_tag = None;
    let mut end_tag = None;
    for child in node.named_children(&mut cursor) {
        match child.kind() {
            "start_tag" | "self_closing_tag" => open_tag = Some(child),
            "end_tag" => end_tag = Some(child),
            _ => {},
        }
    }
    let open_tag = open_tag?;

    let mut tag = String::new();
    let mut attributes = Vec::new();
    let mut tag_cursor = open_tag.walk();
    for child in open_tag.named_children(&mut tag_cursor) {
        match child.kind() {
            "tag_name" => tag = node_text(child, source).to_ascii_lowercase(),
            "attribute" => {
                if let Some(attribute) = attribute_from_node(child, source) {
                    attributes.push(attribute);
                }
            },
            _ => {},
        }
    }

    let inner_start = open_tag.end_byte();
    let inner_end = end_tag.map_or_else(|| return node.end_byte(), |t| return t.start_byte());

    return Some(Element {
        attributes,
        inner: inner_start..inner_end.max(inner_start),
        outer: node.start_byte()..node.end_byte(),
        parent,
        tag,
    });
}

/// Extract `(name, value)` from an `attribute` node.
fn attribute_from_node(node: Node<'_>, source: &str) -> Option<(String, String)> {
    let mut cursor = node.walk();
    let mut name = None;
    let mut value = String::new();
    for child in node.named_children(&mut cursor) {
        match child.kind() {
            "attribute_name" => name = Some(node_text(child, source).to_ascii_lowercase()),
            "attribute_value" => value = node_text(child, source).to_string(),
            "quoted_attribute_value" => {
                let mut inner_cursor = child.walk();
                value = child
                    .named_children(&mut inner_cursor)
                    .find(|c| return c.kind() == "attribute_value")
                    .map(|c| return node_text(c, source).to_string())
                    .unwrap_or_default();
            },
            _ => {},
        }
    }
    return name.map(|n| return (n, value));
}

/// Source text covered by a node.
fn node_text<'s>(node: Node<'_>, source: &'s str) -> &'s str {
    return node.utf8_text(source.as_bytes()).unwrap_or("");
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r##"<html><body>
<article class="prose wide"><p>Hello<sup><a id="user-content-fnref-1" href="#user-content-fn-1">1</a></sup></p></article>
<section class="footnotes"><ol><li id="user-content-fn-1"><p>Note <a href="#user-content-fnref-1" data-footnote-backref>↩</a></p></li></ol></section>
</body></html>"##;

    fn page() -> Markup {
        return Markup::parse(Path::new("page.html"), PAGE.to_string()).unwrap();
    }

    #[test]
    fn finds_elements_by_class_and_id_prefix() {
        let markup = page();
        let article = markup.find_by_class("prose").unwrap();
        assert_eq!(markup.element(article).unwrap().tag(), "article");
        assert!(markup.element(article).unwrap().has_class("wide"));

        let refs = markup.find_all_by_id_prefix("user-content-fnref-");
        assert_eq!(refs.len(), 1);
        assert!(markup.contains(article, refs[0]));
    }

    #[test]
    fn reads_quoted_and_boolean_attributes() {
        let markup = page();
        let anchors: Vec<&Element> = (0..markup.len())
            .filter_map(|i| markup.element(i))
            .filter(|e| e.tag() == "a")
            .collect();
        assert_eq!(anchors.len(), 2);
        assert_eq!(anchors[0].attribute("href"), Some("#user-content-fn-1"));
        assert_eq!(anchors[1].attribute("data-footnote-backref"), Some(""));
        assert_eq!(anchors[1].attribute("missing"), None);
    }

    #[test]
    fn descendants_stay_inside_ancestor() {
        let markup = page();
        let block = markup.find_by_class("footnotes").unwrap();
        let items = markup.descendants_by_tag(block, "li");
        assert_eq!(items.len(), 1);
        assert_eq!(markup.element(items[0]).unwrap().id(), Some("user-content-fn-1"));

        let article = markup.find_by_class("prose").unwrap();
        assert!(markup.descendants_by_tag(article, "li").is_empty());
    }

    #[test]
    fn inner_html_and_removal() {
        let markup = Markup::parse_fragment(r##"<p>Body <a class="back" href="#r">↩</a></p>"##).unwrap();
        assert_eq!(markup.element(0).unwrap().tag(), "p");
        assert_eq!(markup.inner_html(0), r##"Body <a class="back" href="#r">↩</a>"##);

        let anchor = markup.find_by_class("back").unwrap();
        assert_eq!(markup.without(anchor), "<p>Body </p>");
    }

    #[test]
    fn text_content_drops_tags() {
        assert_eq!(text_content("<p>One <em>two</em>\n three</p>"), "One two three");
        assert_eq!(text_content(""), "");
    }

    #[test]
    fn text_content_decodes_character_references() {
        assert_eq!(text_content("<p>Tom &amp; Jerry &#8617; &#x21A9;</p>"), "Tom & Jerry \u{21a9} \u{21a9}");
        assert_eq!(text_content("a&nbsp;b &lt;i&gt; &quot;q&quot;"), "a b <i> \"q\"");
        assert_eq!(text_content("&bogus; &#xFFFFFFF;"), "&bogus; &#xFFFFFFF;");
        assert_eq!(text_content("&amp;").chars().count(), 1);
    }

    #[test]
    fn oversized_page_is_rejected() {
        let huge = "x".repeat(MAX_PAGE_SIZE + 1);
        let result = Markup::parse(Path::new("big.html"), huge);
        assert!(matches!(result, Err(Error::ParseFailed { .. })));
    }
}
