use std::collections::{HashMap, HashSet};

use crate::backlink;
use crate::config::Config;
use crate::document::DocumentQuery;
use crate::types::{FootnoteContent, FootnoteReference, SidenoteEntry};

/// Scan a rendered page and build a fresh, ordered sidenote list.
/// Every entry comes back unmeasured and unresolved, sorted by initial top.
///
/// An absent container, footnote block, or reference set is the normal
/// "no footnotes on this page" state and yields an empty list.
pub fn scan<D: DocumentQuery>(doc: &D, config: &Config) -> Vec<SidenoteEntry> {
    let Some(container) = doc.find_by_class(&config.container_class) else {
        log::warn!("article container `.{}` not found", config.container_class);
        return Vec::new();
    };
    let Some(block) = doc.find_by_class(&config.footnotes_class) else {
        log::debug!("no `.{}` block on the page", config.footnotes_class);
        return Vec::new();
    };
    let markers = doc.find_all_by_id_prefix(&config.reference_prefix);
    if markers.is_empty() {
        log::debug!("no reference markers with prefix `{}`", config.reference_prefix);
        return Vec::new();
    }

    let contents = collect_footnote_contents(doc, block, config);
    let references = collect_footnote_references(doc, container, &markers, config);
    return join_references_with_contents(&references, &contents, config.vertical_offset);
}

/// Collect footnote bodies keyed by list item id. The first item with a given
/// id wins; items without an id are skipped.
pub fn collect_footnote_contents<D: DocumentQuery>(
    doc: &D,
    block: D::Handle,
    config: &Config,
) -> HashMap<String, FootnoteContent> {
    let mut contents: HashMap<String, FootnoteContent> = HashMap::new();

    for item in doc.descendants_by_tag(block, "li") {
        let Some(identifier) = doc.id(item) else {
            continue;
        };
        if contents.contains_key(&identifier) {
            log::debug!("duplicate footnote item `{identifier}` ignored");
            continue;
        }
        let body = backlink::extract_body(&doc.inner_html(item), config);
        log::trace!("footnote `{identifier}` backlink: {:?}", body.removal);
        contents.insert(identifier.clone(), FootnoteContent {
            html: body.html,
            identifier,
        });
    }

    return contents;
}

/// Measure each reference marker against the container, in document order.
/// Both boxes are shifted by the scroll offset so the result does not depend
/// on where the viewport was when the boxes were taken.
pub fn collect_footnote_references<D: DocumentQuery>(
    doc: &D,
    container: D::Handle,
    markers: &[D::Handle],
    config: &Config,
) -> Vec<FootnoteReference> {
    let Some(container_box) = doc.bounding_box(container) else {
        log::debug!("article container has no geometry");
        return Vec::new();
    };
    let scroll_y = doc.scroll_y();
    let container_top = container_box.top + scroll_y;

    let mut references = Vec::with_capacity(markers.len());
    for &marker in markers {
        let Some(marker_id) = doc.id(marker) else {
            continue;
        };
        let Some(identifier) = config.content_id_for(&marker_id) else {
            continue;
        };
        let Some(marker_box) = doc.bounding_box(marker) else {
            log::debug!("reference `{marker_id}` has no geometry, skipped");
            continue;
        };
        references.push(FootnoteReference {
            document_offset_top: marker_box.top + scroll_y - container_top,
            identifier,
        });
    }
    return references;
}

/// Join references to contents and sort by initial top.
/// References without content are dropped; a repeated identifier keeps only
/// its first reference in document order.
pub fn join_references_with_contents(
    references: &[FootnoteReference],
    contents: &HashMap<String, FootnoteContent>,
    vertical_offset: f64,
) -> Vec<SidenoteEntry> {
    let mut seen: HashSet<&str> = HashSet::new();
    let mut entries = Vec::new();

    for reference in references {
        if seen.contains(reference.identifier.as_str()) {
            log::debug!("repeated reference to `{}` dropped", reference.identifier);
            continue;
        }
        let Some(content) = contents.get(&reference.identifier) else {
            log::debug!("reference to `{}` has no footnote content, dropped", reference.identifier);
            continue;
        };
        seen.insert(reference.identifier.as_str());
        entries.push(SidenoteEntry::unmeasured(
            reference.identifier.clone(),
            content.html.clone(),
            reference.document_offset_top + vertical_offset,
        ));
    }

    // Stable: entries with equal tops keep document order.
    entries.sort_by(|a, b| return a.initial_top.total_cmp(&b.initial_top));
    return entries;
}
