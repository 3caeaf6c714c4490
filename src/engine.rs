//! Owner of the sidenote list and its lifecycle.
//!
//! The list moves built → measured → resolved and is only ever replaced
//! wholesale by a rescan. A rescan that finds the same footnotes in the
//! same order at the same tops keeps the current list so downstream
//! measurement is not redone.

use std::sync::LazyLock;

use regex::Regex;

use crate::config::Config;
use crate::document::DocumentQuery;
use crate::resolver::{self, OverlayMeasure};
use crate::scanner;
use crate::types::{Overlay, Phase, SidenoteEntry};

/// Trailing number of a footnote identifier, used for the overlay label.
static TRAILING_NUMBER: LazyLock<Option<Regex>> = LazyLock::new(|| return Regex::new(r"(\d+)$").ok());

/// What a rescan did to the held list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanOutcome {
    /// Footnotes vanished; the held list was emptied.
    Cleared,
    /// A different list replaced the held one.
    Replaced,
    /// Same footnotes at the same tops as before; nothing replaced.
    Unchanged,
}

/// What a measure/resolve pass did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassOutcome {
    /// Nothing differed from the held list.
    FixedPoint,
    /// Heights or positions changed and the held list was updated.
    Updated,
}

/// Summary of a bounded settle loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settlement {
    /// True if a pass produced no change before the bound was hit.
    pub converged: bool,
    /// Passes that were run, including the final unchanged one.
    pub passes: u32,
    /// Identifiers still without a resolved position.
    pub pending: Vec<String>,
}

/// Sidenote placement engine: scan, measure, resolve, and emit overlays.
#[derive(Debug, Clone)]
pub struct SidenoteEngine {
    /// Markup conventions and layout constants.
    config: Config,
    /// The single entry list, ordered by initial top.
    entries: Vec<SidenoteEntry>,
    /// Bumped every time the list is superseded.
    generation: u64,
}

impl SidenoteEngine {
    /// Drop the held list, e.g. when the page goes away.
    pub fn clear(&mut self) {
        if !self.entries.is_empty() {
            self.entries.clear();
            self.generation = self.generation.saturating_add(1);
        }
    }

    /// Settings the engine was built with.
    pub const fn config(&self) -> &Config {
        return &self.config;
    }

    /// Current entries, ordered by initial top.
    #[cfg(test)]
    pub fn entries(&self) -> &[SidenoteEntry] {
        return &self.entries;
    }

    /// Number of times the list has been superseded.
    pub const fn generation(&self) -> u64 {
        return self.generation;
    }

    /// Engine with an empty list.
    pub fn new(config: Config) -> Self {
        return Self {
            config,
            entries: Vec::new(),
            generation: 0,
        };
    }

    /// Overlay descriptors in list order. An overlay sits at its initial top
    /// and stays invisible until its position is resolved.
    pub fn overlays(&self) -> Vec<Overlay> {
        return self
            .entries
            .iter()
            .enumerate()
            .map(|(index, entry)| {
                let html = if self.config.number_labels {
                    label_content(&entry.content, &footnote_number(&entry.identifier, index))
                } else {
                    entry.content.clone()
                };
                return Overlay {
                    html,
                    identifier: entry.identifier.clone(),
                    top: entry.resolved_top.unwrap_or(entry.initial_top),
                    visible: entry.resolved_top.is_some(),
                };
            })
            .collect();
    }

    /// Identifiers not yet positioned.
    pub fn pending(&self) -> Vec<String> {
        return self
            .entries
            .iter()
            .filter(|e| return e.resolved_top.is_none())
            .map(|e| return e.identifier.clone())
            .collect();
    }

    /// Lifecycle phase derived from the held list.
    pub fn phase(&self) -> Phase {
        if self.entries.is_empty() {
            return Phase::Empty;
        }
        if self.entries.iter().all(|e| return e.resolved_top.is_some()) {
            return Phase::Resolved;
        }
        if self.entries.iter().any(|e| return e.measured_height.is_some()) {
            return Phase::Measured;
        }
        return Phase::Built;
    }

    /// Scan the page and replace the held list if the result differs.
    pub fn rescan<D: DocumentQuery>(&mut self, doc: &D) -> ScanOutcome {
        let scanned = scanner::scan(doc, &self.config);

        if scanned.is_empty() {
            if self.entries.is_empty() {
                return ScanOutcome::Unchanged;
            }
            log::info!("footnotes gone, clearing {} sidenotes", self.entries.len());
            self.clear();
            return ScanOutcome::Cleared;
        }

        if same_scan(&self.entries, &scanned) {
            log::debug!("rescan found the same {} sidenotes", scanned.len());
            return ScanOutcome::Unchanged;
        }

        self.entries = scanned;
        self.generation = self.generation.saturating_add(1);
        log::info!("rescan produced {} sidenotes (generation {})", self.entries.len(), self.generation);
        return ScanOutcome::Replaced;
    }

    /// Run one measure/resolve pass and keep the result only if it changed.
    pub fn resolve_pass<M: OverlayMeasure + ?Sized>(&mut self, measure: &M) -> PassOutcome {
        let pass = resolver::resolve_pass(&self.entries, measure, self.config.spacing);
        if !pass.deferred.is_empty() {
            log::debug!("waiting on overlays: {}", pass.deferred.join(", "));
        }
        if !pass.changed {
            return PassOutcome::FixedPoint;
        }
        self.entries = pass.entries;
        return PassOutcome::Updated;
    }

    /// Repeat passes until one changes nothing or `max_passes` is reached.
    /// Entries that never get a usable height stay pending and invisible.
    pub fn settle<M: OverlayMeasure + ?Sized>(&mut self, measure: &M) -> Settlement {
        let mut passes = 0_u32;
        let mut converged = false;

        while passes < self.config.max_passes {
            passes = passes.saturating_add(1);
            if self.resolve_pass(measure) == PassOutcome::FixedPoint {
                converged = true;
                break;
            }
        }

        let pending = self.pending();
        if !converged {
            log::warn!("sidenote layout did not settle after {passes} passes");
        } else if !pending.is_empty() {
            log::debug!("{} sidenotes still waiting for measurement", pending.len());
        }

        return Settlement {
            converged,
            passes,
            pending,
        };
    }
}

/// Same identifiers in the same order with the same initial tops and bodies.
fn same_scan(held: &[SidenoteEntry], scanned: &[SidenoteEntry]) -> bool {
    return held.len() == scanned.len()
        && held.iter().zip(scanned).all(|(a, b)| {
            return a.identifier == b.identifier
                && a.content == b.content
                && (a.initial_top - b.initial_top).abs() < f64::EPSILON;
        });
}

/// Trailing digits of the identifier, or the 1-based list position.
fn footnote_number(identifier: &str, index: usize) -> String {
    let from_id = TRAILING_NUMBER
        .as_ref()
        .and_then(|re| return re.captures(identifier))
        .and_then(|caps| return caps.get(1))
        .map(|m| return m.as_str().to_string());
    return from_id.unwrap_or_else(|| return index.saturating_add(1).to_string());
}

/// Put a `<sup>N</sup>` label at the start of the note, inside a leading `<p>` if any.
fn label_content(content: &str, number: &str) -> String {
    let label = format!("<sup>{number}</sup> ");
    let trimmed = content.trim_start();
    if (trimmed.starts_with("<p>") || trimmed.starts_with("<p "))
        && let Some(close) = trimmed.find('>')
    {
        let (open, rest) = trimmed.split_at(close.saturating_add(1));
        return format!("{open}{label}{rest}");
    }
    return format!("{label}{content}");
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::collections::HashMap;

    use super::*;
    use crate::document::HtmlDocument;
    use crate::resolver::OverlayMeasure;
    use crate::types::Measurement;

    const PAGE: &str = r##"<article class="prose">
<p>One<sup><a id="user-content-fnref-1" href="#user-content-fn-1">1</a></sup></p>
<p>Two<sup><a id="user-content-fnref-2" href="#user-content-fn-2">2</a></sup></p>
</article>
<section class="footnotes"><ol>
<li id="user-content-fn-1"><p>First. <a href="#user-content-fnref-1" data-footnote-backref>↩</a></p></li>
<li id="user-content-fn-2"><p>Second. <a href="#user-content-fnref-2" data-footnote-backref>↩</a></p></li>
</ol></section>"##;

    fn layout(first: f64, second: f64) -> String {
        return format!(
            r#"{{ "boxes": {{ ".prose": {{ "top": 0.0 }}, "user-content-fnref-1": {{ "top": {first} }}, "user-content-fnref-2": {{ "top": {second} }} }} }}"#
        );
    }

    fn doc(first: f64, second: f64) -> HtmlDocument {
        return HtmlDocument::from_strings(PAGE, &layout(first, second)).unwrap();
    }

    fn heights(a: f64, b: f64) -> HashMap<String, Measurement> {
        let mut map = HashMap::new();
        map.insert("user-content-fn-1".to_string(), Measurement { height: a, in_layout: true });
        map.insert("user-content-fn-2".to_string(), Measurement { height: b, in_layout: true });
        return map;
    }

    /// First overlay grows on every measurement; the second is never rendered.
    struct Reflowing {
        /// Measurements taken so far.
        calls: Cell<u32>,
    }

    impl OverlayMeasure for Reflowing {
        fn measure(&self, index: usize, _entry: &SidenoteEntry) -> Option<Measurement> {
            self.calls.set(self.calls.get() + 1);
            if index > 0 {
                return None;
            }
            return Some(Measurement { height: 40.0 + f64::from(self.calls.get()), in_layout: true });
        }
    }

    #[test]
    fn end_to_end_overlapping_pair() {
        let mut engine = SidenoteEngine::new(Config::default());
        assert_eq!(engine.rescan(&doc(100.0, 140.0)), ScanOutcome::Replaced);
        assert_eq!(engine.phase(), Phase::Built);

        let settlement = engine.settle(&heights(80.0, 60.0));
        assert!(settlement.converged);
        assert!(settlement.pending.is_empty());
        assert_eq!(settlement.passes, 2);
        assert_eq!(engine.phase(), Phase::Resolved);

        let entries = engine.entries();
        assert_eq!(entries[0].resolved_top, Some(91.0));
        assert_eq!(entries[1].resolved_top, Some(f64::max(131.0, 91.0 + 80.0 + 16.0)));
    }

    #[test]
    fn unchanged_rescan_keeps_resolved_list() {
        let mut engine = SidenoteEngine::new(Config::default());
        engine.rescan(&doc(100.0, 140.0));
        engine.settle(&heights(80.0, 60.0));
        let generation = engine.generation();
        let before = engine.entries().to_vec();

        assert_eq!(engine.rescan(&doc(100.0, 140.0)), ScanOutcome::Unchanged);
        assert_eq!(engine.generation(), generation);
        assert_eq!(engine.entries(), before.as_slice());
        assert_eq!(engine.resolve_pass(&heights(80.0, 60.0)), PassOutcome::FixedPoint);
    }

    #[test]
    fn shifted_references_rebuild_from_scratch() {
        let mut engine = SidenoteEngine::new(Config::default());
        engine.rescan(&doc(100.0, 140.0));
        engine.settle(&heights(80.0, 60.0));

        // An image above the second reference finished loading.
        assert_eq!(engine.rescan(&doc(100.0, 400.0)), ScanOutcome::Replaced);
        assert_eq!(engine.phase(), Phase::Built);
        assert!(engine.overlays().iter().all(|o| !o.visible));

        engine.settle(&heights(80.0, 60.0));
        assert_eq!(engine.entries()[1].resolved_top, Some(391.0));
    }

    #[test]
    fn vanished_footnotes_clear_the_list() {
        let mut engine = SidenoteEngine::new(Config::default());
        engine.rescan(&doc(100.0, 140.0));
        let empty = HtmlDocument::from_strings(r#"<article class="prose"><p>No notes</p></article>"#, "{}").unwrap();

        assert_eq!(engine.rescan(&empty), ScanOutcome::Cleared);
        assert_eq!(engine.phase(), Phase::Empty);
        assert_eq!(engine.rescan(&empty), ScanOutcome::Unchanged);
    }

    #[test]
    fn unmeasurable_note_stays_hidden() {
        let mut engine = SidenoteEngine::new(Config::default());
        engine.rescan(&doc(100.0, 140.0));
        let mut partial = heights(80.0, 60.0);
        partial.remove("user-content-fn-2");

        let settlement = engine.settle(&partial);
        assert!(settlement.converged);
        assert_eq!(settlement.pending, ["user-content-fn-2"]);
        assert_eq!(engine.phase(), Phase::Measured);

        let overlays = engine.overlays();
        assert!(overlays[0].visible);
        assert!(!overlays[1].visible);
        assert_eq!(overlays[1].top, 131.0);
    }

    #[test]
    fn edited_footnote_body_replaces_list() {
        let old = HtmlDocument::from_strings(&PAGE.replace("First.", "Old text"), &layout(100.0, 140.0)).unwrap();
        let new = HtmlDocument::from_strings(&PAGE.replace("First.", "New text"), &layout(100.0, 140.0)).unwrap();
        let mut engine = SidenoteEngine::new(Config::default());
        engine.rescan(&old);
        engine.settle(&heights(80.0, 60.0));
        let generation = engine.generation();

        assert_eq!(engine.rescan(&new), ScanOutcome::Replaced);
        assert!(engine.generation() > generation);
        assert_eq!(engine.overlays()[0].html, "<sup>1</sup> New text");
    }

    #[test]
    fn settle_gives_up_at_pass_bound() {
        let config = Config { max_passes: 3, ..Config::default() };
        let mut engine = SidenoteEngine::new(config);
        engine.rescan(&doc(100.0, 140.0));
        let measure = Reflowing { calls: Cell::new(0) };

        let settlement = engine.settle(&measure);
        assert_eq!(settlement.passes, 3);
        assert!(!settlement.converged);
        assert_eq!(settlement.pending, ["user-content-fn-2"]);
        assert_eq!(measure.calls.get(), 6);

        let overlays = engine.overlays();
        assert!(overlays[0].visible);
        assert!(!overlays[1].visible);
        assert_eq!(overlays[1].top, 131.0);
    }

    #[test]
    fn overlays_carry_number_labels() {
        let mut engine = SidenoteEngine::new(Config::default());
        engine.rescan(&doc(100.0, 140.0));
        let overlays = engine.overlays();
        assert_eq!(overlays[0].html, "<sup>1</sup> First.");
        assert_eq!(overlays[1].html, "<sup>2</sup> Second.");
    }

    #[test]
    fn label_goes_inside_leading_paragraph() {
        assert_eq!(label_content("<p class=\"x\">Body</p>", "3"), "<p class=\"x\"><sup>3</sup> Body</p>");
        assert_eq!(label_content("Body", "3"), "<sup>3</sup> Body");
        assert_eq!(label_content("<p>Body</p>", "3"), "<p><sup>3</sup> Body</p>");
        assert_eq!(label_content("<pre>x</pre>", "3"), "<sup>3</sup> <pre>x</pre>");
        assert_eq!(label_content("<picture></picture>", "3"), "<sup>3</sup> <picture></picture>");
    }

    #[test]
    fn number_falls_back_to_position() {
        assert_eq!(footnote_number("user-content-fn-12", 0), "12");
        assert_eq!(footnote_number("user-content-fn-note", 4), "5");
    }
}
