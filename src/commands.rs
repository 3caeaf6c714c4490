//! Core CLI commands for sidenotes: place, scan, batch.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use serde::Serialize;
use walkdir::WalkDir;

use crate::config::Config;
use crate::document::{self, DocumentQuery, HtmlDocument};
use crate::engine::{ScanOutcome, Settlement, SidenoteEngine};
use crate::error;
use crate::resolver::EstimatedHeights;
use crate::scanner;
use crate::types::{Overlay, Phase, SidenoteEntry};

/// Suffix of the per-page output written by `batch`.
const BATCH_OUTPUT_SUFFIX: &str = "sidenotes.json";

/// How results are printed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Pretty-printed JSON.
    Json,
    /// One line per sidenote.
    Text,
}

/// Outcome of placing the sidenotes of one page.
#[derive(Debug, Clone, Serialize)]
pub struct Placement {
    /// Whether the settle loop stopped on an unchanged pass.
    pub converged: bool,
    /// Overlays in list order.
    pub overlays: Vec<Overlay>,
    /// Passes run while settling.
    pub passes: u32,
    /// Identifiers left without a position.
    pub pending: Vec<String>,
    /// Lifecycle phase of the list after settling.
    pub phase: Phase,
    /// Whether the rescan replaced or cleared the held list.
    #[serde(skip)]
    pub rescanned: bool,
}

impl Placement {
    /// Whether anything visible moved compared with the previously held list.
    pub const fn changed(&self) -> bool {
        return self.rescanned || self.passes > 1 || !self.converged;
    }

    /// Build from the engine's state after a rescan and settle.
    fn from_engine(engine: &SidenoteEngine, scan: ScanOutcome, settlement: Settlement) -> Self {
        return Self {
            converged: settlement.converged,
            overlays: engine.overlays(),
            passes: settlement.passes,
            pending: settlement.pending,
            phase: engine.phase(),
            rescanned: scan != ScanOutcome::Unchanged,
        };
    }
}

/// Place every page under `dir` that has a snapshot next to it, writing
/// `<page>.sidenotes.json` beside each.
///
/// # Errors
///
/// Returns the first error from reading, parsing, or writing a page's files.
pub fn batch(dir: &Path, config: &Config) -> Result<ExitCode, error::Error> {
    let mut written = 0_usize;
    let mut skipped = 0_usize;
    let mut pending_pages = 0_usize;

    for entry in WalkDir::new(dir)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| return e.path().extension().is_some_and(|ext| return ext == "html"))
    {
        let page = entry.path();
        let layout = document::default_layout_path(page);
        if !layout.exists() {
            log::debug!("no snapshot for {}, skipped", page.display());
            skipped = skipped.saturating_add(1);
            continue;
        }

        let mut engine = SidenoteEngine::new(config.clone());
        let placement = place_from_files(&mut engine, page, &layout)?;
        if !placement.pending.is_empty() {
            pending_pages = pending_pages.saturating_add(1);
        }

        let output = page.with_extension(BATCH_OUTPUT_SUFFIX);
        std::fs::write(&output, serde_json::to_string_pretty(&placement)?)?;
        written = written.saturating_add(1);
    }

    eprintln!("Wrote sidenotes for {written} pages ({skipped} without snapshot)");
    if pending_pages > 0 {
        eprintln!("{pending_pages} pages have sidenotes that could not be measured");
        return Ok(ExitCode::from(1));
    }
    return Ok(ExitCode::SUCCESS);
}

/// Exit code for a placement: 0 when every note is positioned, 1 when some are pending.
pub fn exit_code_for(placement: &Placement) -> ExitCode {
    if placement.pending.is_empty() {
        return ExitCode::SUCCESS;
    }
    return ExitCode::from(1);
}

/// Explicit snapshot path, or the default one next to the page.
fn layout_path_for(page: &Path, layout: Option<&Path>) -> PathBuf {
    return layout.map_or_else(|| return document::default_layout_path(page), Path::to_path_buf);
}

/// Scan, measure, and resolve one page, printing the overlays.
///
/// # Errors
///
/// Returns errors from reading or parsing the page or its snapshot.
pub fn place(page: &Path, layout: Option<&Path>, config: Config, format: OutputFormat) -> Result<ExitCode, error::Error> {
    let layout = layout_path_for(page, layout);
    let mut engine = SidenoteEngine::new(config);
    let placement = place_from_files(&mut engine, page, &layout)?;

    print_placement(&placement, format)?;
    if !placement.pending.is_empty() {
        let count = placement.pending.len();
        eprintln!("{count} sidenotes could not be measured and stay hidden");
    }
    return Ok(exit_code_for(&placement));
}

/// Rescan a document and settle its layout, measuring with the snapshot's
/// overlay heights or, when it has none, with the content-length estimate.
pub fn place_document(engine: &mut SidenoteEngine, doc: &HtmlDocument) -> Placement {
    let scan = engine.rescan(doc);
    let layout = doc.layout();
    let settlement = if layout.overlays.is_empty() {
        log::info!("no overlay measurements in snapshot, estimating heights");
        let estimator = EstimatedHeights::from_config(engine.config());
        engine.settle(&estimator)
    } else {
        engine.settle(&layout.overlays)
    };
    return Placement::from_engine(engine, scan, settlement);
}

/// Read a page and snapshot from disk and place them with the given engine.
///
/// # Errors
///
/// Returns file, parse, or snapshot errors.
pub fn place_from_files(engine: &mut SidenoteEngine, page: &Path, layout: &Path) -> Result<Placement, error::Error> {
    let doc = HtmlDocument::open(page, layout)?;
    return Ok(place_document(engine, &doc));
}

/// Print the result of a placement.
///
/// # Errors
///
/// Returns `Error::Json` if JSON output cannot be produced.
pub fn print_placement(placement: &Placement, format: OutputFormat) -> Result<(), error::Error> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(placement)?),
        OutputFormat::Text => print!("{}", render_overlays_text(&placement.overlays)),
    }
    return Ok(());
}

/// One line per scanned entry.
fn render_entries_text(entries: &[SidenoteEntry]) -> String {
    if entries.is_empty() {
        return "No footnotes\n".to_string();
    }
    let mut out = String::new();
    for entry in entries {
        let text = crate::markup::text_content(&entry.content);
        let _ = writeln!(out, "{:>8.1}  {}  {text}", entry.initial_top, entry.identifier);
    }
    return out;
}

/// One line per overlay: position, visibility, identifier, and text.
fn render_overlays_text(overlays: &[Overlay]) -> String {
    if overlays.is_empty() {
        return "No sidenotes\n".to_string();
    }
    let mut out = String::new();
    for overlay in overlays {
        let state = if overlay.visible { "PLACED " } else { "PENDING" };
        let text = crate::markup::text_content(&overlay.html);
        let _ = writeln!(out, "{state}  {:>8.1}  {}  {text}", overlay.top, overlay.identifier);
    }
    return out;
}

/// List the scanned entries of a page without measuring or resolving them.
///
/// # Errors
///
/// Returns errors from reading or parsing the page or its snapshot.
pub fn scan(page: &Path, layout: Option<&Path>, config: &Config, format: OutputFormat) -> Result<(), error::Error> {
    let layout = layout_path_for(page, layout);
    let doc = HtmlDocument::open(page, &layout)?;
    if doc.find_by_class(&config.container_class).is_none() {
        eprintln!("warning: no `.{}` container in {}", config.container_class, page.display());
    }
    let entries = scanner::scan(&doc, config);

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&entries)?),
        OutputFormat::Text => print!("{}", render_entries_text(&entries)),
    }
    return Ok(());
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r##"<article class="prose"><p>A<a id="user-content-fnref-1">1</a> B<a id="user-content-fnref-2">2</a></p></article>
<section class="footnotes"><ol>
<li id="user-content-fn-1"><p>Short. <a href="#user-content-fnref-1" data-footnote-backref>↩</a></p></li>
<li id="user-content-fn-2"><p>Also short. <a href="#user-content-fnref-2" data-footnote-backref>↩</a></p></li>
</ol></section>"##;

    #[test]
    fn measured_snapshot_is_preferred() {
        let layout = r#"{ "boxes": { ".prose": { "top": 0 }, "user-content-fnref-1": { "top": 100 }, "user-content-fnref-2": { "top": 140 } },
                          "overlays": { "user-content-fn-1": { "height": 80 }, "user-content-fn-2": { "height": 60 } } }"#;
        let doc = HtmlDocument::from_strings(PAGE, layout).unwrap();
        let mut engine = SidenoteEngine::new(Config::default());

        let placement = place_document(&mut engine, &doc);
        assert!(placement.converged);
        assert!(placement.changed());
        assert_eq!(placement.overlays[1].top, 187.0);
        assert!(placement.overlays.iter().all(|o| o.visible));
        assert_eq!(placement.phase, Phase::Resolved);

        let again = place_document(&mut engine, &doc);
        assert!(!again.changed());
    }

    #[test]
    fn estimator_used_without_measurements() {
        let layout = r#"{ "boxes": { ".prose": { "top": 0 }, "user-content-fnref-1": { "top": 100 }, "user-content-fnref-2": { "top": 110 } } }"#;
        let doc = HtmlDocument::from_strings(PAGE, layout).unwrap();
        let mut engine = SidenoteEngine::new(Config::default());

        let placement = place_document(&mut engine, &doc);
        // One estimated line (24) plus spacing below the first note.
        assert_eq!(placement.overlays[1].top, 91.0 + 24.0 + 16.0);
        assert!(placement.pending.is_empty());
    }

    #[test]
    fn text_rendering_marks_pending_notes() {
        let overlays = vec![
            Overlay { html: "<sup>1</sup> One".to_string(), identifier: "fn-1".to_string(), top: 12.0, visible: true },
            Overlay { html: "Two".to_string(), identifier: "fn-2".to_string(), top: 40.0, visible: false },
        ];
        let text = render_overlays_text(&overlays);
        assert!(text.contains("PLACED       12.0  fn-1  1 One"));
        assert!(text.contains("PENDING      40.0  fn-2  Two"));
        assert_eq!(render_overlays_text(&[]), "No sidenotes\n");
    }

    #[test]
    fn batch_writes_output_next_to_pages() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("post.html"), PAGE).unwrap();
        std::fs::write(
            dir.path().join("post.layout.json"),
            r#"{ "boxes": { ".prose": { "top": 0 }, "user-content-fnref-1": { "top": 100 }, "user-content-fnref-2": { "top": 300 } } }"#,
        )
        .unwrap();
        std::fs::write(dir.path().join("about.html"), "<p>No snapshot</p>").unwrap();

        batch(dir.path(), &Config::default()).unwrap();

        let written = std::fs::read_to_string(dir.path().join("post.sidenotes.json")).unwrap();
        let json: serde_json::Value = serde_json::from_str(&written).unwrap();
        assert_eq!(json["overlays"].as_array().unwrap().len(), 2);
        assert!(!dir.path().join("about.sidenotes.json").exists());
    }
}
