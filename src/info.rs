use std::path::Path;

use serde::Serialize;

use crate::config::{CONFIG_FILE, Config};

/// Exit codes shared by every subcommand.
const EXIT_CODES: [(u8, &str); 3] = [
    (0, "Success / every sidenote positioned"),
    (1, "Some sidenotes could not be measured and stay hidden"),
    (3, "Runtime error"),
];

/// Top-level JSON document.
#[derive(Serialize)]
struct InfoJson {
    /// Exit code table.
    exit_codes: Vec<ExitCodeInfo>,
    /// Effective settings.
    settings: SettingsJson,
    /// Crate version.
    version: String,
}

/// One exit code.
#[derive(Serialize)]
struct ExitCodeInfo {
    /// Process exit code.
    code: u8,
    /// What it means.
    meaning: String,
}

/// Effective settings as written in the config file.
#[derive(Serialize)]
struct SettingsJson {
    /// Backlink marker attribute.
    backref_attribute: String,
    /// Estimator characters per line.
    chars_per_line: u32,
    /// Config file the settings were read from, or the default name.
    config_file: String,
    /// Whether a config file was loaded.
    config_found: bool,
    /// Article container class.
    container_class: String,
    /// Footnote content id prefix.
    content_prefix: String,
    /// Debounce window in milliseconds.
    debounce_ms: u64,
    /// Footnotes block class.
    footnotes_class: String,
    /// Estimator line height.
    line_height: f64,
    /// Pass bound.
    max_passes: u32,
    /// Whether overlays carry number labels.
    number_labels: bool,
    /// Reference marker id prefix.
    reference_prefix: String,
    /// Gap between notes.
    spacing: f64,
    /// Offset added to reference tops.
    vertical_offset: f64,
}

/// Print the sidenotes reference document with the effective settings.
/// `source` is the config file the settings were read from, if any.
pub fn run(config: &Config, source: Option<&Path>, json: bool) {
    if json {
        print_json(config, source);
    } else {
        print_markdown(config, source);
    }
}

// ── Markdown output ───────────────────────────────────────────────────

/// Full markdown document.
fn print_markdown(config: &Config, source: Option<&Path>) {
    let version = env!("CARGO_PKG_VERSION");
    print_markdown_header(version);
    print_markdown_settings(config, source);
    println!();
    print_markdown_exit_codes();
}

/// Static part: what the tool reads and how to run it.
fn print_markdown_header(version: &str) {
    print!(
        "\
# sidenotes {version}

Place footnotes in the margin next to the references that cite them, pushing
each note below the previous one so none overlap.

## Inputs

    page.html               rendered article with footnote references and a footnotes block
    page.layout.json        geometry exported from the renderer (boxes, overlay heights, scroll)

Without overlay heights in the snapshot, heights are estimated from text length.

## Commands

    sidenotes place <page>          Resolve positions and print overlays
    sidenotes scan <page>           List footnotes and initial tops only
    sidenotes batch [dir]           Write <page>.sidenotes.json for every page with a snapshot
    sidenotes watch <page>          Re-place whenever the page or snapshot changes
    sidenotes info [--json]         This document

## Logging

    SIDENOTES_LOG=debug sidenotes place page.html

"
    );
}

/// Effective settings.
fn print_markdown_settings(config: &Config, source: Option<&Path>) {
    println!("## Settings");
    println!();
    match source {
        Some(path) => println!("Config:            {} (loaded)", path.display()),
        None => println!("Config:            {CONFIG_FILE} (not found, defaults)"),
    }
    println!("container_class   = \"{}\"", config.container_class);
    println!("footnotes_class   = \"{}\"", config.footnotes_class);
    println!("reference_prefix  = \"{}\"", config.reference_prefix);
    println!("content_prefix    = \"{}\"", config.content_prefix);
    println!("backref_attribute = \"{}\"", config.backref_attribute);
    println!("spacing           = {}", config.spacing);
    println!("vertical_offset   = {}", config.vertical_offset);
    println!("debounce_ms       = {}", config.debounce.as_millis());
    println!("max_passes        = {}", config.max_passes);
    println!("number_labels     = {}", config.number_labels);
    println!("chars_per_line    = {}", config.chars_per_line);
    println!("line_height       = {}", config.line_height);
}

/// Exit code table.
fn print_markdown_exit_codes() {
    println!("## Exit Codes");
    println!();
    println!("| Code | Meaning |");
    println!("|------|---------|");
    for (code, meaning) in EXIT_CODES {
        println!("| {code:<4} | {meaning} |");
    }
}

// ── JSON output ───────────────────────────────────────────────────────

/// Build the JSON document.
fn info_json(config: &Config, source: Option<&Path>) -> InfoJson {
    return InfoJson {
        exit_codes: EXIT_CODES
            .iter()
            .map(|(code, meaning)| return ExitCodeInfo { code: *code, meaning: (*meaning).to_string() })
            .collect(),
        settings: SettingsJson {
            backref_attribute: config.backref_attribute.clone(),
            chars_per_line: config.chars_per_line,
            config_file: source.map_or_else(|| return CONFIG_FILE.to_string(), |p| return p.display().to_string()),
            config_found: source.is_some(),
            container_class: config.container_class.clone(),
            content_prefix: config.content_prefix.clone(),
            debounce_ms: u64::try_from(config.debounce.as_millis()).unwrap_or(u64::MAX),
            footnotes_class: config.footnotes_class.clone(),
            line_height: config.line_height,
            max_passes: config.max_passes,
            number_labels: config.number_labels,
            reference_prefix: config.reference_prefix.clone(),
            spacing: config.spacing,
            vertical_offset: config.vertical_offset,
        },
        version: env!("CARGO_PKG_VERSION").to_string(),
    };
}

/// Print the JSON document.
fn print_json(config: &Config, source: Option<&Path>) {
    // serde_json::to_string_pretty won't fail on this structure.
    let json = serde_json::to_string_pretty(&info_json(config, source)).unwrap_or_default();
    println!("{json}");
}
