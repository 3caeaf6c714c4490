use crate::config::CONFIG_FILE;
use crate::error::Error;

/// Bold on.
const BOLD: &str = "\x1b[1m";
/// Attributes off.
const RESET: &str = "\x1b[0m";

/// Render an error as markdown with bold headings and print to stderr.
pub fn print_error(e: &Error) {
    let md = render_error(e);
    for line in md.lines() {
        if line.starts_with('#') {
            eprintln!("{BOLD}{line}{RESET}");
        } else {
            eprintln!("{line}");
        }
    }
}

/// Render an error as a structured markdown diagnostic: what happened and,
/// where there is one, how to fix it.
pub fn render_error(e: &Error) -> String {
    return match e {
        Error::ConfigInvalid { path, reason } => render_config_invalid(path, reason),
        Error::FileNotFound { path } => render_file_not_found(path),
        Error::LayoutInvalid { path, reason } => render_layout_invalid(path, reason),
        Error::ParseFailed { file, reason } => format!(
            "\
# Error: Parse Failed

Could not parse `{}`: {reason}
",
            file.display()
        ),
        Error::WatchFailed { reason } => format!(
            "\
# Error: Watch Failed

{reason}
"
        ),
        Error::Io(e) => format!(
            "\
# Error: I/O

{e}
"
        ),
        Error::Json(e) => format!(
            "\
# Error: JSON Output

{e}
"
        ),
        Error::TomlDe(e) => format!(
            "\
# Error: Invalid TOML

{e}

## Fix

Check `{CONFIG_FILE}` against the keys listed by:

    sidenotes info
"
        ),
    };
}

/// Bad value in a config file.
fn render_config_invalid(path: &std::path::Path, reason: &str) -> String {
    return format!(
        "\
# Error: Invalid Config

`{}`: {reason}

## Fix

Correct the value or remove the key to use the default. Current values:

    sidenotes info
",
        path.display()
    );
}

/// Missing input. Snapshots get a hint, since they are usually produced separately.
fn render_file_not_found(path: &std::path::Path) -> String {
    let mut out = format!(
        "\
# Error: File Not Found

`{}` does not exist.
",
        path.display()
    );
    if path.to_string_lossy().ends_with(".layout.json") {
        out.push_str(
            "
## Fix

Export a layout snapshot for the page next to it, or pass one explicitly:

    sidenotes place page.html --layout path/to/snapshot.json
",
        );
    }
    return out;
}

/// Snapshot present but malformed.
fn render_layout_invalid(path: &std::path::Path, reason: &str) -> String {
    return format!(
        "\
# Error: Layout Snapshot Invalid

`{}`: {reason}

## Expected shape

    {{
      \"scroll_y\": 0,
      \"boxes\": {{ \".prose\": {{ \"top\": 120 }}, \"user-content-fnref-1\": {{ \"top\": 340 }} }},
      \"overlays\": {{ \"user-content-fn-1\": {{ \"height\": 48 }} }}
    }}
",
        path.display()
    );
}
