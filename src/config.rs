use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::Error;

/// Name of the config file looked up in the working directory.
pub const CONFIG_FILE: &str = ".sidenotes.toml";

/// Placement settings loaded from `.sidenotes.toml`.
/// Markup conventions name how the renderer marks up footnotes; the numeric
/// fields drive layout and event coalescing.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Attribute that marks the "back to reference" link inside a footnote.
    pub backref_attribute: String,
    /// Estimator: characters that fit on one overlay line.
    pub chars_per_line: u32,
    /// Class of the article container element.
    pub container_class: String,
    /// Id prefix of footnote content list items.
    pub content_prefix: String,
    /// Quiet period before a burst of change events triggers one rescan.
    pub debounce: Duration,
    /// Class of the footnote content block.
    pub footnotes_class: String,
    /// Estimator: rendered height of one overlay line.
    pub line_height: f64,
    /// Upper bound on measure/resolve passes per settle.
    pub max_passes: u32,
    /// Prefix each overlay with a `<sup>N</sup>` label.
    pub number_labels: bool,
    /// Id prefix of inline reference markers.
    pub reference_prefix: String,
    /// Minimum gap between consecutive notes.
    pub spacing: f64,
    /// Added to every reference offset to get an entry's initial top.
    pub vertical_offset: f64,
}

/// Raw TOML structure for `.sidenotes.toml`. Every key is optional.
#[derive(serde::Deserialize)]
#[serde(deny_unknown_fields)]
struct SidenotesTomlConfig {
    /// Backlink marker attribute.
    backref_attribute: Option<String>,
    /// Estimator characters per line.
    chars_per_line: Option<u32>,
    /// Article container class.
    container_class: Option<String>,
    /// Footnote content id prefix.
    content_prefix: Option<String>,
    /// Debounce window in milliseconds.
    debounce_ms: Option<u64>,
    /// Footnotes block class.
    footnotes_class: Option<String>,
    /// Estimator line height.
    line_height: Option<f64>,
    /// Pass bound per settle.
    max_passes: Option<u32>,
    /// Whether overlays carry number labels.
    number_labels: Option<bool>,
    /// Reference marker id prefix.
    reference_prefix: Option<String>,
    /// Gap between notes.
    spacing: Option<f64>,
    /// Offset added to reference tops.
    vertical_offset: Option<f64>,
}

impl Default for Config {
    fn default() -> Self {
        return Self {
            backref_attribute: "data-footnote-backref".to_string(),
            chars_per_line: 50,
            container_class: "prose".to_string(),
            content_prefix: "user-content-fn-".to_string(),
            debounce: Duration::from_millis(300),
            footnotes_class: "footnotes".to_string(),
            line_height: 24.0,
            max_passes: 8,
            number_labels: true,
            reference_prefix: "user-content-fnref-".to_string(),
            spacing: 16.0,
            vertical_offset: -9.0,
        };
    }
}

impl Config {
    /// Content identifier for a reference marker id, by swapping the prefix.
    /// Returns `None` when the id does not carry the reference prefix.
    pub fn content_id_for(&self, reference_id: &str) -> Option<String> {
        let suffix = reference_id.strip_prefix(self.reference_prefix.as_str())?;
        return Some(format!("{}{suffix}", self.content_prefix));
    }

    /// Load config from `.sidenotes.toml` in the given root directory.
    /// Returns defaults if the file doesn't exist. A file that exists but is
    /// malformed or out of range is an error, not replaced by defaults.
    ///
    /// # Errors
    ///
    /// Returns `Error::Io` if reading fails (other than not-found),
    /// `Error::TomlDe` if the TOML is malformed,
    /// or `Error::ConfigInvalid` if a value is out of range.
    pub fn load(root: &Path) -> Result<Self, Error> {
        let path = root.join(CONFIG_FILE);
        let content = match std::fs::read_to_string(&path) {
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => return Err(Error::Io(e)),
            Ok(c) => c,
        };
        return Self::parse(&path, &content);
    }

    /// Load config from an explicit path. Unlike `load`, a missing file is an error.
    ///
    /// # Errors
    ///
    /// Returns `Error::FileNotFound` if the file is missing, otherwise the same
    /// errors as `Config::parse`.
    pub fn load_from(path: &Path) -> Result<Self, Error> {
        let content = match std::fs::read_to_string(path) {
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(Error::FileNotFound { path: path.to_path_buf() });
            },
            Err(e) => return Err(Error::Io(e)),
            Ok(c) => c,
        };
        return Self::parse(path, &content);
    }

    /// Parse TOML content, overlay it on the defaults, and validate.
    ///
    /// # Errors
    ///
    /// Returns `Error::TomlDe` if the TOML is malformed,
    /// or `Error::ConfigInvalid` if a value is out of range.
    pub fn parse(path: &Path, content: &str) -> Result<Self, Error> {
        let raw: SidenotesTomlConfig = toml::from_str(content)?;
        let defaults = Self::default();
        let config = Self {
            backref_attribute: raw.backref_attribute.unwrap_or(defaults.backref_attribute),
            chars_per_line: raw.chars_per_line.unwrap_or(defaults.chars_per_line),
            container_class: raw.container_class.unwrap_or(defaults.container_class),
            content_prefix: raw.content_prefix.unwrap_or(defaults.content_prefix),
            debounce: raw.debounce_ms.map_or(defaults.debounce, Duration::from_millis),
            footnotes_class: raw.footnotes_class.unwrap_or(defaults.footnotes_class),
            line_height: raw.line_height.unwrap_or(defaults.line_height),
            max_passes: raw.max_passes.unwrap_or(defaults.max_passes),
            number_labels: raw.number_labels.unwrap_or(defaults.number_labels),
            reference_prefix: raw.reference_prefix.unwrap_or(defaults.reference_prefix),
            spacing: raw.spacing.unwrap_or(defaults.spacing),
            vertical_offset: raw.vertical_offset.unwrap_or(defaults.vertical_offset),
        };
        config.validate(path)?;
        return Ok(config);
    }

    /// Reject values the engine cannot work with.
    ///
    /// # Errors
    ///
    /// Returns `Error::ConfigInvalid` naming the first offending key.
    fn validate(&self, path: &Path) -> Result<(), Error> {
        let invalid = |reason: &str| {
            return Err(Error::ConfigInvalid {
                path: PathBuf::from(path),
                reason: reason.to_string(),
            });
        };

        if !self.spacing.is_finite() || self.spacing < 0.0 {
            return invalid("`spacing` must be a non-negative number");
        }
        if !self.vertical_offset.is_finite() {
            return invalid("`vertical_offset` must be a finite number");
        }
        if self.debounce.is_zero() {
            return invalid("`debounce_ms` must be greater than zero");
        }
        if self.max_passes == 0 {
            return invalid("`max_passes` must be at least 1");
        }
        if self.chars_per_line == 0 {
            return invalid("`chars_per_line` must be at least 1");
        }
        if !self.line_height.is_finite() || self.line_height <= 0.0 {
            return invalid("`line_height` must be a positive number");
        }
        if self.reference_prefix.is_empty() || self.content_prefix.is_empty() {
            return invalid("`reference_prefix` and `content_prefix` must not be empty");
        }
        if self.reference_prefix == self.content_prefix {
            return invalid("`reference_prefix` and `content_prefix` must differ");
        }
        return Ok(());
    }
}
