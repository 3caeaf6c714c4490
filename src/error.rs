/// Crate-level error types for sidenotes diagnostics.
use std::path::PathBuf;

/// Errors only arise at the I/O edge: reading pages, layout snapshots, and
/// config, or setting up the watcher. Placement itself never fails; every
/// variant names the file or reason so the diagnostic stands on its own.
#[allow(clippy::error_impl_error, reason = "crate-internal error type in binary")]
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A config value is outside its allowed range.
    #[error("invalid config {}: {reason}", path.display())]
    ConfigInvalid {
        /// Config file that carried the bad value.
        path: PathBuf,
        /// Which key was rejected and why.
        reason: String,
    },

    /// An input file does not exist on disk.
    #[error("file not found: {}", path.display())]
    FileNotFound {
        /// Path to the missing file.
        path: PathBuf,
    },

    /// Underlying I/O error from the filesystem.
    #[error("io: {0}")]
    Io(
        /// The wrapped I/O error.
        #[from]
        std::io::Error,
    ),

    /// JSON output could not be produced.
    #[error("json: {0}")]
    Json(
        /// The wrapped serde_json error.
        #[from]
        serde_json::Error,
    ),

    /// Layout snapshot exists but is not a valid snapshot document.
    #[error("layout snapshot invalid: {}: {reason}", path.display())]
    LayoutInvalid {
        /// Snapshot file that failed to parse.
        path: PathBuf,
        /// Description of the parse failure.
        reason: String,
    },

    /// Tree-sitter failed to parse a page.
    #[error("parse failed: {}: {reason}", file.display())]
    ParseFailed {
        /// File that failed to parse.
        file: PathBuf,
        /// Description of the parse failure.
        reason: String,
    },

    /// TOML deserialization failed.
    #[error("toml deserialize: {0}")]
    TomlDe(
        /// The wrapped TOML deserialization error.
        #[from]
        toml::de::Error,
    ),

    /// The filesystem watcher could not be created or attached.
    #[error("watch failed: {reason}")]
    WatchFailed {
        /// Description of the watcher failure.
        reason: String,
    },
}
