//! File watcher: places sidenotes on startup, then re-places on page or snapshot changes.

use std::collections::HashSet;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use notify::{RecursiveMode, Watcher as _};

use crate::commands::{self, OutputFormat, Placement};
use crate::config::Config;
use crate::engine::SidenoteEngine;
use crate::error;
use crate::notifier::{ChangeEvent, Debouncer, Trigger};

/// Result of one debounced refresh, sent back to the printing thread.
type Refresh = Result<Placement, error::Error>;

/// Parent directories of the watched inputs.
fn collect_watch_dirs(inputs: &[&Path]) -> HashSet<PathBuf> {
    let mut dirs = HashSet::new();
    for input in inputs {
        let parent = input.parent().unwrap_or_else(|| return Path::new(""));
        dirs.insert(PathBuf::from(".").join(parent));
    }
    return dirs;
}

/// Classify a filesystem event: snapshot edits move geometry, page edits move content.
fn classify_event(event: &notify::Event, page: &OsString, layout: &OsString) -> Option<ChangeEvent> {
    let touches = |name: &OsString| {
        return event.paths.iter().any(|p| return p.file_name() == Some(name.as_os_str()));
    };
    if touches(layout) {
        return Some(ChangeEvent::ContainerResize);
    }
    if touches(page) {
        return Some(ChangeEvent::ContentMutation);
    }
    return None;
}

/// Create a filesystem watcher that forwards relevant events to the debouncer.
///
/// # Errors
///
/// Returns `Error::WatchFailed` if the watcher cannot be created.
fn create_watcher(
    trigger: Trigger,
    page: OsString,
    layout: OsString,
) -> Result<notify::RecommendedWatcher, error::Error> {
    return notify::recommended_watcher(move |res: Result<notify::Event, notify::Error>| {
        let Ok(event) = res else {
            return;
        };
        match (&event.kind, classify_event(&event, &page, &layout)) {
            // The page is gone; nothing pending should run against it.
            (notify::EventKind::Remove(_), Some(ChangeEvent::ContentMutation)) => trigger.cancel(),
            (notify::EventKind::Create(_) | notify::EventKind::Modify(_), Some(change)) => trigger.notify(change),
            _ => {},
        }
    })
    .map_err(|e| {
        return error::Error::WatchFailed {
            reason: format!("watcher setup failed: {e}"),
        };
    });
}

/// Entry point for the watch command.
///
/// Places once, then watches the page and its snapshot and re-places after
/// each burst of changes settles. Output is printed only when the overlays move.
///
/// # Errors
///
/// Returns errors from the initial placement or watcher setup.
pub fn run(page: &Path, layout: &Path, config: Config, format: OutputFormat) -> Result<ExitCode, error::Error> {
    eprintln!("watch: initial placement");
    let mut engine = SidenoteEngine::new(config);
    let initial = commands::place_from_files(&mut engine, page, layout)?;
    commands::print_placement(&initial, format)?;
    let mut last_code = commands::exit_code_for(&initial);

    let (tx, rx) = crossbeam_channel::unbounded::<Refresh>();
    let delay = engine.config().debounce;
    let page_path = page.to_path_buf();
    let layout_path = layout.to_path_buf();
    let debouncer = Debouncer::spawn(delay, move |events| {
        log::debug!("coalesced changes: {events:?}");
        let refresh = commands::place_from_files(&mut engine, &page_path, &layout_path);
        log::debug!("sidenote list at generation {}", engine.generation());
        let _ = tx.send(refresh);
    })?;

    let page_name = page.file_name().map(OsString::from).unwrap_or_default();
    let layout_name = layout.file_name().map(OsString::from).unwrap_or_default();
    let mut watcher = create_watcher(debouncer.trigger(), page_name, layout_name)?;

    let watch_dirs = collect_watch_dirs(&[page, layout]);
    for dir in &watch_dirs {
        if dir.exists() {
            let _ = watcher.watch(dir, RecursiveMode::NonRecursive);
        }
    }

    let dir_count = watch_dirs.len();
    eprintln!("watch: monitoring {dir_count} directories, press Ctrl+C to stop");

    while let Ok(refresh) = rx.recv() {
        match refresh {
            Ok(placement) if placement.changed() => {
                eprintln!("watch: change detected, re-placing...");
                commands::print_placement(&placement, format)?;
                last_code = commands::exit_code_for(&placement);
            },
            Ok(_) => log::debug!("watch: change did not move any sidenote"),
            Err(e) => {
                crate::diagnostics::print_error(&e);
                last_code = ExitCode::from(3_u8);
            },
        }
    }

    drop(debouncer);
    return Ok(last_code);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(path: &str) -> notify::Event {
        return notify::Event::new(notify::EventKind::Any).add_path(PathBuf::from(path));
    }

    #[test]
    fn snapshot_edit_is_a_container_resize() {
        let page = OsString::from("post.html");
        let layout = OsString::from("post.layout.json");
        assert_eq!(
            classify_event(&event("/site/out/post.layout.json"), &page, &layout),
            Some(ChangeEvent::ContainerResize)
        );
        assert_eq!(
            classify_event(&event("/site/out/post.html"), &page, &layout),
            Some(ChangeEvent::ContentMutation)
        );
        assert_eq!(classify_event(&event("/site/out/other.html"), &page, &layout), None);
    }

    #[test]
    fn watch_dirs_are_deduplicated() {
        let dirs = collect_watch_dirs(&[Path::new("out/post.html"), Path::new("out/post.layout.json")]);
        assert_eq!(dirs.len(), 1);
        assert!(dirs.contains(&PathBuf::from("./out")));

        let bare = collect_watch_dirs(&[Path::new("post.html")]);
        assert!(bare.contains(&PathBuf::from(".")));
    }
}
