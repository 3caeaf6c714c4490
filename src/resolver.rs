use std::collections::HashMap;

use crate::config::Config;
use crate::markup::text_content;
use crate::types::{Measurement, SidenoteEntry};

/// Positions closer than this are treated as equal when deciding whether a
/// pass changed anything.
const POSITION_EPSILON: f64 = 1e-6;

/// Source of overlay heights, supplied by whatever renders the overlays.
pub trait OverlayMeasure {
    /// Measure the overlay rendered for `entry` at list position `index`.
    /// `None` means no overlay element exists for it (yet).
    fn measure(&self, index: usize, entry: &SidenoteEntry) -> Option<Measurement>;
}

/// Heights reported by the rendering layer, keyed by content identifier.
impl OverlayMeasure for HashMap<String, Measurement> {
    fn measure(&self, _index: usize, entry: &SidenoteEntry) -> Option<Measurement> {
        return self.get(&entry.identifier).copied();
    }
}

/// Height estimate from content length, for when no rendered measurements exist.
#[derive(Debug, Clone, Copy)]
pub struct EstimatedHeights {
    /// Characters that fit on one overlay line.
    pub chars_per_line: u32,
    /// Height of one line.
    pub line_height: f64,
}

impl EstimatedHeights {
    /// Estimator using the configured line metrics.
    pub const fn from_config(config: &Config) -> Self {
        return Self {
            chars_per_line: config.chars_per_line,
            line_height: config.line_height,
        };
    }
}

impl OverlayMeasure for EstimatedHeights {
    fn measure(&self, _index: usize, entry: &SidenoteEntry) -> Option<Measurement> {
        // Each word plus its trailing space.
        let chars: usize = text_content(&entry.content)
            .split(' ')
            .map(|word| return word.chars().count().saturating_add(1))
            .sum();
        let per_line = usize::try_from(self.chars_per_line.max(1)).unwrap_or(1);
        let lines = chars.div_ceil(per_line).max(1);
        let lines = u32::try_from(lines).unwrap_or(u32::MAX);
        return Some(Measurement {
            height: f64::from(lines) * self.line_height,
            in_layout: true,
        });
    }
}

/// Result of one measure/resolve pass.
#[derive(Debug, Clone, PartialEq)]
pub struct Pass {
    /// Whether any height or position differs from the input list.
    pub changed: bool,
    /// Identifiers whose overlay was missing or not laid out yet.
    pub deferred: Vec<String>,
    /// Same entries, same order, with heights and positions filled in where possible.
    pub entries: Vec<SidenoteEntry>,
}

/// Measure every overlay and push later notes below earlier ones.
///
/// An entry whose overlay is missing, or reports zero height while taking
/// part in layout, is held back: its height and position stay unset. Later
/// entries are still measured, but none is positioned until every entry
/// before it has been, so resolved entries always form a prefix and each
/// adjacent pair keeps at least `spacing` between them.
pub fn resolve_pass<M: OverlayMeasure + ?Sized>(
    entries: &[SidenoteEntry],
    measure: &M,
    spacing: f64,
) -> Pass {
    let mut resolved: Vec<SidenoteEntry> = Vec::with_capacity(entries.len());
    let mut deferred = Vec::new();
    let mut blocked = false;

    for (index, entry) in entries.iter().enumerate() {
        let mut next = entry.clone();
        let measurement = measure.measure(index, entry);

        match measurement {
            Some(m) if m.height > 0.0 || !m.in_layout => {
                next.measured_height = Some(m.height.max(0.0));
            },
            Some(_) => {
                log::trace!("sidenote `{}` has zero height", entry.identifier);
                next.measured_height = None;
            },
            None => {
                log::trace!("sidenote `{}` has no overlay element", entry.identifier);
                next.measured_height = None;
            },
        }

        if next.measured_height.is_none() {
            deferred.push(entry.identifier.clone());
            blocked = true;
        }

        next.resolved_top = if blocked {
            None
        } else {
            let floor = resolved.last().and_then(|prev| return prev.bottom_with_spacing(spacing));
            Some(floor.map_or(entry.initial_top, |bottom| return entry.initial_top.max(bottom)))
        };

        resolved.push(next);
    }

    let changed = entries
        .iter()
        .zip(&resolved)
        .any(|(before, after)| return layout_differs(before, after));

    return Pass {
        changed,
        deferred,
        entries: resolved,
    };
}

/// Whether two versions of an entry differ in height or resolved position.
pub fn layout_differs(before: &SidenoteEntry, after: &SidenoteEntry) -> bool {
    return !same_value(before.measured_height, after.measured_height)
        || !same_value(before.resolved_top, after.resolved_top);
}

/// Option-aware float comparison with a small tolerance.
fn same_value(a: Option<f64>, b: Option<f64>) -> bool {
    return match (a, b) {
        (None, None) => true,
        (Some(x), Some(y)) => (x - y).abs() < POSITION_EPSILON,
        _ => false,
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(id: &str, top: f64) -> SidenoteEntry {
        return SidenoteEntry::unmeasured(id.to_string(), format!("note {id}"), top);
    }

    fn heights(pairs: &[(&str, f64)]) -> HashMap<String, Measurement> {
        return pairs
            .iter()
            .map(|(id, h)| (id.to_string(), Measurement { height: *h, in_layout: true }))
            .collect();
    }

    #[test]
    fn pushes_overlapping_note_down() {
        // References at 100 and 140 with the default -9 offset.
        let entries = vec![entry("a", 91.0), entry("b", 131.0)];
        let pass = resolve_pass(&entries, &heights(&[("a", 80.0), ("b", 60.0)]), 16.0);

        assert!(pass.changed);
        assert!(pass.deferred.is_empty());
        assert_eq!(pass.entries[0].resolved_top, Some(91.0));
        assert_eq!(pass.entries[1].resolved_top, Some(f64::max(131.0, 91.0 + 80.0 + 16.0)));
        assert_eq!(pass.entries[1].measured_height, Some(60.0));
    }

    #[test]
    fn distant_note_keeps_initial_top() {
        let entries = vec![entry("a", 0.0), entry("b", 500.0)];
        let pass = resolve_pass(&entries, &heights(&[("a", 40.0), ("b", 40.0)]), 16.0);
        assert_eq!(pass.entries[1].resolved_top, Some(500.0));
    }

    #[test]
    fn resolved_entries_never_overlap() {
        let entries: Vec<SidenoteEntry> = (0..20).map(|i| entry(&format!("n{i}"), f64::from(i) * 7.0)).collect();
        let measured: HashMap<String, Measurement> = (0..20)
            .map(|i| (format!("n{i}"), Measurement { height: 10.0 + f64::from(i % 5) * 13.0, in_layout: true }))
            .collect();
        let pass = resolve_pass(&entries, &measured, 16.0);

        for pair in pass.entries.windows(2) {
            let bottom = pair[0].bottom_with_spacing(16.0).unwrap();
            assert!(pair[1].resolved_top.unwrap() >= bottom - POSITION_EPSILON);
        }
    }

    #[test]
    fn missing_overlay_blocks_later_positions_but_not_measurement() {
        let entries = vec![entry("a", 0.0), entry("b", 100.0), entry("c", 200.0)];
        let pass = resolve_pass(&entries, &heights(&[("a", 20.0), ("c", 30.0)]), 16.0);

        assert_eq!(pass.deferred, ["b"]);
        assert_eq!(pass.entries[0].resolved_top, Some(0.0));
        assert_eq!(pass.entries[1].measured_height, None);
        assert_eq!(pass.entries[1].resolved_top, None);
        assert_eq!(pass.entries[2].measured_height, Some(30.0));
        assert_eq!(pass.entries[2].resolved_top, None);
    }

    #[test]
    fn zero_height_in_layout_is_deferred() {
        let entries = vec![entry("a", 0.0)];
        let pass = resolve_pass(&entries, &heights(&[("a", 0.0)]), 16.0);
        assert_eq!(pass.deferred, ["a"]);
        assert!(!pass.changed);
    }

    #[test]
    fn zero_height_outside_layout_is_accepted() {
        let entries = vec![entry("a", 10.0)];
        let mut measured = HashMap::new();
        measured.insert("a".to_string(), Measurement { height: 0.0, in_layout: false });
        let pass = resolve_pass(&entries, &measured, 16.0);
        assert_eq!(pass.entries[0].measured_height, Some(0.0));
        assert_eq!(pass.entries[0].resolved_top, Some(10.0));
    }

    #[test]
    fn second_pass_over_same_heights_is_a_fixed_point() {
        let entries = vec![entry("a", 0.0), entry("b", 10.0)];
        let measured = heights(&[("a", 50.0), ("b", 50.0)]);
        let first = resolve_pass(&entries, &measured, 16.0);
        let second = resolve_pass(&first.entries, &measured, 16.0);
        assert!(first.changed);
        assert!(!second.changed);
        assert_eq!(first.entries, second.entries);
    }

    #[test]
    fn estimator_grows_with_content() {
        let estimator = EstimatedHeights { chars_per_line: 50, line_height: 24.0 };
        let short = SidenoteEntry::unmeasured("s".to_string(), "<em>Short</em> note".to_string(), 0.0);
        let long = SidenoteEntry::unmeasured("l".to_string(), "word ".repeat(40), 0.0);

        assert_eq!(estimator.measure(0, &short).map(|m| m.height), Some(24.0));
        // 40 five-char words -> 200 chars -> 4 lines.
        assert_eq!(estimator.measure(0, &long).map(|m| m.height), Some(96.0));
    }
}
