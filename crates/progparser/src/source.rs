//! Pattern source enumeration: batch list files and range selection.

use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};

/// 1-based `start`/`end` bounds as given on the command line. An `end` of
/// 0 means "through the last item".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RangeSpec {
    /// First item wanted.
    pub start: u32,
    /// Last item wanted, or 0.
    pub end: u32,
}

impl RangeSpec {
    /// Creates a range from raw bounds.
    #[must_use]
    pub const fn new(start: u32, end: u32) -> Self {
        Self { start, end }
    }

    /// Clamps the range into `first..=last`.
    ///
    /// `start` is pulled into the valid range; `end` becomes `last` when it
    /// is 0 or too large, and `start` when it falls before `start`. Returns
    /// `None` when `last < first`.
    #[must_use]
    pub fn clamp(self, first: u32, last: u32) -> Option<RangeInclusive<u32>> {
        if last < first {
            return None;
        }
        let start = self.start.clamp(first, last);
        let end = if self.end == 0 || self.end > last {
            last
        } else {
            self.end.max(start)
        };
        Some(start..=end)
    }

    /// Clamps `start` alone into `first..=last`, for single-item selection.
    #[must_use]
    pub fn clamp_single(self, first: u32, last: u32) -> Option<RangeInclusive<u32>> {
        if last < first {
            return None;
        }
        let start = self.start.clamp(first, last);
        Some(start..=start)
    }
}

/// Paths listed in a batch list file, one per line, sliced by `range`.
///
/// Blank lines are dropped before slicing. Entries are taken as written, so
/// relative ones resolve against the working directory.
#[must_use]
pub fn read_list(text: &str, range: RangeSpec) -> Vec<PathBuf> {
    let entries: Vec<&str> = text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect();
    let last = u32::try_from(entries.len()).unwrap_or(u32::MAX);
    let Some(rows) = range.clamp(1, last) else {
        return Vec::new();
    };

    entries
        .into_iter()
        .zip(1u32..)
        .filter(|(_, row)| rows.contains(row))
        .map(|(entry, _)| PathBuf::from(entry))
        .collect()
}

/// Pattern name derived from a source path: its file stem.
#[must_use]
pub fn pattern_name(path: &Path) -> String {
    path.file_stem().map_or_else(
        || path.display().to_string(),
        |stem| stem.to_string_lossy().into_owned(),
    )
}
