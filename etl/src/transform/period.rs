//! Reporting period inference from archive storage paths.
//!
//! Archives are stored as `.../<YYYY>/<q><marker>/<file>.zip`, where the
//! marker is `Q` or the regulator's own `T` (trimestre): `2025/1T/1T2025.zip`.

use once_cell::sync::Lazy;
use regex::Regex;
use std::path::{Component, Path};

use crate::error::{ArchiveError, ArchiveResult};
use crate::models::QuarterPeriod;

static YEAR_SEGMENT: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{4}$").unwrap());
static QUARTER_SEGMENT: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(?i)([1-4])\s*[QT]$").unwrap());

/// Infer (year, quarter) from the directory segments of `path`.
///
/// The last year segment that is immediately followed by a quarter segment
/// wins, so nested layouts resolve to the period closest to the file.
pub fn infer_period(path: &Path) -> ArchiveResult<QuarterPeriod> {
    let segments: Vec<String> = path
        .components()
        .filter_map(|c| match c {
            Component::Normal(s) => Some(s.to_string_lossy().trim().to_string()),
            _ => None,
        })
        .collect();

    segments
        .windows(2)
        .rev()
        .find_map(|pair| {
            if !YEAR_SEGMENT.is_match(&pair[0]) {
                return None;
            }
            let quarter = QUARTER_SEGMENT.captures(&pair[1])?.get(1)?.as_str().parse().ok()?;
            let year = pair[0].parse().ok()?;
            QuarterPeriod::new(year, quarter)
        })
        .ok_or_else(|| ArchiveError::PathInference {
            path: path.to_path_buf(),
        })
}
