//! Merging structural and suggested chapter lists.

use crate::domain::Chapter;

/// Secondary chapters starting this close (seconds) to a primary chapter
/// are considered already represented.
pub const DUPLICATE_WINDOW_SECS: f64 = 1.0;

/// Merge `primary` (segment-based) with `secondary` (suggested) chapters.
///
/// - A primary chapter takes the title of a secondary chapter starting in
///   `[start, end)` when that title is strictly longer than its current one.
/// - A secondary chapter is kept on its own only when no primary chapter
///   starts within [`DUPLICATE_WINDOW_SECS`] of it.
/// - The output is stably sorted by `start`; primary spans are never altered.
pub fn reconcile(primary: &[Chapter], secondary: &[Chapter]) -> Vec<Chapter> {
    let mut merged: Vec<Chapter> = Vec::with_capacity(primary.len() + secondary.len());

    for chapter in primary {
        let mut entry = chapter.clone();
        for candidate in secondary.iter().filter(|s| chapter.contains(s.start)) {
            if candidate.title.chars().count() > entry.title.chars().count() {
                entry.title = candidate.title.clone();
            }
        }
        merged.push(entry);
    }

    merged.extend(
        secondary
            .iter()
            .filter(|s| {
                !primary
                    .iter()
                    .any(|p| (s.start - p.start).abs() < DUPLICATE_WINDOW_SECS)
            })
            .cloned(),
    );

    merged.sort_by(|a, b| a.start.total_cmp(&b.start));
    merged
}
