//! Splitting a document into fixed-size page ranges.

use taxmate_core::PageRange;

/// Pages per extraction job. Small chunks keep each response short enough to
/// avoid truncated output.
pub const DEFAULT_CHUNK_SIZE: usize = 2;

/// Partition `[1, page_count]` into consecutive ranges of `chunk_size` pages.
///
/// The last range may be shorter. A `chunk_size` of zero is treated as one.
pub fn partition(page_count: usize, chunk_size: usize) -> Vec<PageRange> {
    let size = chunk_size.max(1);
    (1..=page_count)
        .step_by(size)
        .enumerate()
        .map(|(index, start)| PageRange::new(start, (start + size - 1).min(page_count), index))
        .collect()
}
