//! Page-level progress reporting.

use std::sync::{Mutex, PoisonError};

/// Progress sink: `(pages_completed, total_pages)`.
pub type ProgressSink<'a> = &'a (dyn Fn(usize, usize) + Send + Sync);

/// Tracks pages completed across concurrent lanes and forwards every step to
/// the sink. Updates and emissions happen under one lock, so the sink sees a
/// non-decreasing `current` capped at `total` regardless of which lane
/// finishes first.
pub struct ProgressReporter<'a> {
    total: usize,
    completed: Mutex<usize>,
    sink: ProgressSink<'a>,
}

impl<'a> ProgressReporter<'a> {
    pub fn new(total: usize, sink: ProgressSink<'a>) -> Self {
        Self {
            total,
            completed: Mutex::new(0),
            sink,
        }
    }

    /// Announce the run before any long-running work starts.
    pub fn start(&self) {
        (self.sink)(0, self.total);
    }

    /// Record `pages` more completed pages, emitting once per page.
    pub fn advance(&self, pages: usize) {
        let mut completed = self.completed.lock().unwrap_or_else(PoisonError::into_inner);
        for _ in 0..pages {
            if *completed >= self.total {
                break;
            }
            *completed += 1;
            (self.sink)(*completed, self.total);
        }
    }

    pub fn completed(&self) -> usize {
        *self.completed.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn total(&self) -> usize {
        self.total
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_emits_each_page_and_caps_at_total() {
        let seen = Mutex::new(Vec::new());
        let sink = |c: usize, t: usize| seen.lock().unwrap().push((c, t));
        let reporter = ProgressReporter::new(3, &sink);

        reporter.start();
        reporter.advance(2);
        reporter.advance(2);

        assert_eq!(*seen.lock().unwrap(), vec![(0, 3), (1, 3), (2, 3), (3, 3)]);
        assert_eq!(reporter.completed(), 3);
    }
}
