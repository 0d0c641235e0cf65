//! Progress callbacks for mesh generation and solves.
//!
//! Long-running entry points have a `*_with_progress` variant taking a
//! [`Progress`]. The callback sees `(current, total, message)`; `total` may
//! change between calls when the amount of work is only known adaptively.
//!
//! # Example
//!
//! ```
//! use std::sync::atomic::{AtomicUsize, Ordering};
//! use std::sync::Arc;
//! use eikmesh::algo::Progress;
//!
//! let calls = Arc::new(AtomicUsize::new(0));
//! let seen = Arc::clone(&calls);
//! let progress = Progress::new(move |_current, _total, _message| {
//!     seen.fetch_add(1, Ordering::Relaxed);
//! });
//! progress.report(1, 10, "relaxing");
//! assert_eq!(calls.load(Ordering::Relaxed), 1);
//! ```

/// Callback receiving `(current, total, message)` updates.
pub struct Progress {
    callback: Box<dyn Fn(usize, usize, &str) + Send + Sync>,
}

impl Progress {
    /// Wrap a callback.
    pub fn new<F>(callback: F) -> Self
    where
        F: Fn(usize, usize, &str) + Send + Sync + 'static,
    {
        Self {
            callback: Box::new(callback),
        }
    }

    /// Report that `current` of `total` steps are done.
    #[inline]
    pub fn report(&self, current: usize, total: usize, message: &str) {
        (self.callback)(current, total, message);
    }

    /// Report progress of a sub-task occupying step `range_current` of
    /// `range_total` top-level steps.
    ///
    /// The sub-task fraction is mapped onto a per-mille scale, so the callback
    /// sees `total = range_total * 1000`.
    #[inline]
    pub fn report_sub(
        &self,
        sub_current: usize,
        sub_total: usize,
        range_current: usize,
        range_total: usize,
        message: &str,
    ) {
        if sub_total == 0 || range_total == 0 {
            return;
        }
        let fraction = sub_current.min(sub_total) * 1000 / sub_total;
        (self.callback)(range_current * 1000 + fraction, range_total * 1000, message);
    }

    /// A reporter that ignores every update.
    pub fn none() -> Self {
        Self::new(|_, _, _| {})
    }
}

impl Default for Progress {
    fn default() -> Self {
        Self::none()
    }
}

impl std::fmt::Debug for Progress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Progress").finish_non_exhaustive()
    }
}
