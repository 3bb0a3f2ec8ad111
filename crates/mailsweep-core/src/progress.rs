//! Progress reporting.
//!
//! A pass reports `(percent, label)` pairs. The session phase works on its
//! own 0-100 scale which [`overall_progress`] folds into the 10-90 band of
//! the whole pass.

/// Receives progress updates.
pub trait ProgressReporter: Send {
    /// Called inline with the percentage (0-100) and a short label.
    fn report(&mut self, percent: u8, label: &str);
}

impl<F> ProgressReporter for F
where
    F: FnMut(u8, &str) + Send,
{
    fn report(&mut self, percent: u8, label: &str) {
        self(percent, label);
    }
}

/// Discards every update.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl ProgressReporter for NoProgress {
    fn report(&mut self, _percent: u8, _label: &str) {}
}

/// Maps session-phase progress (0-100) onto the pass scale (10-90).
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub const fn overall_progress(phase: u8) -> u8 {
    let phase = if phase > 100 { 100 } else { phase };
    // 10 + phase * 0.8, truncated
    10 + (phase as u16 * 8 / 10) as u8
}

/// Applies a mapping function to every percentage before forwarding.
pub struct Remap<'a> {
    inner: &'a mut dyn ProgressReporter,
    map: fn(u8) -> u8,
}

impl<'a> Remap<'a> {
    /// Wraps `inner`, forwarding `map(percent)`.
    pub fn new(inner: &'a mut dyn ProgressReporter, map: fn(u8) -> u8) -> Self {
        Self { inner, map }
    }
}

impl ProgressReporter for Remap<'_> {
    fn report(&mut self, percent: u8, label: &str) {
        self.inner.report((self.map)(percent), label);
    }
}

/// Never lets the reported percentage go down.
///
/// Session retries restart their phase from the beginning; callers still
/// see a non-decreasing sequence.
pub struct Monotonic<'a> {
    inner: &'a mut dyn ProgressReporter,
    high: u8,
}

impl<'a> Monotonic<'a> {
    /// Wraps `inner`.
    pub fn new(inner: &'a mut dyn ProgressReporter) -> Self {
        Self { inner, high: 0 }
    }

    /// Releases the wrapped reporter.
    pub fn into_inner(self) -> &'a mut dyn ProgressReporter {
        self.inner
    }
}

impl ProgressReporter for Monotonic<'_> {
    fn report(&mut self, percent: u8, label: &str) {
        self.high = self.high.max(percent.min(100));
        self.inner.report(self.high, label);
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::redundant_clone,
    clippy::manual_string_new,
    clippy::needless_collect,
    clippy::unreadable_literal,
    clippy::used_underscore_items,
    clippy::similar_names
)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_overall_progress_band() {
        assert_eq!(overall_progress(0), 10);
        assert_eq!(overall_progress(20), 26);
        assert_eq!(overall_progress(40), 42);
        assert_eq!(overall_progress(65), 62);
        assert_eq!(overall_progress(90), 82);
        assert_eq!(overall_progress(100), 90);
        assert_eq!(overall_progress(250), 90);
    }

    #[test]
    fn test_closure_reporter() {
        let mut seen = Vec::new();
        let mut callback = |p: u8, label: &str| seen.push((p, label.to_string()));
        callback.report(5, "start");
        assert_eq!(seen, vec![(5, "start".to_string())]);
    }

    #[test]
    fn test_remap_then_clamp() {
        let mut seen = Vec::new();
        let mut callback = |p: u8, _: &str| seen.push(p);
        {
            let mut clamp = Monotonic::new(&mut callback);
            let mut remap = Remap::new(&mut clamp, overall_progress);
            remap.report(40, "a");
            remap.report(90, "b");
            // retry restarts the phase
            remap.report(10, "c");
            remap.report(100, "d");
        }
        assert_eq!(seen, vec![42, 82, 82, 90]);
    }

    #[test]
    fn test_into_inner_bypasses_clamp() {
        let mut seen = Vec::new();
        let mut callback = |p: u8, _: &str| seen.push(p);
        let mut clamp = Monotonic::new(&mut callback);
        clamp.report(50, "x");
        clamp.into_inner().report(0, "failed");
        assert_eq!(seen, vec![50, 0]);
    }

    proptest! {
        #[test]
        fn prop_overall_progress_monotonic(a in 0u8..=255, b in 0u8..=255) {
            let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
            prop_assert!(overall_progress(lo) <= overall_progress(hi));
            prop_assert!((10..=90).contains(&overall_progress(a)));
        }

        #[test]
        fn prop_monotonic_never_decreases(values in proptest::collection::vec(0u8..=100, 0..32)) {
            let mut seen = Vec::new();
            let mut callback = |p: u8, _: &str| seen.push(p);
            {
                let mut clamp = Monotonic::new(&mut callback);
                for v in &values {
                    clamp.report(*v, "");
                }
            }
            prop_assert!(seen.windows(2).all(|w| w[0] <= w[1]));
        }
    }
}
