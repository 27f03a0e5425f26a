//! Frame-rate measurement for the render loop.

use std::time::{Duration, Instant};

/// Counts frames and reports the average rate once per reporting interval.
#[derive(Debug)]
pub struct FrameTimer {
    window_start: Instant,
    interval: Duration,
    frames: u32,
}

impl FrameTimer {
    /// Create a timer that reports every `interval`.
    pub fn new(interval: Duration) -> Self {
        Self {
            window_start: Instant::now(),
            interval,
            frames: 0,
        }
    }

    /// Record one finished frame.
    ///
    /// Returns the frames-per-second over the elapsed interval when the
    /// interval has passed, and starts a new one.
    pub fn frame(&mut self) -> Option<f64> {
        self.frames += 1;
        self.sample(Instant::now())
    }

    fn sample(&mut self, now: Instant) -> Option<f64> {
        let elapsed = now.saturating_duration_since(self.window_start);
        if elapsed < self.interval || elapsed.is_zero() {
            return None;
        }

        let rate = f64::from(self.frames) / elapsed.as_secs_f64();
        self.frames = 0;
        self.window_start = now;
        Some(rate)
    }

    /// Discard the frames counted so far.
    pub fn reset(&mut self) {
        self.window_start = Instant::now();
        self.frames = 0;
    }
}

impl Default for FrameTimer {
    fn default() -> Self {
        Self::new(Duration::from_secs(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_report_before_interval() {
        let mut timer = FrameTimer::new(Duration::from_secs(3600));
        assert!(timer.frame().is_none());
        assert!(timer.frame().is_none());
    }

    #[test]
    fn test_report_after_interval() {
        let mut timer = FrameTimer::new(Duration::from_millis(10));
        let start = timer.window_start;
        timer.frames = 5;

        let rate = timer.sample(start + Duration::from_millis(500));
        let rate = rate.expect("interval elapsed");
        assert!((rate - 10.0).abs() < 1e-9);
        assert_eq!(timer.frames, 0);
    }

    #[test]
    fn test_reset_clears_count() {
        let mut timer = FrameTimer::default();
        timer.frame();
        timer.frame();
        timer.reset();
        assert_eq!(timer.frames, 0);
    }
}
