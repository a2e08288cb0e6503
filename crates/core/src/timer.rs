//! Frame timing.

use std::time::{Duration, Instant};

/// High-resolution timer for measuring elapsed time.
#[derive(Debug)]
pub struct Timer {
    start: Instant,
}

impl Timer {
    /// Create a new timer, starting from now.
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// Total elapsed time since the timer was created or reset.
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Reset the timer to the current time.
    pub fn reset(&mut self) {
        self.start = Instant::now();
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}

/// Counts presented frames and reports a rate once per interval.
#[derive(Debug)]
pub struct FrameCounter {
    timer: Timer,
    interval: Duration,
    frames_in_interval: u32,
    total_frames: u64,
}

impl FrameCounter {
    /// Create a counter that reports every `interval`.
    pub fn new(interval: Duration) -> Self {
        Self {
            timer: Timer::new(),
            interval,
            frames_in_interval: 0,
            total_frames: 0,
        }
    }

    /// Record one frame. Returns the frames-per-second figure when an
    /// interval has elapsed, then starts a new interval.
    pub fn frame(&mut self) -> Option<f64> {
        self.frames_in_interval += 1;
        self.total_frames += 1;

        let elapsed = self.timer.elapsed();
        if elapsed < self.interval {
            return None;
        }

        let fps = f64::from(self.frames_in_interval) / elapsed.as_secs_f64();
        self.frames_in_interval = 0;
        self.timer.reset();
        Some(fps)
    }

    /// Total frames recorded since creation.
    pub fn total_frames(&self) -> u64 {
        self.total_frames
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timer_elapsed_grows() {
        let timer = Timer::new();
        std::thread::sleep(Duration::from_millis(2));
        assert!(timer.elapsed() >= Duration::from_millis(2));
    }

    #[test]
    fn test_timer_reset() {
        let mut timer = Timer::new();
        std::thread::sleep(Duration::from_millis(5));
        timer.reset();
        assert!(timer.elapsed() < Duration::from_millis(5));
    }

    #[test]
    fn test_frame_counter_reports_after_interval() {
        let mut counter = FrameCounter::new(Duration::ZERO);
        let fps = counter.frame();
        assert!(fps.is_some());
        assert_eq!(counter.total_frames(), 1);
    }

    #[test]
    fn test_frame_counter_waits_for_interval() {
        let mut counter = FrameCounter::new(Duration::from_secs(3600));
        assert!(counter.frame().is_none());
        assert!(counter.frame().is_none());
        assert_eq!(counter.total_frames(), 2);
    }
}
