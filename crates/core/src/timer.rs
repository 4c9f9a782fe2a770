//! Delta-time tracking for the update loop.

use std::time::{Duration, Instant};

/// Measures the time between successive ticks.
#[derive(Debug)]
pub struct Timer {
    start: Instant,
    last_tick: Instant,
}

impl Timer {
    /// Create a new timer, starting from now.
    pub fn new() -> Self {
        let now = Instant::now();
        Self {
            start: now,
            last_tick: now,
        }
    }

    /// Total time since the timer was created.
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Time since the last `tick()` without consuming it.
    pub fn peek(&self) -> Duration {
        self.last_tick.elapsed()
    }

    /// Time since the last `tick()`; restarts the delta measurement.
    pub fn tick(&mut self) -> Duration {
        let now = Instant::now();
        let delta = now - self.last_tick;
        self.last_tick = now;
        delta
    }

    /// Like [`Timer::tick`], but leaves the timer untouched when less than
    /// `min` has passed. Returns `None` in that case.
    pub fn tick_at_least(&mut self, min: Duration) -> Option<Duration> {
        let now = Instant::now();
        let delta = now - self.last_tick;
        if delta < min {
            return None;
        }
        self.last_tick = now;
        Some(delta)
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}
