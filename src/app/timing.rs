// Frame timing helpers

use std::time::{Duration, Instant};

/// Measures the time between consecutive ticks.
pub struct FrameClock {
    last: Instant,
}

impl FrameClock {
    pub fn new() -> Self {
        Self {
            last: Instant::now(),
        }
    }

    pub fn tick(&mut self) -> Duration {
        let now = Instant::now();
        let dt = now.duration_since(self.last);
        self.last = now;
        dt
    }
}

impl Default for FrameClock {
    fn default() -> Self {
        Self::new()
    }
}

/// Time accumulator that fires once per `interval` of accumulated frame time.
#[derive(Debug, Clone, Copy)]
pub struct GcCadence {
    interval: f32,
    accumulated: f32,
}

impl GcCadence {
    pub fn new(interval_secs: f32) -> Self {
        Self {
            interval: interval_secs.max(0.0),
            accumulated: 0.0,
        }
    }

    /// Add `dt` seconds; true when the interval was reached (and restart).
    pub fn tick(&mut self, dt: f32) -> bool {
        self.accumulated += dt;
        if self.accumulated >= self.interval {
            self.accumulated = 0.0;
            true
        } else {
            false
        }
    }
}

/// Frames-per-second over one-second windows, for the window title.
pub struct FpsCounter {
    frames: u32,
    window_start: Instant,
    last_frame_ms: f32,
}

impl FpsCounter {
    pub fn new() -> Self {
        Self {
            frames: 0,
            window_start: Instant::now(),
            last_frame_ms: 0.0,
        }
    }

    /// Count a rendered frame; returns `(fps, frame_ms)` once per second.
    pub fn frame_rendered(&mut self, dt: Duration) -> Option<(f32, f32)> {
        self.frames += 1;
        self.last_frame_ms = dt.as_secs_f32() * 1000.0;

        let elapsed = self.window_start.elapsed().as_secs_f32();
        if elapsed < 1.0 {
            return None;
        }
        let fps = self.frames as f32 / elapsed;
        self.frames = 0;
        self.window_start = Instant::now();
        Some((fps, self.last_frame_ms))
    }
}

impl Default for FpsCounter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cadence_fires_when_interval_is_reached() {
        let mut gc = GcCadence::new(5.0);
        assert!(!gc.tick(2.0));
        assert!(!gc.tick(2.5));
        assert!(gc.tick(0.5));
        // accumulator restarts from zero
        assert!(!gc.tick(4.0));
        assert!(gc.tick(1.0));
    }

    #[test]
    fn zero_interval_fires_every_tick() {
        let mut gc = GcCadence::new(0.0);
        assert!(gc.tick(0.0));
        assert!(gc.tick(0.016));
    }
}
