//! Frame timing for context loops

use std::time::{Duration, Instant};

/// Per-context frame clock
///
/// Measures the delta between frames and, when a target frame time is set,
/// sleeps off the remainder of each frame.
#[derive(Debug)]
pub struct FrameClock {
    last_frame: Instant,
    delta_time: f32,
    total_time: f32,
    frame_count: u64,
    target_frame_time: Option<Duration>,
}

impl Default for FrameClock {
    fn default() -> Self {
        Self::new(None)
    }
}

impl FrameClock {
    /// Create a clock; `target_frame_time` of `None` runs unpaced
    pub fn new(target_frame_time: Option<Duration>) -> Self {
        Self {
            last_frame: Instant::now(),
            delta_time: 0.0,
            total_time: 0.0,
            frame_count: 0,
            target_frame_time,
        }
    }

    /// Start a new frame and return the seconds elapsed since the previous one
    pub fn tick(&mut self) -> f32 {
        let now = Instant::now();
        self.delta_time = now.duration_since(self.last_frame).as_secs_f32();
        self.total_time += self.delta_time;
        self.last_frame = now;
        self.frame_count += 1;
        self.delta_time
    }

    /// Sleep until the target frame time has elapsed since the last tick
    pub fn pace(&self) {
        if let Some(target) = self.target_frame_time {
            let spent = self.last_frame.elapsed();
            if spent < target {
                std::thread::sleep(target - spent);
            }
        }
    }

    /// Seconds between the last two ticks
    pub fn delta_time(&self) -> f32 {
        self.delta_time
    }

    /// Seconds accumulated over all ticks
    pub fn total_time(&self) -> f32 {
        self.total_time
    }

    /// Number of ticks so far
    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tick_counts_frames() {
        let mut clock = FrameClock::default();
        clock.tick();
        clock.tick();
        assert_eq!(clock.frame_count(), 2);
        assert!(clock.delta_time() >= 0.0);
        assert!(clock.total_time() >= clock.delta_time());
    }

    #[test]
    fn test_pace_waits_for_target() {
        let mut clock = FrameClock::new(Some(Duration::from_millis(5)));
        clock.tick();
        let start = Instant::now();
        clock.pace();
        assert!(start.elapsed() >= Duration::from_millis(4));
    }
}
