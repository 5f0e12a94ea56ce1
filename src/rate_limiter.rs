use std::time::{Duration, Instant};

/// Throttles how often a frame is admitted for full analysis, independent of
/// how fast the camera delivers them.
pub struct FrameRateLimiter {
    min_interval: Duration,
    last_execution: Option<Instant>,
}

impl FrameRateLimiter {
    pub fn new(target_fps: u32) -> Self {
        Self {
            min_interval: Duration::from_millis(1000 / u64::from(target_fps.max(1))),
            last_execution: None,
        }
    }

    pub fn can_process(&mut self) -> bool {
        self.can_process_at(Instant::now())
    }

    /// Returns true and records `now` as the new baseline when enough time
    /// has passed since the last accepted call. The first call is always
    /// accepted.
    pub fn can_process_at(&mut self, now: Instant) -> bool {
        if let Some(last) = self.last_execution {
            if now.saturating_duration_since(last) < self.min_interval {
                return false;
            }
        }
        self.last_execution = Some(now);
        true
    }

    pub fn reset(&mut self) {
        self.last_execution = None;
    }
}
