use std::time::{Duration, Instant};

const FPS_WINDOW: Duration = Duration::from_millis(500);

/// Frame cadence and a frames-per-second estimate refreshed twice a second.
pub struct FrameTiming {
    last_frame_time: Option<Instant>,
    last_fps_time: Instant,
    frame_count: u32,
    pub frame_dt: f32,
    fps: Option<f64>,
}

impl FrameTiming {
    pub fn new(now: Instant) -> Self {
        Self {
            last_frame_time: None,
            last_fps_time: now,
            frame_count: 0,
            frame_dt: 1.0 / 60.0,
            fps: None,
        }
    }

    pub fn fps(&self) -> Option<f64> {
        self.fps
    }

    /// Records a presented frame. Returns `true` when the estimate changed.
    pub fn update(&mut self, now: Instant) -> bool {
        let dt = match self.last_frame_time {
            Some(last) => now.saturating_duration_since(last),
            None => Duration::from_millis(16),
        };
        self.last_frame_time = Some(now);
        self.frame_dt = dt.as_secs_f32();

        self.frame_count = self.frame_count.saturating_add(1);
        let elapsed = now.saturating_duration_since(self.last_fps_time);
        if elapsed < FPS_WINDOW {
            return false;
        }
        self.fps = Some(self.frame_count as f64 / elapsed.as_secs_f64());
        self.frame_count = 0;
        self.last_fps_time = now;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::FrameTiming;
    use std::time::{Duration, Instant};

    #[test]
    fn fps_is_estimated_over_half_a_second() {
        let start = Instant::now();
        let mut timing = FrameTiming::new(start);
        for frame in 1..30 {
            assert!(!timing.update(start + Duration::from_millis(frame * 10)));
        }
        assert!(timing.fps().is_none());
        assert!(timing.update(start + Duration::from_millis(500)));
        let fps = timing.fps().unwrap();
        assert!((fps - 60.0).abs() < 1e-6);
        assert!((timing.frame_dt - 0.21).abs() < 1e-3);
    }
}
