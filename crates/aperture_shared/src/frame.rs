use std::time::Instant;

/// Longest step a single frame may take, so a stall never tunnels the viewer.
pub const MAX_FRAME_DELTA: f32 = 1.0 / 30.0;
const FIRST_FRAME_DELTA: f32 = 1.0 / 60.0;

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct FrameTick {
    /// Seconds since the previous frame, clamped to `MAX_FRAME_DELTA`.
    pub delta: f32,
    /// Seconds since the clock started, accumulated from clamped deltas.
    pub elapsed: f32,
}

#[derive(Debug, Clone, Default)]
pub struct FrameClock {
    last_frame: Option<Instant>,
    elapsed: f32,
}

impl FrameClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tick(&mut self) -> FrameTick {
        self.advance(Instant::now())
    }

    pub fn advance(&mut self, now: Instant) -> FrameTick {
        let delta = self
            .last_frame
            .map(|last| now.saturating_duration_since(last).as_secs_f32())
            .unwrap_or(FIRST_FRAME_DELTA);
        self.last_frame = Some(now);

        let delta = delta.min(MAX_FRAME_DELTA);
        self.elapsed += delta;
        FrameTick {
            delta,
            elapsed: self.elapsed,
        }
    }

    pub fn elapsed(&self) -> f32 {
        self.elapsed
    }
}
