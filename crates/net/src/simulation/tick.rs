use crate::net::Sequence;

/// Longest frame delta fed into the accumulator, so a stall does not turn
/// into a burst of catch-up ticks.
const MAX_FRAME_DELTA: f64 = 0.25;

/// Fixed-rate accumulator; every consumed tick yields the next frame id.
pub struct FixedTimestep {
    tick_rate: u32,
    dt: f64,
    accumulator: f64,
    frame_id: Sequence,
}

impl FixedTimestep {
    pub fn new(tick_rate: u32) -> Self {
        let tick_rate = tick_rate.max(1);
        Self {
            tick_rate,
            dt: 1.0 / tick_rate as f64,
            accumulator: 0.0,
            frame_id: 0,
        }
    }

    pub fn tick_rate(&self) -> u32 {
        self.tick_rate
    }

    pub fn dt(&self) -> f64 {
        self.dt
    }

    /// Id of the most recently consumed tick.
    pub fn frame_id(&self) -> Sequence {
        self.frame_id
    }

    pub fn accumulate(&mut self, delta: f64) {
        self.accumulator += delta.clamp(0.0, MAX_FRAME_DELTA);
    }

    pub fn should_tick(&self) -> bool {
        self.accumulator >= self.dt
    }

    pub fn consume_tick(&mut self) -> Option<Sequence> {
        if self.accumulator >= self.dt {
            self.accumulator -= self.dt;
            self.frame_id = self.frame_id.wrapping_add(1);
            Some(self.frame_id)
        } else {
            None
        }
    }

    pub fn alpha(&self) -> f64 {
        self.accumulator / self.dt
    }

    pub fn reset(&mut self) {
        self.accumulator = 0.0;
    }
}
