#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Per-tick host input: a monotonically increasing tick counter, the frame delta time, and the
/// global seed.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TickContext {
    pub tick: u64,
    pub dt_seconds: f32,
    pub seed: u64,
}

impl Default for TickContext {
    fn default() -> Self {
        Self {
            tick: 0,
            dt_seconds: 0.0,
            seed: 0,
        }
    }
}

impl TickContext {
    pub fn new(tick: u64, dt_seconds: f32) -> Self {
        Self {
            tick,
            dt_seconds,
            seed: 0,
        }
    }

    /// The context for the following frame with the same delta time.
    pub fn next(self) -> Self {
        Self {
            tick: self.tick.wrapping_add(1),
            ..self
        }
    }
}
