/// Countdown driven by host delta time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Timer {
    interval: f32,
    time_left: f32,
    running: bool,
}

impl Timer {
    pub fn new(interval_seconds: f32) -> Self {
        Self {
            interval: interval_seconds.max(0.0),
            time_left: 0.0,
            running: false,
        }
    }

    pub fn interval(&self) -> f32 {
        self.interval
    }

    pub fn time_left(&self) -> f32 {
        self.time_left
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn start(&mut self) {
        self.time_left = self.interval;
        self.running = true;
    }

    pub fn stop(&mut self) {
        self.time_left = 0.0;
        self.running = false;
    }

    /// Advance by `dt_seconds`. Returns `true` on the update that expires the timer.
    pub fn update(&mut self, dt_seconds: f32) -> bool {
        if !self.running {
            return false;
        }
        self.time_left -= dt_seconds.max(0.0);
        if self.time_left <= 0.0 {
            self.stop();
            return true;
        }
        false
    }
}
