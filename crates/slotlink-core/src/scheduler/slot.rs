/// Start time and fixed length of the current scheduling slot.
#[derive(Debug, Clone, Copy)]
pub struct SlotClock {
    start: f64,
    duration: f64,
    ticks: u64,
}

impl SlotClock {
    pub fn new(duration: f64) -> Self {
        Self {
            start: 0.0,
            duration,
            ticks: 0,
        }
    }

    /// Starts a new slot at `now`. Slot starts never move backwards.
    pub fn advance(&mut self, now: f64) {
        debug_assert!(now >= self.start, "slot start moved backwards");
        self.start = self.start.max(now);
        self.ticks += 1;
    }

    pub fn start(&self) -> f64 {
        self.start
    }

    pub fn duration(&self) -> f64 {
        self.duration
    }

    pub fn end(&self) -> f64 {
        self.start + self.duration
    }

    /// Seconds left in the slot at `now`, never negative.
    pub fn remaining(&self, now: f64) -> f64 {
        (self.end() - now).max(0.0)
    }

    /// Whether something taking `tx_time` seconds from `now` runs past the
    /// slot boundary.
    pub fn overruns(&self, now: f64, tx_time: f64) -> bool {
        now + tx_time > self.end()
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }
}
