// Frame clock - numbers host update callbacks as scheduler ticks
// Wall-clock mode runs off the host's periodic update (nominal 60 Hz):
// one callback, one tick

#[derive(Debug, Default)]
pub struct FrameClock {
    last: u64,
}

impl FrameClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// One host frame elapsed; returns the tick number to dispatch.
    pub fn next_tick(&mut self) -> u64 {
        self.last += 1;
        self.last
    }

    /// The most recently issued tick (0 before the first frame)
    pub fn last_tick(&self) -> u64 {
        self.last
    }
}
