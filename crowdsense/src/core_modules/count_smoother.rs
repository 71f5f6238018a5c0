// THEORY:
// Raw person counts jitter from frame to frame as the detector gains and loses
// marginal boxes. The `CountSmoother` keeps a short sliding window of recent counts
// and reports their (floored) mean, which is what the HUD shows and what the
// stationary-crowd rule compares against `min_people`.

use std::collections::VecDeque;

pub struct CountSmoother {
    window: VecDeque<usize>,
    capacity: usize,
}

impl CountSmoother {
    /// `capacity` must be at least one; the config layer rejects zero.
    pub fn new(capacity: usize) -> Self {
        Self {
            window: VecDeque::with_capacity(capacity),
            capacity: capacity.max(1),
        }
    }

    /// Records this frame's raw count and returns the smoothed count.
    pub fn push(&mut self, raw: usize) -> usize {
        self.window.push_back(raw);
        if self.window.len() > self.capacity {
            self.window.pop_front();
        }
        self.current()
    }

    pub fn current(&self) -> usize {
        if self.window.is_empty() {
            return 0;
        }
        self.window.iter().sum::<usize>() / self.window.len()
    }
}
