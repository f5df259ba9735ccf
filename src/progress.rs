//! Progress reporting for long-running stack operations.

/// Receives completion percentages (0–100) from a running operation.
pub trait Progress {
    fn report(&mut self, percent: u8);
}

impl<F: FnMut(u8)> Progress for F {
    fn report(&mut self, percent: u8) {
        self(percent)
    }
}

/// Discards all updates.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl Progress for NoProgress {
    fn report(&mut self, _percent: u8) {}
}

/// Logs an update each time another `step` percent completes.
#[derive(Debug, Clone)]
pub struct LogProgress {
    label: String,
    step: u8,
    next: u8,
}

impl LogProgress {
    pub fn new(label: &str) -> Self {
        Self {
            label: label.to_string(),
            step: 10,
            next: 10,
        }
    }
}

impl Progress for LogProgress {
    fn report(&mut self, percent: u8) {
        if percent >= self.next {
            log::info!("{}: {}%", self.label, percent);
            while self.next <= percent {
                self.next = self.next.saturating_add(self.step.max(1));
                if self.next == u8::MAX {
                    break;
                }
            }
        }
    }
}

/// Percentage of `done` out of `total`, saturating at 100.
pub fn percent(done: usize, total: usize) -> u8 {
    if total == 0 {
        return 100;
    }
    ((done.min(total) * 100) / total) as u8
}
