use std::time::Duration;

use tokio::time::Instant;

/// Holds the latest unsaved value until it has been quiet for `delay`.
#[derive(Debug)]
pub struct Debounce<T> {
    delay: Duration,
    pending: Option<(T, Instant)>,
}

impl<T> Debounce<T> {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            pending: None,
        }
    }

    /// Replaces the pending value and restarts the timer. Returns the value it replaced.
    pub fn schedule(&mut self, value: T) -> Option<T> {
        let deadline = Instant::now() + self.delay;
        self.pending.replace((value, deadline)).map(|(previous, _)| previous)
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.pending.as_ref().map(|(_, deadline)| *deadline)
    }

    #[cfg(test)]
    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    pub fn pending(&self) -> Option<&T> {
        self.pending.as_ref().map(|(value, _)| value)
    }

    /// Takes the value if its quiet period has elapsed.
    pub fn take_due(&mut self) -> Option<T> {
        match self.deadline() {
            Some(deadline) if deadline <= Instant::now() => self.take(),
            _ => None,
        }
    }

    /// Takes the value regardless of the timer; used on close and teardown.
    pub fn take(&mut self) -> Option<T> {
        self.pending.take().map(|(value, _)| value)
    }
}
