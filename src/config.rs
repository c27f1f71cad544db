use std::time::Duration;

use crate::error::{BoardError, BoardResult};

pub const DEFAULT_HISTORY_CAPACITY: usize = 50;
pub const DEFAULT_AUTOSAVE_DELAY: Duration = Duration::from_secs(2);

/// Tunables of a [`StepBoard`](crate::board::StepBoard).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoardConfig {
    /// Maximum number of undoable commands kept; the oldest is evicted first.
    pub history_capacity: usize,
    /// Quiet period after the last edit before a draft is written.
    pub autosave_delay: Duration,
}

impl Default for BoardConfig {
    fn default() -> Self {
        Self {
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            autosave_delay: DEFAULT_AUTOSAVE_DELAY,
        }
    }
}

impl BoardConfig {
    pub fn with_history_capacity(mut self, capacity: usize) -> Self {
        self.history_capacity = capacity;
        self
    }

    pub fn with_autosave_delay(mut self, delay: Duration) -> Self {
        self.autosave_delay = delay;
        self
    }

    pub fn validate(&self) -> BoardResult<()> {
        if self.history_capacity == 0 {
            return Err(BoardError::InvalidConfig(
                "history_capacity must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
