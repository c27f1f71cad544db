//! Reversible commands and the bounded undo/redo history that runs them.

mod delete_step;

use std::collections::VecDeque;

pub use delete_step::DeleteStepCommand;

/// A unit of work that can be applied and reverted against a target, usually a repository.
///
/// A command captures by value everything `revert` needs, so it can undo itself
/// without consulting any other state.
pub trait Command<T> {
    fn apply(&self, target: &T) -> impl Future<Output = anyhow::Result<()>>;
    fn revert(&self, target: &T) -> impl Future<Output = anyhow::Result<()>>;
    /// Short label for logs.
    fn describe(&self) -> String;
}

/// Two-stack undo/redo sequencer with FIFO eviction.
///
/// Executing a new command always discards the redo stack; branching history is
/// not kept. A command whose `apply` (or `revert`) fails is left where it was, so
/// the stacks always describe what actually reached the target.
#[derive(Debug)]
pub struct CommandHistory<C> {
    undo_stack: VecDeque<C>,
    redo_stack: Vec<C>,
    capacity: usize,
}

impl<C> CommandHistory<C> {
    /// `capacity` is clamped to at least one entry.
    pub fn new(capacity: usize) -> Self {
        Self {
            undo_stack: VecDeque::new(),
            redo_stack: Vec::new(),
            capacity: capacity.max(1),
        }
    }

    pub async fn execute<T>(&mut self, command: C, target: &T) -> anyhow::Result<()>
    where
        C: Command<T>,
    {
        command.apply(target).await?;
        tracing::debug!(command = %command.describe(), "command executed");
        self.undo_stack.push_back(command);
        self.redo_stack.clear();
        while self.undo_stack.len() > self.capacity {
            if let Some(evicted) = self.undo_stack.pop_front() {
                tracing::debug!(command = %evicted.describe(), "evicted oldest command from history");
            }
        }
        Ok(())
    }

    /// Reverts the most recent command. `Ok(false)` when there is nothing to undo.
    pub async fn undo<T>(&mut self, target: &T) -> anyhow::Result<bool>
    where
        C: Command<T>,
    {
        let Some(command) = self.undo_stack.pop_back() else {
            return Ok(false);
        };
        if let Err(e) = command.revert(target).await {
            self.undo_stack.push_back(command);
            return Err(e);
        }
        tracing::debug!(command = %command.describe(), "command undone");
        self.redo_stack.push(command);
        Ok(true)
    }

    /// Re-applies the most recently undone command. `Ok(false)` when there is nothing to redo.
    pub async fn redo<T>(&mut self, target: &T) -> anyhow::Result<bool>
    where
        C: Command<T>,
    {
        let Some(command) = self.redo_stack.pop() else {
            return Ok(false);
        };
        if let Err(e) = command.apply(target).await {
            self.redo_stack.push(command);
            return Err(e);
        }
        tracing::debug!(command = %command.describe(), "command redone");
        self.undo_stack.push_back(command);
        Ok(true)
    }

    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    /// Next command `undo` would revert.
    pub fn peek_undo(&self) -> Option<&C> {
        self.undo_stack.back()
    }

    /// Next command `redo` would re-apply.
    pub fn peek_redo(&self) -> Option<&C> {
        self.redo_stack.last()
    }

    /// Undoable commands, oldest first.
    #[cfg(test)]
    fn undo_entries(&self) -> impl Iterator<Item = &C> {
        self.undo_stack.iter()
    }

    #[cfg(test)]
    fn undo_len(&self) -> usize {
        self.undo_stack.len()
    }

    /// Drops every command, undoable or redoable, for which `keep` returns false.
    /// Returns how many were dropped.
    pub fn retain(&mut self, mut keep: impl FnMut(&C) -> bool) -> usize {
        let before = self.undo_stack.len() + self.redo_stack.len();
        self.undo_stack.retain(|c| keep(c));
        self.redo_stack.retain(|c| keep(c));
        before - self.undo_stack.len() - self.redo_stack.len()
    }

    pub fn clear(&mut self) {
        self.undo_stack.clear();
        self.redo_stack.clear();
    }
}
