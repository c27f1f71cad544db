use std::fmt;

use thiserror::Error;

/// Which history move a reload followed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryAction {
    Undo,
    Redo,
}

impl fmt::Display for HistoryAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HistoryAction::Undo => f.write_str("Undo"),
            HistoryAction::Redo => f.write_str("Redo"),
        }
    }
}

/// Failures surfaced by board operations.
#[derive(Error, Debug)]
pub enum BoardError {
    /// The durable store rejected a create, update, delete or load.
    /// In-memory state is left as it was before the operation.
    #[error("Persistence failure: {0:#}")]
    Persistence(anyhow::Error),

    /// The undo (or redo) itself reached the store, but re-reading the steps
    /// afterwards failed. In-memory state is left untouched rather than guessed.
    #[error("{action} was applied but reloading steps failed: {error:#}")]
    ReloadAfterUndo {
        action: HistoryAction,
        error: anyhow::Error,
    },

    #[error("Project `{0}` not found.")]
    ProjectNotFound(String),

    #[error("Step `{step_id}` not found in project `{project_id}`.")]
    StepNotFound { project_id: String, step_id: String },

    #[error("Note `{note_id}` not found in project `{project_id}`.")]
    NoteNotFound { project_id: String, note_id: String },

    #[error("Cannot move step from {from} to {to}: project has {len} steps.")]
    InvalidMove { from: usize, to: usize, len: usize },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl From<anyhow::Error> for BoardError {
    fn from(error: anyhow::Error) -> Self {
        BoardError::Persistence(error)
    }
}

pub type BoardResult<T> = Result<T, BoardError>;
