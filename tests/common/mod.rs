#![allow(dead_code)]

mod fixtures;
pub use fixtures::*;

// Re-export commonly used types from projectsteps for tests
pub use projectsteps::{
    BoardConfig, BoardError, Draft, HistoryAction, KeyCombo, MemoryLastOpened, Outcome, StepBoard, StepEdit,
    SwipeDirection, UiEvent,
    core::db::{
        AttachmentRepository, ContentKind, NewImage, Note, NoteRepository, Project, ProjectRepository, Step,
        StepRepository, WorkspaceDb,
    },
    last_opened::LastOpenedStore,
};
