pub mod board;
pub mod config;
pub mod core;
pub mod error;
pub mod history;
pub mod last_opened;

pub use board::{Draft, KeyCombo, Outcome, ProjectView, StepBoard, StepEdit, SwipeDirection, UiEvent};
pub use config::BoardConfig;
pub use error::{BoardError, BoardResult, HistoryAction};
pub use last_opened::{JsonFileLastOpened, LastOpenedStore, MemoryLastOpened};
