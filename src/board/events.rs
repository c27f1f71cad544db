use crate::{
    board::StepBoard,
    core::db::{NoteRepository, ProjectRepository, Step, StepRepository},
    error::{BoardError, BoardResult},
    last_opened::LastOpenedStore,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwipeDirection {
    /// Marks the step completed.
    Right,
    /// Marks the step not completed.
    Left,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyCombo {
    Undo,
    Redo,
    NewStep { project_id: String },
}

/// A discrete user action delivered by the presentation layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UiEvent {
    /// Plain click opens the step; a click with the platform modifier toggles the highlight.
    StepClicked {
        project_id: String,
        step_id: String,
        modifier: bool,
    },
    /// Drag released. `destination` is `None` when dropped outside the list.
    DragEnd {
        project_id: String,
        source: usize,
        destination: Option<usize>,
    },
    Swipe {
        project_id: String,
        step_id: String,
        direction: SwipeDirection,
    },
    DeleteRequested {
        project_id: String,
        step_id: String,
    },
    Key(KeyCombo),
    /// Periodic timer tick driving auto-save.
    Tick,
}

/// What happened in response to an event. Failures are reported here, never raised.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Opened(Step),
    Highlighted(Option<String>),
    Added(Step),
    Updated(Step),
    Reordered(Vec<Step>),
    Deleted(Step),
    Undone(bool),
    Redone(bool),
    AutoSaved(bool),
    Ignored,
    Failed { notice: String },
}

impl<R, L> StepBoard<R, L>
where
    R: StepRepository + ProjectRepository + NoteRepository,
    L: LastOpenedStore,
{
    /// Runs the behaviour bound to `event`, recovering any failure into [`Outcome::Failed`].
    pub async fn dispatch(&self, event: UiEvent) -> Outcome {
        let label = format!("{:?}", event);
        match self.handle(event).await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!(event = %label, error = %e, "action failed");
                Outcome::Failed {
                    notice: failure_notice(&e),
                }
            }
        }
    }

    async fn handle(&self, event: UiEvent) -> BoardResult<Outcome> {
        Ok(match event {
            UiEvent::StepClicked {
                project_id,
                step_id,
                modifier: true,
            } => Outcome::Highlighted(self.toggle_current_step(&project_id, &step_id).await?),
            UiEvent::StepClicked {
                project_id,
                step_id,
                modifier: false,
            } => Outcome::Opened(self.open_step(&project_id, &step_id)?),
            UiEvent::DragEnd {
                destination: None, ..
            } => Outcome::Ignored,
            UiEvent::DragEnd {
                project_id,
                source,
                destination: Some(destination),
            } => Outcome::Reordered(self.reorder_steps(&project_id, source, destination).await?),
            UiEvent::Swipe {
                project_id,
                step_id,
                direction,
            } => {
                let completed = direction == SwipeDirection::Right;
                Outcome::Updated(self.set_completed(&project_id, &step_id, completed).await?)
            }
            UiEvent::DeleteRequested {
                project_id,
                step_id,
            } => Outcome::Deleted(self.delete_step(&project_id, &step_id).await?),
            UiEvent::Key(KeyCombo::Undo) => Outcome::Undone(self.undo().await?),
            UiEvent::Key(KeyCombo::Redo) => Outcome::Redone(self.redo().await?),
            UiEvent::Key(KeyCombo::NewStep { project_id }) => Outcome::Added(self.add_step(&project_id).await?),
            UiEvent::Tick => Outcome::AutoSaved(self.autosave_tick().await?),
        })
    }
}

fn failure_notice(error: &BoardError) -> String {
    match error {
        BoardError::Persistence(_) => "Failed to save changes".to_string(),
        BoardError::ReloadAfterUndo { action, .. } => {
            format!("{} was applied, but the steps could not be reloaded", action)
        }
        other => other.to_string(),
    }
}
