//! In-memory view of every project's steps, kept in step with the durable store.
//!
//! Each mutation of a project's step list runs under that project's lock and follows
//! the same shape: read the project's current list, write to the store, then swap the
//! new list into the [`StepPartition`]. Nothing is changed in memory until the store
//! has accepted the write.

mod autosave;
mod events;
mod locks;
pub mod ordering;
mod partition;

use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::{sync::Mutex as AsyncMutex, time::Instant};
use uuid::Uuid;

use crate::{
    config::BoardConfig,
    core::db::{Note, NoteRepository, Project, ProjectRepository, Step, StepRepository, UNTITLED_NOTE, now},
    error::{BoardError, BoardResult, HistoryAction},
    history::{CommandHistory, DeleteStepCommand},
    last_opened::LastOpenedStore,
};

pub use autosave::Debounce;
pub use events::{KeyCombo, Outcome, SwipeDirection, UiEvent};
pub use partition::StepPartition;

use locks::ProjectLocks;

pub const NEW_STEP_DESCRIPTION: &str = "Click to edit this step";

const GRADIENTS: &[&str] = &[
    "from-cyan-400 to-blue-500",
    "from-pink-400 to-red-500",
    "from-green-400 to-emerald-600",
    "from-yellow-400 to-orange-500",
    "from-purple-400 to-indigo-600",
];

/// Everything a caller needs to render a project right after switching to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectView {
    pub project: Project,
    pub steps: Vec<Step>,
    /// `currentStepId`, if it still names a live step.
    pub current_step: Option<Step>,
    /// Last-opened pointer, if it still names a live step.
    pub last_opened: Option<Step>,
}

/// The text fields of a step as typed in the editor. Completion and position
/// are not part of it, so a late write never resets them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepEdit {
    pub project_id: String,
    pub step_id: String,
    pub title: String,
    pub description: String,
    pub plain_text: String,
}

impl From<&Step> for StepEdit {
    fn from(step: &Step) -> Self {
        Self {
            project_id: step.project_id.clone(),
            step_id: step.id.clone(),
            title: step.title.clone(),
            description: step.description.clone(),
            plain_text: step.plain_text.clone(),
        }
    }
}

/// An edit that has not been written yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Draft {
    Step(StepEdit),
    Note(Note),
}

impl Draft {
    fn key(&self) -> &str {
        match self {
            Draft::Step(edit) => &edit.step_id,
            Draft::Note(note) => &note.id,
        }
    }

    fn project_id(&self) -> &str {
        match self {
            Draft::Step(edit) => &edit.project_id,
            Draft::Note(note) => &note.project_id,
        }
    }
}

#[derive(Debug, Default)]
struct BoardState {
    projects: Vec<Project>,
    steps: StepPartition,
}

impl BoardState {
    fn project(&self, project_id: &str) -> BoardResult<&Project> {
        self.projects
            .iter()
            .find(|p| p.id == project_id)
            .ok_or_else(|| BoardError::ProjectNotFound(project_id.to_string()))
    }

    fn project_mut(&mut self, project_id: &str) -> BoardResult<&mut Project> {
        self.projects
            .iter_mut()
            .find(|p| p.id == project_id)
            .ok_or_else(|| BoardError::ProjectNotFound(project_id.to_string()))
    }

    fn step(&self, project_id: &str, step_id: &str) -> BoardResult<&Step> {
        self.project(project_id)?;
        self.steps
            .find(project_id, step_id)
            .ok_or_else(|| BoardError::StepNotFound {
                project_id: project_id.to_string(),
                step_id: step_id.to_string(),
            })
    }

    /// Resolves a pointer against the live steps; a dangling pointer resolves to nothing.
    fn live_step(&self, project_id: &str, step_id: Option<&str>) -> Option<Step> {
        step_id.and_then(|id| self.steps.find(project_id, id).cloned())
    }
}

/// The step board: projects, their ordered steps, undo history and last-opened pointers.
pub struct StepBoard<R, L> {
    repo: R,
    last_opened: L,
    config: BoardConfig,
    state: Mutex<BoardState>,
    history: AsyncMutex<CommandHistory<DeleteStepCommand>>,
    locks: ProjectLocks,
    drafts: Mutex<Debounce<Draft>>,
}

impl<R, L> std::fmt::Debug for StepBoard<R, L> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StepBoard")
            .field("config", &self.config)
            .field("state", &self.state)
            .finish()
    }
}

impl<R, L> StepBoard<R, L>
where
    R: StepRepository + ProjectRepository + NoteRepository,
    L: LastOpenedStore,
{
    /// Loads every project and step from `repo`.
    pub async fn load(repo: R, last_opened: L, config: BoardConfig) -> BoardResult<Self> {
        config.validate()?;
        let projects = repo.load_projects().await?;
        let steps = repo.load_all_steps().await?;
        tracing::info!(projects = projects.len(), steps = steps.len(), "board loaded");
        Ok(Self {
            history: AsyncMutex::new(CommandHistory::new(config.history_capacity)),
            drafts: Mutex::new(Debounce::new(config.autosave_delay)),
            state: Mutex::new(BoardState {
                projects,
                steps: StepPartition::from_steps(steps),
            }),
            locks: ProjectLocks::default(),
            repo,
            last_opened,
            config,
        })
    }

    fn state(&self) -> MutexGuard<'_, BoardState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn drafts(&self) -> MutexGuard<'_, Debounce<Draft>> {
        self.drafts.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn repo(&self) -> &R {
        &self.repo
    }

    pub fn config(&self) -> &BoardConfig {
        &self.config
    }

    pub fn projects(&self) -> Vec<Project> {
        self.state().projects.clone()
    }

    pub fn project(&self, project_id: &str) -> BoardResult<Project> {
        self.state().project(project_id).cloned()
    }

    /// Steps of one project, in order.
    pub fn steps(&self, project_id: &str) -> Vec<Step> {
        self.state().steps.project_steps(project_id).to_vec()
    }

    pub fn step(&self, project_id: &str, step_id: &str) -> BoardResult<Step> {
        self.state().step(project_id, step_id).cloned()
    }

    /// Every step of every project.
    pub fn all_steps(&self) -> Vec<Step> {
        self.state().steps.all_steps().cloned().collect()
    }

    /// Local steps of a project that must exist.
    fn local_steps(&self, project_id: &str) -> BoardResult<Vec<Step>> {
        let state = self.state();
        state.project(project_id)?;
        Ok(state.steps.project_steps(project_id).to_vec())
    }

    fn commit_steps(&self, project_id: &str, steps: Vec<Step>) {
        debug_assert!(ordering::is_dense(&steps), "committing non-dense step list");
        self.state().steps.replace_project(project_id, steps);
    }

    // ---- projects ----

    pub async fn add_project(&self, name: &str, description: &str) -> BoardResult<Project> {
        let ts = now();
        let gradient = GRADIENTS[self.state().projects.len() % GRADIENTS.len()];
        let project = Project {
            id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            description: description.to_string(),
            gradient: gradient.to_string(),
            current_step_id: None,
            created_at: ts,
            updated_at: ts,
        };
        self.repo.create_project(&project).await?;
        self.state().projects.insert(0, project.clone());
        tracing::info!(project = %project.id, name, "project created");
        Ok(project)
    }

    pub async fn rename_project(&self, project_id: &str, name: &str) -> BoardResult<Project> {
        let _guard = self.locks.acquire(project_id).await;
        let mut project = self.project(project_id)?;
        project.name = name.to_string();
        project.updated_at = now();
        self.repo.update_project(&project).await?;
        *self.state().project_mut(project_id)? = project.clone();
        Ok(project)
    }

    /// Deletes the project with its steps and notes. Not undoable.
    ///
    /// Undo and redo entries for the project's steps go with it, as do pending drafts.
    pub async fn delete_project(&self, project_id: &str) -> BoardResult<()> {
        let mut history = self.history.lock().await;
        let _guard = self.locks.acquire(project_id).await;
        self.project(project_id)?;
        self.repo.delete_project(project_id).await?;
        let dropped = history.retain(|c| c.project_id() != project_id);
        drop(history);
        if dropped > 0 {
            tracing::debug!(project = project_id, dropped, "dropped history of deleted project");
        }
        {
            let mut state = self.state();
            state.projects.retain(|p| p.id != project_id);
            state.steps.remove_project(project_id);
        }
        {
            let mut drafts = self.drafts();
            if drafts.pending().is_some_and(|d| d.project_id() == project_id) {
                drafts.take();
            }
        }
        if let Err(e) = self.last_opened.set(project_id, None) {
            tracing::warn!(project = project_id, error = %e, "failed to forget last-opened pointer");
        }
        tracing::info!(project = project_id, "project deleted");
        Ok(())
    }

    // ---- steps ----

    /// Appends a new step with default title and description.
    pub async fn add_step(&self, project_id: &str) -> BoardResult<Step> {
        let _guard = self.locks.acquire(project_id).await;
        let local = self.local_steps(project_id)?;
        let ts = now();
        let step = Step {
            id: Uuid::new_v4().to_string(),
            project_id: project_id.to_string(),
            title: format!("Step {}", local.len() + 1),
            description: NEW_STEP_DESCRIPTION.to_string(),
            plain_text: NEW_STEP_DESCRIPTION.to_string(),
            order: u32::try_from(local.len()).unwrap_or(u32::MAX),
            completed: false,
            created_at: ts,
            updated_at: ts,
        };
        self.repo.create_step(&step).await?;
        self.commit_steps(project_id, ordering::append(local, step.clone()));
        tracing::debug!(project = project_id, step = %step.id, "step added");
        Ok(step)
    }

    /// Writes the editable fields of `edited` (title, description, plain text,
    /// completion). Identity, position and creation time stay as stored.
    pub async fn update_step(&self, edited: Step) -> BoardResult<Step> {
        let Step {
            id,
            project_id,
            title,
            description,
            plain_text,
            completed,
            ..
        } = edited;
        self.flush_draft_of(&id).await?;
        let _guard = self.locks.acquire(&project_id).await;
        self.update_step_locked(&project_id, &id, |step| {
            step.title = title;
            step.description = description;
            step.plain_text = plain_text;
            step.completed = completed;
        })
        .await
    }

    /// Swipe right marks a step done, swipe left marks it open again.
    pub async fn set_completed(&self, project_id: &str, step_id: &str, completed: bool) -> BoardResult<Step> {
        self.flush_draft_of(step_id).await?;
        let _guard = self.locks.acquire(project_id).await;
        self.update_step_locked(project_id, step_id, |step| step.completed = completed)
            .await
    }

    async fn update_step_locked(
        &self,
        project_id: &str,
        step_id: &str,
        edit: impl FnOnce(&mut Step),
    ) -> BoardResult<Step> {
        let mut local = self.local_steps(project_id)?;
        let Some(index) = local.iter().position(|s| s.id == step_id) else {
            return Err(BoardError::StepNotFound {
                project_id: project_id.to_string(),
                step_id: step_id.to_string(),
            });
        };
        let mut updated = local[index].clone();
        edit(&mut updated);
        updated.updated_at = now();
        self.repo.update_step(&updated).await?;
        local[index] = updated.clone();
        self.commit_steps(project_id, local);
        Ok(updated)
    }

    /// Drag-and-drop commit: moves the step at `from` to index `to` and rewrites
    /// every step's order.
    pub async fn reorder_steps(&self, project_id: &str, from: usize, to: usize) -> BoardResult<Vec<Step>> {
        let _guard = self.locks.acquire(project_id).await;
        let local = self.local_steps(project_id)?;
        let moved = ordering::move_step(local.clone(), from, to)?;
        if moved == local {
            return Ok(local);
        }
        self.repo
            .update_step_orders(&ordering::order_entries(&moved))
            .await?;
        self.commit_steps(project_id, moved.clone());
        tracing::debug!(project = project_id, from, to, "steps reordered");
        Ok(moved)
    }

    /// Deletes a step through the undo history.
    ///
    /// A pending draft of the step is written first, so undo restores the latest text.
    /// A `currentStepId` naming the deleted step is cleared. Undo does not bring the
    /// marker back; the last-opened pointer is left alone either way.
    pub async fn delete_step(&self, project_id: &str, step_id: &str) -> BoardResult<Step> {
        self.flush_draft_of(step_id).await?;
        let mut history = self.history.lock().await;
        let _guard = self.locks.acquire(project_id).await;

        let local = self.local_steps(project_id)?;
        let Some((removed, remaining)) = ordering::remove(local, step_id) else {
            return Err(BoardError::StepNotFound {
                project_id: project_id.to_string(),
                step_id: step_id.to_string(),
            });
        };
        history
            .execute(DeleteStepCommand::new(removed.clone()), &self.repo)
            .await?;
        drop(history);
        self.commit_steps(project_id, remaining);
        self.discard_draft_of(step_id);
        tracing::info!(project = project_id, step = step_id, "step deleted");

        let was_current = self.state().project(project_id)?.current_step_id.as_deref() == Some(step_id);
        if was_current {
            match self.repo.update_project_current_step(project_id, None).await {
                Ok(()) => self.state().project_mut(project_id)?.current_step_id = None,
                Err(e) => {
                    tracing::warn!(project = project_id, error = %e, "failed to clear stale current step");
                }
            }
        }
        Ok(removed)
    }

    // ---- history ----

    /// Reverts the latest command, then reloads the affected project's steps from the store.
    ///
    /// `Ok(false)` when there is nothing to undo. If the reload fails the in-memory
    /// steps are left as they were and [`BoardError::ReloadAfterUndo`] is returned.
    pub async fn undo(&self) -> BoardResult<bool> {
        let mut history = self.history.lock().await;
        let Some(project_id) = history.peek_undo().map(|c| c.project_id().to_string()) else {
            return Ok(false);
        };
        let _guard = self.locks.acquire(&project_id).await;
        if !history.undo(&self.repo).await? {
            return Ok(false);
        }
        drop(history);
        self.reload_project_locked(&project_id)
            .await
            .map_err(|error| BoardError::ReloadAfterUndo {
                action: HistoryAction::Undo,
                error,
            })?;
        tracing::info!(project = %project_id, "undo applied");
        Ok(true)
    }

    /// Re-applies the latest undone command, then reloads the affected project's steps.
    pub async fn redo(&self) -> BoardResult<bool> {
        let mut history = self.history.lock().await;
        let Some(project_id) = history.peek_redo().map(|c| c.project_id().to_string()) else {
            return Ok(false);
        };
        let _guard = self.locks.acquire(&project_id).await;
        if !history.redo(&self.repo).await? {
            return Ok(false);
        }
        drop(history);
        self.reload_project_locked(&project_id)
            .await
            .map_err(|error| BoardError::ReloadAfterUndo {
                action: HistoryAction::Redo,
                error,
            })?;
        self.clear_stale_current(&project_id).await;
        tracing::info!(project = %project_id, "redo applied");
        Ok(true)
    }

    pub async fn can_undo(&self) -> bool {
        self.history.lock().await.can_undo()
    }

    pub async fn can_redo(&self) -> bool {
        self.history.lock().await.can_redo()
    }

    /// Drops all undo and redo entries. Only called at explicit reset points.
    pub async fn clear_history(&self) {
        self.history.lock().await.clear();
        tracing::debug!("command history cleared");
    }

    /// Re-reads one project's steps from the store and swaps them in.
    pub async fn reload_project(&self, project_id: &str) -> BoardResult<Vec<Step>> {
        let _guard = self.locks.acquire(project_id).await;
        self.project(project_id)?;
        self.reload_project_locked(project_id).await?;
        Ok(self.steps(project_id))
    }

    /// Caller holds the project's lock; other projects' lists are left alone.
    async fn reload_project_locked(&self, project_id: &str) -> anyhow::Result<()> {
        let mut steps = self.repo.load_project_steps(project_id).await?;
        ordering::sort_by_order(&mut steps);
        self.state().steps.replace_project(project_id, steps);
        Ok(())
    }

    async fn clear_stale_current(&self, project_id: &str) {
        let stale = {
            let state = self.state();
            match state.project(project_id) {
                Ok(project) => project
                    .current_step_id
                    .as_deref()
                    .is_some_and(|id| state.steps.find(project_id, id).is_none()),
                Err(_) => false,
            }
        };
        if !stale {
            return;
        }
        match self.repo.update_project_current_step(project_id, None).await {
            Ok(()) => {
                if let Ok(project) = self.state().project_mut(project_id) {
                    project.current_step_id = None;
                }
            }
            Err(e) => tracing::warn!(project = project_id, error = %e, "failed to clear stale current step"),
        }
    }

    // ---- current step and last-opened ----

    /// Modifier-click: highlights the step, or clears the highlight if it already is the current one.
    pub async fn toggle_current_step(&self, project_id: &str, step_id: &str) -> BoardResult<Option<String>> {
        let _guard = self.locks.acquire(project_id).await;
        let next = {
            let state = self.state();
            state.step(project_id, step_id)?;
            let project = state.project(project_id)?;
            if project.current_step_id.as_deref() == Some(step_id) {
                None
            } else {
                Some(step_id.to_string())
            }
        };
        self.repo
            .update_project_current_step(project_id, next.as_deref())
            .await?;
        self.state().project_mut(project_id)?.current_step_id = next.clone();
        Ok(next)
    }

    /// The highlighted step, if the marker still names a live step.
    pub fn current_step(&self, project_id: &str) -> Option<Step> {
        let state = self.state();
        let current = state.project(project_id).ok()?.current_step_id.clone();
        state.live_step(project_id, current.as_deref())
    }

    /// Opens a step for editing and records it as the project's last-opened step.
    pub fn open_step(&self, project_id: &str, step_id: &str) -> BoardResult<Step> {
        let step = self.step(project_id, step_id)?;
        if let Err(e) = self.last_opened.set(project_id, Some(step_id)) {
            tracing::warn!(project = project_id, step = step_id, error = %e, "failed to record last-opened step");
        }
        Ok(step)
    }

    /// Raw pointer as stored, possibly dangling.
    pub fn last_opened_pointer(&self, project_id: &str) -> Option<String> {
        self.last_opened.get(project_id)
    }

    /// Last-opened step, if the pointer still names a live step.
    pub fn last_opened_step(&self, project_id: &str) -> Option<Step> {
        let pointer = self.last_opened.get(project_id);
        self.state().live_step(project_id, pointer.as_deref())
    }

    pub fn switch_project(&self, project_id: &str) -> BoardResult<ProjectView> {
        let pointer = self.last_opened.get(project_id);
        let state = self.state();
        let project = state.project(project_id)?.clone();
        Ok(ProjectView {
            steps: state.steps.project_steps(project_id).to_vec(),
            current_step: state.live_step(project_id, project.current_step_id.as_deref()),
            last_opened: state.live_step(project_id, pointer.as_deref()),
            project,
        })
    }

    // ---- notes ----

    pub async fn notes(&self, project_id: &str) -> BoardResult<Vec<Note>> {
        self.project(project_id)?;
        Ok(self.repo.load_notes(project_id).await?)
    }

    pub async fn add_note(&self, project_id: &str, title: &str, content: &str, plain_text: &str) -> BoardResult<Note> {
        self.project(project_id)?;
        let ts = now();
        let note = Note {
            id: Uuid::new_v4().to_string(),
            project_id: project_id.to_string(),
            title: note_title(title),
            content: content.to_string(),
            plain_text: plain_text.trim().to_string(),
            created_at: ts,
            updated_at: ts,
        };
        self.repo.create_note(&note).await?;
        Ok(note)
    }

    /// Writes `note` as given. A pending draft of the same note is superseded.
    pub async fn update_note(&self, note: Note) -> BoardResult<Note> {
        self.discard_draft_of(&note.id);
        self.write_note(note).await
    }

    async fn write_note(&self, mut note: Note) -> BoardResult<Note> {
        note.title = note_title(&note.title);
        note.plain_text = note.plain_text.trim().to_string();
        note.updated_at = now();
        self.repo.update_note(&note).await?;
        Ok(note)
    }

    pub async fn delete_note(&self, note_id: &str) -> BoardResult<()> {
        self.discard_draft_of(note_id);
        Ok(self.repo.delete_note(note_id).await?)
    }

    /// The note pinned for the project, if any.
    pub async fn important_note(&self, project_id: &str) -> BoardResult<Option<Note>> {
        self.project(project_id)?;
        Ok(self.repo.load_important_note(project_id).await?)
    }

    /// Pins one of the project's notes as its important note; `None` unpins.
    pub async fn set_important_note(&self, project_id: &str, note_id: Option<&str>) -> BoardResult<()> {
        self.project(project_id)?;
        if let Some(note_id) = note_id {
            let notes = self.repo.load_notes(project_id).await?;
            if !notes.iter().any(|n| n.id == note_id) {
                return Err(BoardError::NoteNotFound {
                    project_id: project_id.to_string(),
                    note_id: note_id.to_string(),
                });
            }
        }
        self.repo.set_important_note(project_id, note_id).await?;
        tracing::debug!(project = project_id, note = ?note_id, "important note set");
        Ok(())
    }

    // ---- auto-save ----

    /// Records an in-progress edit. It is written once edits pause for the
    /// configured delay, or earlier on [`StepBoard::flush_drafts`]. A pending
    /// draft of a different item is written immediately.
    pub async fn edit_draft(&self, draft: Draft) -> BoardResult<()> {
        let displaced = self.drafts().schedule(draft.clone());
        match displaced {
            Some(previous) if previous.key() != draft.key() => self.persist_draft(previous).await,
            _ => Ok(()),
        }
    }

    pub fn autosave_deadline(&self) -> Option<Instant> {
        self.drafts().deadline()
    }

    /// Writes the pending draft if its quiet period has elapsed. Returns whether anything was written.
    pub async fn autosave_tick(&self) -> BoardResult<bool> {
        let due = self.drafts().take_due();
        match due {
            Some(draft) => self.persist_draft(draft).await.map(|()| true),
            None => Ok(false),
        }
    }

    /// Writes any pending draft now. Called when an editor closes and on teardown.
    pub async fn flush_drafts(&self) -> BoardResult<bool> {
        let pending = self.drafts().take();
        match pending {
            Some(draft) => self.persist_draft(draft).await.map(|()| true),
            None => Ok(false),
        }
    }

    fn discard_draft_of(&self, key: &str) -> Option<Draft> {
        let mut drafts = self.drafts();
        if drafts.pending().is_some_and(|d| d.key() == key) {
            drafts.take()
        } else {
            None
        }
    }

    /// Writes the pending draft now if it belongs to `key`. Direct writes to the
    /// same item call this first so the draft cannot land on top of them later.
    async fn flush_draft_of(&self, key: &str) -> BoardResult<()> {
        match self.discard_draft_of(key) {
            Some(draft) => self.persist_draft(draft).await,
            None => Ok(()),
        }
    }

    async fn persist_draft(&self, draft: Draft) -> BoardResult<()> {
        let key = draft.key().to_string();
        let saved = match draft {
            Draft::Step(StepEdit {
                project_id,
                step_id,
                title,
                description,
                plain_text,
            }) => {
                let _guard = self.locks.acquire(&project_id).await;
                self.update_step_locked(&project_id, &step_id, |step| {
                    step.title = title;
                    step.description = description;
                    step.plain_text = plain_text;
                })
                .await
                .map(|_| ())
            }
            Draft::Note(note) => self.write_note(note).await.map(|_| ()),
        };
        match saved {
            Ok(()) => {
                tracing::debug!(id = %key, "draft auto-saved");
                Ok(())
            }
            Err(BoardError::StepNotFound { .. } | BoardError::ProjectNotFound(_)) => {
                tracing::warn!(id = %key, "dropping draft of deleted item");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Teardown: flushes pending edits so no final keystrokes are lost.
    pub async fn shutdown(&self) -> BoardResult<()> {
        self.flush_drafts().await?;
        Ok(())
    }
}

fn note_title(title: &str) -> String {
    if title.trim().is_empty() {
        UNTITLED_NOTE.to_string()
    } else {
        title.to_string()
    }
}
