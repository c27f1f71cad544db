use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

pub const UNTITLED_NOTE: &str = "Untitled Note";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Note {
    pub id: String,
    pub project_id: String,
    pub title: String,
    pub content: String,
    pub plain_text: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

pub trait NoteRepository {
    /// Notes of one project, most recently edited first.
    fn load_notes(&self, project_id: &str) -> impl Future<Output = anyhow::Result<Vec<Note>>>;
    fn create_note(&self, note: &Note) -> impl Future<Output = anyhow::Result<()>>;
    fn update_note(&self, note: &Note) -> impl Future<Output = anyhow::Result<()>>;
    fn delete_note(&self, id: &str) -> impl Future<Output = anyhow::Result<()>>;
    /// The note pinned as the project's important note, if any.
    fn load_important_note(&self, project_id: &str) -> impl Future<Output = anyhow::Result<Option<Note>>>;
    /// Pins a note of the same project, or unpins with `None`.
    fn set_important_note(
        &self,
        project_id: &str,
        note_id: Option<&str>,
    ) -> impl Future<Output = anyhow::Result<()>>;
}
