mod attachment;
mod model;
mod note;
mod project;
mod state;
mod step;

use std::{path::{Path, PathBuf}, sync::Arc};

use sqlx::{Connection, FromRow};
use state::WorkspaceState;
use uuid::Uuid;

use model::{format_timestamp, parse_timestamp};

pub use attachment::{AttachmentRepository, ImageAttachment, NewImage};
pub use model::{ContentKind, now};
pub use note::{Note, NoteRepository, UNTITLED_NOTE};
pub use project::{Project, ProjectRepository};
pub use step::{Step, StepOrder, StepRepository};

/// Durable store backed by a packed workspace file.
///
/// Cloning is cheap; every clone talks to the same working copy.
#[derive(Debug, Clone)]
pub struct WorkspaceDb {
    state: Arc<WorkspaceState>,
}

impl WorkspaceDb {
    pub async fn new<P: AsRef<Path>>(workspace_file: P) -> anyhow::Result<Self> {
        Ok(Self {
            state: Arc::new(WorkspaceState::new(workspace_file).await?),
        })
    }

    /// Explicitly pack the workspace to disk.
    /// This is required when dropping in an async context (e.g., tests with #[tokio::test]).
    pub async fn save_workspace(&self) -> anyhow::Result<()> {
        self.state.save_workspace().await
    }
}

#[derive(FromRow)]
struct StepRow {
    id: String,
    project_id: String,
    title: String,
    description: String,
    plain_text: String,
    order_index: i64,
    completed: bool,
    created_at: String,
    updated_at: String,
}

impl TryFrom<StepRow> for Step {
    type Error = anyhow::Error;

    fn try_from(row: StepRow) -> Result<Self, Self::Error> {
        Ok(Step {
            id: row.id,
            project_id: row.project_id,
            title: row.title,
            description: row.description,
            plain_text: row.plain_text,
            order: u32::try_from(row.order_index)?,
            completed: row.completed,
            created_at: parse_timestamp(&row.created_at)?,
            updated_at: parse_timestamp(&row.updated_at)?,
        })
    }
}

const STEP_COLUMNS: &str =
    "id, project_id, title, description, plain_text, order_index, completed, created_at, updated_at";

impl StepRepository for WorkspaceDb {
    async fn load_all_steps(&self) -> anyhow::Result<Vec<Step>> {
        let mut conn = self.state.conn().await?;
        sqlx::query_as::<_, StepRow>(&format!(
            "SELECT {STEP_COLUMNS} FROM step ORDER BY project_id ASC, order_index ASC"
        ))
        .fetch_all(&mut **conn)
        .await?
        .into_iter()
        .map(Step::try_from)
        .collect()
    }

    async fn load_project_steps(&self, project_id: &str) -> anyhow::Result<Vec<Step>> {
        let mut conn = self.state.conn().await?;
        sqlx::query_as::<_, StepRow>(&format!(
            "SELECT {STEP_COLUMNS} FROM step WHERE project_id = $1 ORDER BY order_index ASC"
        ))
        .bind(project_id)
        .fetch_all(&mut **conn)
        .await?
        .into_iter()
        .map(Step::try_from)
        .collect()
    }

    async fn create_step(&self, step: &Step) -> anyhow::Result<()> {
        let mut conn = self.state.conn().await?;
        sqlx::query(
            r#"INSERT INTO step
            (id, project_id, title, description, plain_text, order_index, completed, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)"#,
        )
        .bind(&step.id)
        .bind(&step.project_id)
        .bind(&step.title)
        .bind(&step.description)
        .bind(&step.plain_text)
        .bind(i64::from(step.order))
        .bind(step.completed)
        .bind(format_timestamp(step.created_at)?)
        .bind(format_timestamp(step.updated_at)?)
        .execute(&mut **conn)
        .await?;
        Ok(())
    }

    async fn update_step(&self, step: &Step) -> anyhow::Result<()> {
        let mut conn = self.state.conn().await?;
        let result = sqlx::query(
            r#"UPDATE step SET
                title = $1,
                description = $2,
                plain_text = $3,
                order_index = $4,
                completed = $5,
                updated_at = $6
            WHERE id = $7"#,
        )
        .bind(&step.title)
        .bind(&step.description)
        .bind(&step.plain_text)
        .bind(i64::from(step.order))
        .bind(step.completed)
        .bind(format_timestamp(step.updated_at)?)
        .bind(&step.id)
        .execute(&mut **conn)
        .await?;
        if result.rows_affected() == 0 {
            anyhow::bail!("Step with id {} not found", step.id);
        }
        Ok(())
    }

    async fn update_step_orders(&self, orders: &[StepOrder<'_>]) -> anyhow::Result<()> {
        let mut conn = self.state.conn().await?;
        let mut tx = conn.begin().await?;
        for entry in orders {
            let result = sqlx::query("UPDATE step SET order_index = $1 WHERE id = $2")
                .bind(i64::from(entry.order))
                .bind(entry.id)
                .execute(&mut *tx)
                .await?;
            if result.rows_affected() == 0 {
                anyhow::bail!("Step with id {} not found", entry.id);
            }
        }
        tx.commit().await?;
        Ok(())
    }

    async fn delete_step(&self, id: &str) -> anyhow::Result<()> {
        let mut conn = self.state.conn().await?;
        let result = sqlx::query("DELETE FROM step WHERE id = $1")
            .bind(id)
            .execute(&mut **conn)
            .await?;
        if result.rows_affected() == 0 {
            anyhow::bail!("Step with id {} not found", id);
        }
        Ok(())
    }
}

#[derive(FromRow)]
struct ProjectRow {
    id: String,
    name: String,
    description: String,
    gradient: String,
    current_step_id: Option<String>,
    created_at: String,
    updated_at: String,
}

impl TryFrom<ProjectRow> for Project {
    type Error = anyhow::Error;

    fn try_from(row: ProjectRow) -> Result<Self, Self::Error> {
        Ok(Project {
            id: row.id,
            name: row.name,
            description: row.description,
            gradient: row.gradient,
            current_step_id: row.current_step_id,
            created_at: parse_timestamp(&row.created_at)?,
            updated_at: parse_timestamp(&row.updated_at)?,
        })
    }
}

impl ProjectRepository for WorkspaceDb {
    async fn load_projects(&self) -> anyhow::Result<Vec<Project>> {
        let mut conn = self.state.conn().await?;
        sqlx::query_as::<_, ProjectRow>(
            r#"SELECT id, name, description, gradient, current_step_id, created_at, updated_at
            FROM project ORDER BY created_at DESC, id ASC"#,
        )
        .fetch_all(&mut **conn)
        .await?
        .into_iter()
        .map(Project::try_from)
        .collect()
    }

    async fn create_project(&self, project: &Project) -> anyhow::Result<()> {
        let mut conn = self.state.conn().await?;
        sqlx::query(
            r#"INSERT INTO project
            (id, name, description, gradient, current_step_id, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)"#,
        )
        .bind(&project.id)
        .bind(&project.name)
        .bind(&project.description)
        .bind(&project.gradient)
        .bind(project.current_step_id.as_deref())
        .bind(format_timestamp(project.created_at)?)
        .bind(format_timestamp(project.updated_at)?)
        .execute(&mut **conn)
        .await?;
        Ok(())
    }

    async fn update_project(&self, project: &Project) -> anyhow::Result<()> {
        let mut conn = self.state.conn().await?;
        let result = sqlx::query(
            r#"UPDATE project SET
                name = $1,
                description = $2,
                gradient = $3,
                current_step_id = $4,
                updated_at = $5
            WHERE id = $6"#,
        )
        .bind(&project.name)
        .bind(&project.description)
        .bind(&project.gradient)
        .bind(project.current_step_id.as_deref())
        .bind(format_timestamp(project.updated_at)?)
        .bind(&project.id)
        .execute(&mut **conn)
        .await?;
        if result.rows_affected() == 0 {
            anyhow::bail!("Project with id {} not found", project.id);
        }
        Ok(())
    }

    /// Removes the project with its steps, notes and every image attached to any of them.
    async fn delete_project(&self, id: &str) -> anyhow::Result<()> {
        let mut conn = self.state.conn().await?;
        let mut tx = conn.begin().await?;
        let files: Vec<String> = sqlx::query_scalar(
            r#"DELETE FROM image_attachment
            WHERE (content_kind = 'project_description' AND content_id = $1)
               OR (content_kind = 'step' AND content_id IN (SELECT id FROM step WHERE project_id = $1))
               OR (content_kind = 'note' AND content_id IN (SELECT id FROM note WHERE project_id = $1))
            RETURNING file_name"#,
        )
        .bind(id)
        .fetch_all(&mut *tx)
        .await?;
        sqlx::query("DELETE FROM step WHERE project_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM note WHERE project_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM project WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        drop(conn);
        self.remove_image_files(files).await;
        Ok(())
    }

    async fn update_project_current_step(
        &self,
        project_id: &str,
        step_id: Option<&str>,
    ) -> anyhow::Result<()> {
        let mut conn = self.state.conn().await?;
        let result = sqlx::query("UPDATE project SET current_step_id = $1 WHERE id = $2")
            .bind(step_id)
            .bind(project_id)
            .execute(&mut **conn)
            .await?;
        if result.rows_affected() == 0 {
            anyhow::bail!("Project with id {} not found", project_id);
        }
        Ok(())
    }
}

#[derive(FromRow)]
struct NoteRow {
    id: String,
    project_id: String,
    title: String,
    content: String,
    plain_text: String,
    created_at: String,
    updated_at: String,
}

impl TryFrom<NoteRow> for Note {
    type Error = anyhow::Error;

    fn try_from(row: NoteRow) -> Result<Self, Self::Error> {
        Ok(Note {
            id: row.id,
            project_id: row.project_id,
            title: row.title,
            content: row.content,
            plain_text: row.plain_text,
            created_at: parse_timestamp(&row.created_at)?,
            updated_at: parse_timestamp(&row.updated_at)?,
        })
    }
}

impl NoteRepository for WorkspaceDb {
    async fn load_notes(&self, project_id: &str) -> anyhow::Result<Vec<Note>> {
        let mut conn = self.state.conn().await?;
        sqlx::query_as::<_, NoteRow>(
            r#"SELECT id, project_id, title, content, plain_text, created_at, updated_at
            FROM note WHERE project_id = $1
            ORDER BY updated_at DESC, id ASC"#,
        )
        .bind(project_id)
        .fetch_all(&mut **conn)
        .await?
        .into_iter()
        .map(Note::try_from)
        .collect()
    }

    async fn create_note(&self, note: &Note) -> anyhow::Result<()> {
        let mut conn = self.state.conn().await?;
        sqlx::query(
            r#"INSERT INTO note (id, project_id, title, content, plain_text, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)"#,
        )
        .bind(&note.id)
        .bind(&note.project_id)
        .bind(&note.title)
        .bind(&note.content)
        .bind(&note.plain_text)
        .bind(format_timestamp(note.created_at)?)
        .bind(format_timestamp(note.updated_at)?)
        .execute(&mut **conn)
        .await?;
        Ok(())
    }

    async fn update_note(&self, note: &Note) -> anyhow::Result<()> {
        let mut conn = self.state.conn().await?;
        let result = sqlx::query(
            r#"UPDATE note SET title = $1, content = $2, plain_text = $3, updated_at = $4
            WHERE id = $5"#,
        )
        .bind(&note.title)
        .bind(&note.content)
        .bind(&note.plain_text)
        .bind(format_timestamp(note.updated_at)?)
        .bind(&note.id)
        .execute(&mut **conn)
        .await?;
        if result.rows_affected() == 0 {
            anyhow::bail!("Note with id {} not found", note.id);
        }
        Ok(())
    }

    async fn delete_note(&self, id: &str) -> anyhow::Result<()> {
        let mut conn = self.state.conn().await?;
        let mut tx = conn.begin().await?;
        let files: Vec<String> = sqlx::query_scalar(
            r#"DELETE FROM image_attachment
            WHERE content_kind = 'note' AND content_id = $1
            RETURNING file_name"#,
        )
        .bind(id)
        .fetch_all(&mut *tx)
        .await?;
        sqlx::query("DELETE FROM note WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        drop(conn);
        self.remove_image_files(files).await;
        Ok(())
    }

    async fn load_important_note(&self, project_id: &str) -> anyhow::Result<Option<Note>> {
        let mut conn = self.state.conn().await?;
        sqlx::query_as::<_, NoteRow>(
            r#"SELECT n.id, n.project_id, n.title, n.content, n.plain_text, n.created_at, n.updated_at
            FROM note n JOIN project p ON p.important_note_id = n.id
            WHERE p.id = $1"#,
        )
        .bind(project_id)
        .fetch_optional(&mut **conn)
        .await?
        .map(Note::try_from)
        .transpose()
    }

    async fn set_important_note(&self, project_id: &str, note_id: Option<&str>) -> anyhow::Result<()> {
        let mut conn = self.state.conn().await?;
        if let Some(note_id) = note_id {
            let owner: Option<String> = sqlx::query_scalar("SELECT project_id FROM note WHERE id = $1")
                .bind(note_id)
                .fetch_optional(&mut **conn)
                .await?;
            if owner.as_deref() != Some(project_id) {
                anyhow::bail!("Note with id {} not found in project {}", note_id, project_id);
            }
        }
        let result = sqlx::query("UPDATE project SET important_note_id = $1 WHERE id = $2")
            .bind(note_id)
            .bind(project_id)
            .execute(&mut **conn)
            .await?;
        if result.rows_affected() == 0 {
            anyhow::bail!("Project with id {} not found", project_id);
        }
        Ok(())
    }
}

impl WorkspaceDb {
    /// Image files whose rows are already gone. A file that cannot be removed only
    /// wastes space, so failures are logged and skipped.
    async fn remove_image_files(&self, files: Vec<String>) {
        for file_name in files {
            if let Err(e) = self.state.delete_image(&file_name).await {
                tracing::warn!(file = %file_name, error = %e, "failed to remove image file");
            }
        }
    }
}

#[derive(FromRow)]
struct AttachmentRow {
    id: String,
    file_name: String,
    content_type: String,
    content_id: String,
    content_kind: String,
    created_at: String,
}

impl TryFrom<AttachmentRow> for ImageAttachment {
    type Error = anyhow::Error;

    fn try_from(row: AttachmentRow) -> Result<Self, Self::Error> {
        Ok(ImageAttachment {
            id: row.id,
            file_name: row.file_name,
            content_type: row.content_type,
            content_id: row.content_id,
            content_kind: ContentKind::try_from(row.content_kind.as_str())?,
            created_at: parse_timestamp(&row.created_at)?,
            _guard: (),
        })
    }
}

/// Stored file name: `<uuid>_<sanitized stem>.<extension of the sniffed format>`.
fn stored_file_name(id: &str, original_name: &str, extension: &str) -> String {
    let stem = Path::new(original_name)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("image")
        .replace(|c: char| !c.is_ascii_alphanumeric() && c != '-', "_");
    format!("{}_{}.{}", id, stem, extension)
}

impl AttachmentRepository for WorkspaceDb {
    async fn store_image(&self, image: NewImage) -> anyhow::Result<ImageAttachment> {
        let format = image::guess_format(&image.data)
            .map_err(|e| anyhow::anyhow!("Attachment {:?} is not a recognised image: {}", image.original_name, e))?;
        let extension = format.extensions_str().first().copied().unwrap_or("bin");
        let id = Uuid::new_v4().to_string();
        let attachment = ImageAttachment {
            file_name: stored_file_name(&id, &image.original_name, extension),
            id,
            content_type: format.to_mime_type().to_string(),
            content_id: image.content_id,
            content_kind: image.content_kind,
            created_at: now(),
            _guard: (),
        };

        self.state.write_image(&attachment.file_name, &image.data).await?;
        let mut conn = self.state.conn().await?;
        let inserted = sqlx::query(
            r#"INSERT INTO image_attachment (id, file_name, content_type, content_id, content_kind, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)"#,
        )
        .bind(&attachment.id)
        .bind(&attachment.file_name)
        .bind(&attachment.content_type)
        .bind(&attachment.content_id)
        .bind(attachment.content_kind.as_str())
        .bind(format_timestamp(attachment.created_at)?)
        .execute(&mut **conn)
        .await;
        if let Err(e) = inserted {
            drop(conn);
            self.state.delete_image(&attachment.file_name).await?;
            return Err(e.into());
        }
        tracing::debug!(id = %attachment.id, file = %attachment.file_name, "stored image attachment");
        Ok(attachment)
    }

    async fn load_attachments(
        &self,
        content_id: &str,
        kind: ContentKind,
    ) -> anyhow::Result<Vec<ImageAttachment>> {
        let mut conn = self.state.conn().await?;
        sqlx::query_as::<_, AttachmentRow>(
            r#"SELECT id, file_name, content_type, content_id, content_kind, created_at
            FROM image_attachment
            WHERE content_id = $1 AND content_kind = $2
            ORDER BY created_at ASC, id ASC"#,
        )
        .bind(content_id)
        .bind(kind.as_str())
        .fetch_all(&mut **conn)
        .await?
        .into_iter()
        .map(ImageAttachment::try_from)
        .collect()
    }

    async fn load_image_data(&self, attachment: &ImageAttachment) -> anyhow::Result<Vec<u8>> {
        self.state.read_image(&attachment.file_name).await
    }

    fn image_path(&self, attachment: &ImageAttachment) -> PathBuf {
        self.state.image_path(&attachment.file_name)
    }

    async fn delete_attachment(&self, attachment: ImageAttachment) -> anyhow::Result<()> {
        self.state.delete_image(&attachment.file_name).await?;
        let mut conn = self.state.conn().await?;
        sqlx::query("DELETE FROM image_attachment WHERE id = $1")
            .bind(&attachment.id)
            .execute(&mut **conn)
            .await?;
        Ok(())
    }

    async fn delete_attachments_for(&self, content_id: &str, kind: ContentKind) -> anyhow::Result<()> {
        for attachment in self.load_attachments(content_id, kind).await? {
            self.delete_attachment(attachment).await?;
        }
        Ok(())
    }
}
