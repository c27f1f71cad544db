use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub id: String,
    pub name: String,
    pub description: String,
    pub gradient: String,
    /// Highlighted step. Not ownership: it may point at a step that no longer exists.
    pub current_step_id: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

pub trait ProjectRepository {
    /// All projects, newest first.
    fn load_projects(&self) -> impl Future<Output = anyhow::Result<Vec<Project>>>;
    fn create_project(&self, project: &Project) -> impl Future<Output = anyhow::Result<()>>;
    fn update_project(&self, project: &Project) -> impl Future<Output = anyhow::Result<()>>;
    /// Removes the project together with its steps and notes.
    fn delete_project(&self, id: &str) -> impl Future<Output = anyhow::Result<()>>;
    fn update_project_current_step(
        &self,
        project_id: &str,
        step_id: Option<&str>,
    ) -> impl Future<Output = anyhow::Result<()>>;
}
