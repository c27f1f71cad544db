use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// A single step of a project. `order` is dense and zero-based within its project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Step {
    pub id: String,
    pub project_id: String,
    pub title: String,
    pub description: String,
    /// Cached plain-text rendering of `description`; may lag behind it.
    pub plain_text: String,
    pub order: u32,
    pub completed: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

/// New position of a step, written in bulk after a renumbering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepOrder<'a> {
    pub id: &'a str,
    pub order: u32,
}

impl<'a> From<&'a Step> for StepOrder<'a> {
    fn from(step: &'a Step) -> Self {
        StepOrder {
            id: &step.id,
            order: step.order,
        }
    }
}

pub trait StepRepository {
    /// Every step of every project, ordered by project and position.
    fn load_all_steps(&self) -> impl Future<Output = anyhow::Result<Vec<Step>>>;
    fn load_project_steps(&self, project_id: &str) -> impl Future<Output = anyhow::Result<Vec<Step>>>;
    /// Insert the full record, including its id, order and timestamps.
    fn create_step(&self, step: &Step) -> impl Future<Output = anyhow::Result<()>>;
    fn update_step(&self, step: &Step) -> impl Future<Output = anyhow::Result<()>>;
    /// Rewrite `order` for several steps in one transaction.
    fn update_step_orders(&self, orders: &[StepOrder<'_>]) -> impl Future<Output = anyhow::Result<()>>;
    fn delete_step(&self, id: &str) -> impl Future<Output = anyhow::Result<()>>;
}
