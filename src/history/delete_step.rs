use anyhow::Context;

use crate::{
    board::ordering,
    core::db::{Step, StepRepository},
    history::Command,
};

/// Deletes a step and closes the gap it leaves in its project's ordering.
///
/// Holds the complete removed record. `revert` re-creates it with its original id,
/// timestamps and position, shifting the siblings back to make room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteStepCommand {
    step: Step,
}

impl DeleteStepCommand {
    pub fn new(step: Step) -> Self {
        Self { step }
    }

    pub fn step(&self) -> &Step {
        &self.step
    }

    pub fn project_id(&self) -> &str {
        &self.step.project_id
    }

    async fn siblings<R: StepRepository>(&self, repo: &R) -> anyhow::Result<Vec<Step>> {
        let mut steps = repo.load_project_steps(&self.step.project_id).await?;
        steps.retain(|s| s.id != self.step.id);
        ordering::sort_by_order(&mut steps);
        Ok(steps)
    }
}

impl<R: StepRepository> Command<R> for DeleteStepCommand {
    async fn apply(&self, repo: &R) -> anyhow::Result<()> {
        repo.delete_step(&self.step.id)
            .await
            .with_context(|| format!("Failed to delete step {}", self.step.id))?;

        let renumbered = async {
            let mut siblings = self.siblings(repo).await?;
            ordering::renumber(&mut siblings);
            repo.update_step_orders(&ordering::order_entries(&siblings)).await
        };
        if let Err(e) = renumbered.await {
            // Put the step back so the store matches a history that never saw this delete.
            if let Err(restore) = repo.create_step(&self.step).await {
                tracing::error!(step = %self.step.id, error = %restore, "failed to restore step after aborted delete");
            }
            return Err(e.context(format!("Failed to renumber steps after deleting {}", self.step.id)));
        }
        Ok(())
    }

    async fn revert(&self, repo: &R) -> anyhow::Result<()> {
        let siblings = self.siblings(repo).await?;
        let restored = ordering::insert_at(siblings, self.step.order as usize, self.step.clone());
        let others: Vec<Step> = restored
            .iter()
            .filter(|s| s.id != self.step.id)
            .cloned()
            .collect();
        repo.update_step_orders(&ordering::order_entries(&others))
            .await
            .with_context(|| format!("Failed to make room for restored step {}", self.step.id))?;

        let step = restored
            .into_iter()
            .find(|s| s.id == self.step.id)
            .unwrap_or_else(|| self.step.clone());
        if let Err(e) = repo.create_step(&step).await {
            // Close the gap again so the project stays dense.
            let mut compacted = others;
            ordering::renumber(&mut compacted);
            if let Err(compact) = repo.update_step_orders(&ordering::order_entries(&compacted)).await {
                tracing::error!(step = %self.step.id, error = %compact, "failed to compact steps after aborted restore");
            }
            return Err(e.context(format!("Failed to restore step {}", self.step.id)));
        }
        Ok(())
    }

    fn describe(&self) -> String {
        format!("delete step {} ({:?})", self.step.id, self.step.title)
    }
}
