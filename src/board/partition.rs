use std::collections::BTreeMap;

use crate::{board::ordering, core::db::Step};

/// All steps of all projects, keyed by project id.
///
/// A mutation scoped to one project swaps that project's list wholesale through
/// [`StepPartition::replace_project`]; the other lists are never touched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StepPartition {
    by_project: BTreeMap<String, Vec<Step>>,
}

impl StepPartition {
    /// Groups a flat collection by project, each group sorted by order.
    pub fn from_steps(steps: impl IntoIterator<Item = Step>) -> Self {
        let mut by_project: BTreeMap<String, Vec<Step>> = BTreeMap::new();
        for step in steps {
            by_project.entry(step.project_id.clone()).or_default().push(step);
        }
        for steps in by_project.values_mut() {
            ordering::sort_by_order(steps);
        }
        Self { by_project }
    }

    pub fn project_steps(&self, project_id: &str) -> &[Step] {
        self.by_project
            .get(project_id)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn find(&self, project_id: &str, step_id: &str) -> Option<&Step> {
        self.project_steps(project_id).iter().find(|s| s.id == step_id)
    }

    /// Installs `steps` as the complete list of `project_id`, returning the previous list.
    pub fn replace_project(&mut self, project_id: &str, steps: Vec<Step>) -> Vec<Step> {
        debug_assert!(
            steps.iter().all(|s| s.project_id == project_id),
            "replacement list contains a step of another project"
        );
        if steps.is_empty() {
            self.by_project.remove(project_id).unwrap_or_default()
        } else {
            self.by_project
                .insert(project_id.to_string(), steps)
                .unwrap_or_default()
        }
    }

    pub fn remove_project(&mut self, project_id: &str) -> Vec<Step> {
        self.by_project.remove(project_id).unwrap_or_default()
    }

    /// Flattened view, grouped by project id and ordered within each project.
    pub fn all_steps(&self) -> impl Iterator<Item = &Step> {
        self.by_project.values().flatten()
    }

    #[cfg(test)]
    pub fn project_ids(&self) -> impl Iterator<Item = &str> {
        self.by_project.keys().map(String::as_str)
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.by_project.values().map(Vec::len).sum()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.by_project.is_empty()
    }
}
