//! Dense, zero-based ordering of a project's steps.
//!
//! Every insert, delete and move renumbers the whole sequence (`order[i] = i`)
//! instead of patching individual positions, so gaps and duplicates cannot build up.

use crate::{
    core::db::{Step, StepOrder},
    error::{BoardError, BoardResult},
};

fn position(index: usize) -> u32 {
    u32::try_from(index).unwrap_or(u32::MAX)
}

/// Sorts by the stored order. Ties keep their relative input order.
pub fn sort_by_order(steps: &mut [Step]) {
    steps.sort_by_key(|step| step.order);
}

/// Overwrites `order` with each step's index in the slice.
pub fn renumber(steps: &mut [Step]) {
    for (index, step) in steps.iter_mut().enumerate() {
        step.order = position(index);
    }
}

/// Order entries for every step, for a bulk write after [`renumber`].
pub fn order_entries(steps: &[Step]) -> Vec<StepOrder<'_>> {
    steps.iter().map(StepOrder::from).collect()
}

/// True when the orders are exactly `0..n`, each once, in slice order.
pub fn is_dense(steps: &[Step]) -> bool {
    steps
        .iter()
        .enumerate()
        .all(|(index, step)| step.order == position(index))
}

/// Moves the step at `from` so that it ends up at index `to`, then renumbers.
pub fn move_step(mut steps: Vec<Step>, from: usize, to: usize) -> BoardResult<Vec<Step>> {
    let len = steps.len();
    if from >= len || to >= len {
        return Err(BoardError::InvalidMove { from, to, len });
    }
    let step = steps.remove(from);
    steps.insert(to, step);
    renumber(&mut steps);
    Ok(steps)
}

/// Appends a step at the end and renumbers.
pub fn append(mut steps: Vec<Step>, step: Step) -> Vec<Step> {
    steps.push(step);
    renumber(&mut steps);
    steps
}

/// Removes the step with `step_id` and renumbers the rest. `None` if absent.
pub fn remove(mut steps: Vec<Step>, step_id: &str) -> Option<(Step, Vec<Step>)> {
    let index = steps.iter().position(|step| step.id == step_id)?;
    let removed = steps.remove(index);
    renumber(&mut steps);
    Some((removed, steps))
}

/// Inserts `step` at `index` (clamped to the end) and renumbers.
pub fn insert_at(mut steps: Vec<Step>, index: usize, step: Step) -> Vec<Step> {
    let index = index.min(steps.len());
    steps.insert(index, step);
    renumber(&mut steps);
    steps
}
