//! Integration tests for debounced auto-save of drafts.
//!
//! Tests cover:
//! - Quiet-period timing, replacement and flushing of drafts
//! - Drafts never overwriting direct writes to the same step
//! - Drafts of deleted steps and projects being dropped on teardown

mod common;

use std::time::Duration;

use common::*;

const NEVER_DUE: Duration = Duration::from_secs(3600);

async fn board_with_delay(delay: Duration) -> BoardFixture {
    create_test_board_with(BoardConfig::default().with_autosave_delay(delay)).await
}

#[tokio::test]
async fn test_draft_waits_for_quiet_period() -> anyhow::Result<()> {
    let fx = board_with_delay(NEVER_DUE).await;
    let a = add_project_with_steps(&fx.board, "A", 1).await;
    let mut draft = StepEdit::from(&fx.board.steps(&a)[0]);
    draft.title = "Measure walls".to_string();

    fx.board.edit_draft(Draft::Step(draft.clone())).await?;

    assert!(fx.board.autosave_deadline().is_some());
    assert!(!fx.board.autosave_tick().await?);
    assert_eq!(fx.board.steps(&a)[0].title, "Step 1");
    assert_eq!(fx.db.load_project_steps(&a).await?[0].title, "Step 1");

    Ok(())
}

#[tokio::test]
async fn test_due_draft_is_written_on_tick() -> anyhow::Result<()> {
    let fx = board_with_delay(Duration::ZERO).await;
    let a = add_project_with_steps(&fx.board, "A", 1).await;
    let mut draft = StepEdit::from(&fx.board.steps(&a)[0]);
    draft.title = "Measure walls".to_string();

    fx.board.edit_draft(Draft::Step(draft)).await?;

    assert_eq!(fx.board.dispatch(UiEvent::Tick).await, Outcome::AutoSaved(true));
    assert_eq!(fx.board.steps(&a)[0].title, "Measure walls");
    assert_eq!(fx.db.load_project_steps(&a).await?[0].title, "Measure walls");
    assert_eq!(fx.board.autosave_deadline(), None);
    assert_eq!(fx.board.dispatch(UiEvent::Tick).await, Outcome::AutoSaved(false));

    Ok(())
}

#[tokio::test]
async fn test_later_edit_replaces_earlier_one() -> anyhow::Result<()> {
    let fx = board_with_delay(NEVER_DUE).await;
    let a = add_project_with_steps(&fx.board, "A", 1).await;
    let mut draft = StepEdit::from(&fx.board.steps(&a)[0]);

    draft.title = "M".to_string();
    fx.board.edit_draft(Draft::Step(draft.clone())).await?;
    draft.title = "Measure".to_string();
    fx.board.edit_draft(Draft::Step(draft)).await?;

    assert!(fx.board.flush_drafts().await?);
    assert_eq!(fx.db.load_project_steps(&a).await?[0].title, "Measure");
    assert!(!fx.board.flush_drafts().await?);

    Ok(())
}

#[tokio::test]
async fn test_switching_item_writes_previous_draft() -> anyhow::Result<()> {
    let fx = board_with_delay(NEVER_DUE).await;
    let a = add_project_with_steps(&fx.board, "A", 2).await;
    let steps = fx.board.steps(&a);

    let mut first = StepEdit::from(&steps[0]);
    first.description = "<p>Left wall</p>".to_string();
    fx.board.edit_draft(Draft::Step(first)).await?;

    let mut second = StepEdit::from(&steps[1]);
    second.description = "<p>Right wall</p>".to_string();
    fx.board.edit_draft(Draft::Step(second)).await?;

    let stored = fx.db.load_project_steps(&a).await?;
    assert_eq!(stored[0].description, "<p>Left wall</p>");
    assert_eq!(stored[1].description, steps[1].description);

    Ok(())
}

#[tokio::test]
async fn test_shutdown_flushes_note_draft() -> anyhow::Result<()> {
    let fx = board_with_delay(NEVER_DUE).await;
    let a = add_project_with_steps(&fx.board, "A", 0).await;
    let mut note = fx.board.add_note(&a, "Ideas", "", "").await?;
    note.content = "<p>Skylight</p>".to_string();
    note.plain_text = "Skylight".to_string();

    fx.board.edit_draft(Draft::Note(note)).await?;
    fx.board.shutdown().await?;

    let stored = fx.board.notes(&a).await?;
    assert_eq!(stored[0].plain_text, "Skylight");
    assert_eq!(fx.board.autosave_deadline(), None);

    Ok(())
}

#[tokio::test]
async fn test_deleting_note_discards_its_draft() -> anyhow::Result<()> {
    let fx = board_with_delay(NEVER_DUE).await;
    let a = add_project_with_steps(&fx.board, "A", 0).await;
    let note = fx.board.add_note(&a, "Ideas", "", "").await?;

    fx.board.edit_draft(Draft::Note(note.clone())).await?;
    fx.board.delete_note(&note.id).await?;

    assert!(!fx.board.flush_drafts().await?);

    Ok(())
}

#[tokio::test]
async fn test_draft_does_not_undo_completion_swipe() -> anyhow::Result<()> {
    let fx = board_with_delay(NEVER_DUE).await;
    let a = add_project_with_steps(&fx.board, "A", 1).await;
    let step = fx.board.steps(&a)[0].clone();
    let mut draft = StepEdit::from(&step);
    draft.title = "Measure walls".to_string();

    fx.board.edit_draft(Draft::Step(draft)).await?;
    let swiped = fx.board.set_completed(&a, &step.id, true).await?;
    assert!(!fx.board.flush_drafts().await?);

    assert!(swiped.completed);
    assert_eq!(swiped.title, "Measure walls");
    let stored = fx.db.load_project_steps(&a).await?;
    assert!(stored[0].completed);
    assert_eq!(stored[0].title, "Measure walls");
    assert_eq!(fx.board.steps(&a), stored);

    Ok(())
}

#[tokio::test]
async fn test_draft_text_merges_over_live_step() -> anyhow::Result<()> {
    let fx = board_with_delay(NEVER_DUE).await;
    let a = add_project_with_steps(&fx.board, "A", 2).await;
    let steps = fx.board.steps(&a);
    let mut draft = StepEdit::from(&steps[0]);
    draft.plain_text = "Left wall".to_string();

    fx.board.edit_draft(Draft::Step(draft)).await?;
    // Moving the step does not touch the draft; the draft lands on the moved step
    fx.board.reorder_steps(&a, 0, 1).await?;
    fx.board.flush_drafts().await?;

    let stored = fx.db.load_project_steps(&a).await?;
    assert_eq!(stored[1].id, steps[0].id);
    assert_eq!(stored[1].order, 1);
    assert_eq!(stored[1].plain_text, "Left wall");

    Ok(())
}

#[tokio::test]
async fn test_shutdown_after_deleting_drafted_step() -> anyhow::Result<()> {
    let fx = board_with_delay(NEVER_DUE).await;
    let a = add_project_with_steps(&fx.board, "A", 2).await;
    let step = fx.board.steps(&a)[0].clone();
    let mut draft = StepEdit::from(&step);
    draft.title = "Last words".to_string();

    fx.board.edit_draft(Draft::Step(draft.clone())).await?;
    let removed = fx.board.delete_step(&a, &step.id).await?;
    // An editor still open on the deleted step keeps typing
    draft.title = "Too late".to_string();
    fx.board.edit_draft(Draft::Step(draft)).await?;
    fx.board.shutdown().await?;

    // The draft was written before the delete, so undo brings back the typed text
    assert_eq!(removed.title, "Last words");
    assert_eq!(fx.board.autosave_deadline(), None);
    fx.board.undo().await?;
    assert_eq!(fx.board.steps(&a)[0].title, "Last words");

    Ok(())
}

#[tokio::test]
async fn test_shutdown_after_deleting_drafted_project() -> anyhow::Result<()> {
    let fx = board_with_delay(NEVER_DUE).await;
    let a = add_project_with_steps(&fx.board, "A", 1).await;
    let mut draft = StepEdit::from(&fx.board.steps(&a)[0]);
    draft.title = "Orphan".to_string();

    fx.board.edit_draft(Draft::Step(draft)).await?;
    fx.board.delete_project(&a).await?;

    fx.board.shutdown().await?;
    assert!(!fx.board.flush_drafts().await?);

    Ok(())
}
