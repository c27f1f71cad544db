//! Integration tests for the board's partition and mutation guard.
//!
//! Tests cover:
//! - Mutations of one project never touching another project's steps
//! - Concurrent mutations of the same project being serialised without loss
//! - Undo reloading only its own project while another project changes
//! - Current-step toggling and project switching

mod common;

use common::*;

#[tokio::test]
async fn test_mutations_are_isolated_per_project() -> anyhow::Result<()> {
    let fx = create_test_board().await;
    let a = add_project_with_steps(&fx.board, "A", 3).await;
    let b = add_project_with_steps(&fx.board, "B", 3).await;
    let b_before = fx.board.steps(&b);

    fx.board.reorder_steps(&a, 0, 2).await?;
    fx.board.add_step(&a).await?;
    let a_second = fx.board.steps(&a)[1].id.clone();
    fx.board.delete_step(&a, &a_second).await?;

    assert_eq!(fx.board.steps(&b), b_before);
    assert_eq!(fx.board.all_steps().len(), 6);
    assert_eq!(fx.board.steps(&a).len(), 3);

    Ok(())
}

#[tokio::test]
async fn test_concurrent_adds_on_same_project_are_not_lost() -> anyhow::Result<()> {
    let fx = create_test_board().await;
    let a = add_project_with_steps(&fx.board, "A", 0).await;

    let (s1, s2, s3, s4) = tokio::join!(
        fx.board.add_step(&a),
        fx.board.add_step(&a),
        fx.board.add_step(&a),
        fx.board.add_step(&a),
    );
    for result in [s1, s2, s3, s4] {
        result?;
    }

    let steps = fx.board.steps(&a);
    assert_eq!(steps.len(), 4);
    assert_eq!(orders(&steps), vec![0, 1, 2, 3]);
    assert_eq!(titles(&steps), vec!["Step 1", "Step 2", "Step 3", "Step 4"]);
    assert_eq!(fx.db.load_project_steps(&a).await?, steps);

    Ok(())
}

#[tokio::test]
async fn test_concurrent_mixed_mutations_keep_every_change() -> anyhow::Result<()> {
    let fx = create_test_board().await;
    let a = add_project_with_steps(&fx.board, "A", 3).await;
    let b = add_project_with_steps(&fx.board, "B", 2).await;
    let steps = fx.board.steps(&a);

    let (completed, added, deleted, reordered) = tokio::join!(
        fx.board.set_completed(&a, &steps[0].id, true),
        fx.board.add_step(&a),
        fx.board.delete_step(&a, &steps[2].id),
        fx.board.reorder_steps(&b, 1, 0),
    );
    completed?;
    let added = added?;
    deleted?;
    reordered?;

    let local = fx.board.steps(&a);
    assert_eq!(local.len(), 3);
    assert_eq!(orders(&local), vec![0, 1, 2]);
    assert!(fx.board.step(&a, &steps[0].id)?.completed);
    assert!(fx.board.step(&a, &added.id).is_ok());
    assert!(fx.board.step(&a, &steps[2].id).is_err());
    assert_eq!(titles(&fx.board.steps(&b)), vec!["Step 2", "Step 1"]);

    // Memory and store agree
    assert_eq!(fx.db.load_project_steps(&a).await?, local);

    Ok(())
}

#[tokio::test]
async fn test_undo_reload_keeps_concurrent_add_on_other_project() -> anyhow::Result<()> {
    let fx = create_test_board().await;
    let a = add_project_with_steps(&fx.board, "A", 3).await;
    let b = add_project_with_steps(&fx.board, "B", 1).await;
    let a_before = fx.board.steps(&a);
    fx.board.delete_step(&a, &a_before[1].id).await?;

    // Every read of a project's steps is held back, so B's add lands while the
    // undo is still sitting on its reloaded snapshot
    fx.fail.load_delay_ms.store(200, std::sync::atomic::Ordering::SeqCst);
    let (undone, added) = tokio::join!(fx.board.undo(), async {
        tokio::time::sleep(std::time::Duration::from_millis(300)).await;
        fx.board.add_step(&b).await
    });
    assert!(undone?);
    let added = added?;

    assert_eq!(fx.board.steps(&a), a_before);
    let b_steps = fx.board.steps(&b);
    assert_eq!(b_steps.len(), 2);
    assert_eq!(b_steps[1], added);
    assert_eq!(fx.db.load_project_steps(&b).await?, b_steps);

    Ok(())
}

#[tokio::test]
async fn test_toggle_current_step() -> anyhow::Result<()> {
    let fx = create_test_board().await;
    let a = add_project_with_steps(&fx.board, "A", 2).await;
    let steps = fx.board.steps(&a);

    assert_eq!(fx.board.toggle_current_step(&a, &steps[0].id).await?, Some(steps[0].id.clone()));
    assert_eq!(fx.board.current_step(&a), Some(steps[0].clone()));

    // Marking another step moves the marker
    assert_eq!(fx.board.toggle_current_step(&a, &steps[1].id).await?, Some(steps[1].id.clone()));
    assert_eq!(fx.db.load_projects().await?[0].current_step_id, Some(steps[1].id.clone()));

    // Marking the current step again clears it
    assert_eq!(fx.board.toggle_current_step(&a, &steps[1].id).await?, None);
    assert_eq!(fx.board.current_step(&a), None);
    assert_eq!(fx.db.load_projects().await?[0].current_step_id, None);

    Ok(())
}

#[tokio::test]
async fn test_redo_clears_restored_marker() -> anyhow::Result<()> {
    let fx = create_test_board().await;
    let a = add_project_with_steps(&fx.board, "A", 2).await;
    let step = fx.board.steps(&a)[0].clone();

    fx.board.delete_step(&a, &step.id).await?;
    fx.board.undo().await?;
    // The caller chooses to highlight the restored step again
    fx.board.toggle_current_step(&a, &step.id).await?;

    fx.board.redo().await?;

    assert_eq!(fx.board.project(&a)?.current_step_id, None);
    assert_eq!(fx.db.load_projects().await?[0].current_step_id, None);

    Ok(())
}

#[tokio::test]
async fn test_switch_project_view() -> anyhow::Result<()> {
    let fx = create_test_board().await;
    let a = add_project_with_steps(&fx.board, "A", 3).await;
    let b = add_project_with_steps(&fx.board, "B", 1).await;
    let a_steps = fx.board.steps(&a);

    fx.board.open_step(&a, &a_steps[2].id)?;
    fx.board.toggle_current_step(&a, &a_steps[1].id).await?;

    let view = fx.board.switch_project(&b)?;
    assert_eq!(view.project.name, "B");
    assert_eq!(view.steps.len(), 1);
    assert_eq!(view.last_opened, None);
    assert_eq!(view.current_step, None);

    let view = fx.board.switch_project(&a)?;
    assert_eq!(view.steps, a_steps);
    assert_eq!(view.last_opened, Some(a_steps[2].clone()));
    assert_eq!(view.current_step, Some(a_steps[1].clone()));

    assert!(matches!(fx.board.switch_project("missing"), Err(BoardError::ProjectNotFound(_))));

    Ok(())
}

#[tokio::test]
async fn test_dispatch_maps_events_to_actions() -> anyhow::Result<()> {
    let fx = create_test_board().await;
    let a = add_project_with_steps(&fx.board, "A", 0).await;

    let Outcome::Added(step) = fx
        .board
        .dispatch(UiEvent::Key(KeyCombo::NewStep { project_id: a.clone() }))
        .await
    else {
        panic!("expected a new step");
    };
    fx.board.add_step(&a).await?;

    let click = |modifier| UiEvent::StepClicked {
        project_id: a.clone(),
        step_id: step.id.clone(),
        modifier,
    };
    assert_eq!(fx.board.dispatch(click(false)).await, Outcome::Opened(step.clone()));
    assert_eq!(fx.board.last_opened_pointer(&a), Some(step.id.clone()));
    assert_eq!(fx.board.dispatch(click(true)).await, Outcome::Highlighted(Some(step.id.clone())));

    let swipe = UiEvent::Swipe {
        project_id: a.clone(),
        step_id: step.id.clone(),
        direction: SwipeDirection::Right,
    };
    assert!(matches!(fx.board.dispatch(swipe).await, Outcome::Updated(s) if s.completed));

    let dropped_outside = UiEvent::DragEnd {
        project_id: a.clone(),
        source: 0,
        destination: None,
    };
    assert_eq!(fx.board.dispatch(dropped_outside).await, Outcome::Ignored);

    let drag = UiEvent::DragEnd {
        project_id: a.clone(),
        source: 0,
        destination: Some(1),
    };
    let Outcome::Reordered(steps) = fx.board.dispatch(drag).await else {
        panic!("expected a reorder");
    };
    assert_eq!(steps[1].id, step.id);

    let delete = UiEvent::DeleteRequested {
        project_id: a.clone(),
        step_id: step.id.clone(),
    };
    assert!(matches!(fx.board.dispatch(delete).await, Outcome::Deleted(s) if s.id == step.id));
    assert_eq!(fx.board.dispatch(UiEvent::Key(KeyCombo::Undo)).await, Outcome::Undone(true));
    assert_eq!(fx.board.dispatch(UiEvent::Key(KeyCombo::Redo)).await, Outcome::Redone(true));
    assert_eq!(fx.board.dispatch(UiEvent::Key(KeyCombo::Redo)).await, Outcome::Redone(false));

    Ok(())
}
