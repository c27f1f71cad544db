use std::{
    io::Cursor,
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering},
    },
    time::Duration,
};

use image::{ImageBuffer, Rgb};
use projectsteps::{
    BoardConfig, MemoryLastOpened, StepBoard,
    core::db::{
        Note, NoteRepository, Project, ProjectRepository, Step, StepOrder, StepRepository, WorkspaceDb,
    },
};

/// Creates a WorkspaceDb with a temporary workspace file.
/// Returns both the workspace and the temp directory (which must be kept alive).
pub async fn create_test_workspace() -> (WorkspaceDb, tempfile::TempDir) {
    let dir = tempfile::TempDir::new().expect("Failed to create temp directory");
    let path = dir.path().join("test.projectsteps");
    let db = WorkspaceDb::new(&path)
        .await
        .expect("Failed to create test workspace");
    (db, dir)
}

/// Encodes a 16x16 red PNG in memory.
pub fn create_test_png() -> Vec<u8> {
    let img = ImageBuffer::from_fn(16, 16, |_, _| Rgb([255u8, 0u8, 0u8]));
    let mut bytes = Cursor::new(Vec::new());
    img.write_to(&mut bytes, image::ImageFormat::Png)
        .expect("Failed to encode test image");
    bytes.into_inner()
}

/// Switches for making individual store operations fail.
#[derive(Debug, Default)]
pub struct FailPoints {
    pub create_step: AtomicBool,
    pub update_step: AtomicBool,
    pub update_step_orders: AtomicBool,
    pub delete_step: AtomicBool,
    pub load_project_steps: AtomicBool,
    /// Calls to `load_project_steps` that still succeed once it is armed.
    pub load_project_steps_passes: AtomicUsize,
    /// Delay between reading and returning in `load_project_steps`, in milliseconds.
    pub load_delay_ms: AtomicU64,
    pub update_current_step: AtomicBool,
}

impl FailPoints {
    pub fn arm(flag: &AtomicBool) {
        flag.store(true, Ordering::SeqCst);
    }

    pub fn disarm(flag: &AtomicBool) {
        flag.store(false, Ordering::SeqCst);
    }

    /// Arms `load_project_steps` to fail after `passes` more successful calls.
    pub fn fail_load_after(&self, passes: usize) {
        self.load_project_steps_passes.store(passes, Ordering::SeqCst);
        Self::arm(&self.load_project_steps);
    }

    fn check_load(&self) -> anyhow::Result<()> {
        if !self.load_project_steps.load(Ordering::SeqCst) {
            return Ok(());
        }
        let passed = self
            .load_project_steps_passes
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if passed {
            return Ok(());
        }
        anyhow::bail!("injected failure in load_project_steps");
    }

    fn check(flag: &AtomicBool, op: &str) -> anyhow::Result<()> {
        if flag.load(Ordering::SeqCst) {
            anyhow::bail!("injected failure in {}", op);
        }
        Ok(())
    }
}

/// WorkspaceDb wrapper whose operations can be made to fail on demand.
#[derive(Debug, Clone)]
pub struct FlakyDb {
    pub inner: WorkspaceDb,
    pub fail: Arc<FailPoints>,
}

impl FlakyDb {
    pub fn new(inner: WorkspaceDb) -> Self {
        Self {
            inner,
            fail: Arc::new(FailPoints::default()),
        }
    }
}

impl StepRepository for FlakyDb {
    async fn load_all_steps(&self) -> anyhow::Result<Vec<Step>> {
        self.inner.load_all_steps().await
    }

    async fn load_project_steps(&self, project_id: &str) -> anyhow::Result<Vec<Step>> {
        self.fail.check_load()?;
        let steps = self.inner.load_project_steps(project_id).await?;
        // Hold the snapshot back so other writes can land before the caller uses it
        let delay = self.fail.load_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        Ok(steps)
    }

    async fn create_step(&self, step: &Step) -> anyhow::Result<()> {
        FailPoints::check(&self.fail.create_step, "create_step")?;
        self.inner.create_step(step).await
    }

    async fn update_step(&self, step: &Step) -> anyhow::Result<()> {
        FailPoints::check(&self.fail.update_step, "update_step")?;
        self.inner.update_step(step).await
    }

    async fn update_step_orders(&self, orders: &[StepOrder<'_>]) -> anyhow::Result<()> {
        FailPoints::check(&self.fail.update_step_orders, "update_step_orders")?;
        self.inner.update_step_orders(orders).await
    }

    async fn delete_step(&self, id: &str) -> anyhow::Result<()> {
        FailPoints::check(&self.fail.delete_step, "delete_step")?;
        self.inner.delete_step(id).await
    }
}

impl ProjectRepository for FlakyDb {
    async fn load_projects(&self) -> anyhow::Result<Vec<Project>> {
        self.inner.load_projects().await
    }

    async fn create_project(&self, project: &Project) -> anyhow::Result<()> {
        self.inner.create_project(project).await
    }

    async fn update_project(&self, project: &Project) -> anyhow::Result<()> {
        self.inner.update_project(project).await
    }

    async fn delete_project(&self, id: &str) -> anyhow::Result<()> {
        self.inner.delete_project(id).await
    }

    async fn update_project_current_step(&self, project_id: &str, step_id: Option<&str>) -> anyhow::Result<()> {
        FailPoints::check(&self.fail.update_current_step, "update_project_current_step")?;
        self.inner.update_project_current_step(project_id, step_id).await
    }
}

impl NoteRepository for FlakyDb {
    async fn load_notes(&self, project_id: &str) -> anyhow::Result<Vec<Note>> {
        self.inner.load_notes(project_id).await
    }

    async fn create_note(&self, note: &Note) -> anyhow::Result<()> {
        self.inner.create_note(note).await
    }

    async fn update_note(&self, note: &Note) -> anyhow::Result<()> {
        self.inner.update_note(note).await
    }

    async fn delete_note(&self, id: &str) -> anyhow::Result<()> {
        self.inner.delete_note(id).await
    }

    async fn load_important_note(&self, project_id: &str) -> anyhow::Result<Option<Note>> {
        self.inner.load_important_note(project_id).await
    }

    async fn set_important_note(&self, project_id: &str, note_id: Option<&str>) -> anyhow::Result<()> {
        self.inner.set_important_note(project_id, note_id).await
    }
}

pub type TestBoard = StepBoard<FlakyDb, Arc<MemoryLastOpened>>;

/// A board over a fresh workspace, with handles to its fail points and last-opened store.
pub struct BoardFixture {
    pub board: TestBoard,
    pub fail: Arc<FailPoints>,
    pub last_opened: Arc<MemoryLastOpened>,
    pub db: WorkspaceDb,
    pub _dir: tempfile::TempDir,
}

pub async fn create_test_board() -> BoardFixture {
    create_test_board_with(BoardConfig::default()).await
}

pub async fn create_test_board_with(config: BoardConfig) -> BoardFixture {
    let (db, dir) = create_test_workspace().await;
    let flaky = FlakyDb::new(db.clone());
    let fail = flaky.fail.clone();
    let last_opened = Arc::new(MemoryLastOpened::default());
    let board = StepBoard::load(flaky, last_opened.clone(), config)
        .await
        .expect("Failed to load board");
    BoardFixture {
        board,
        fail,
        last_opened,
        db,
        _dir: dir,
    }
}

/// Adds a project with `count` default steps and returns its id.
pub async fn add_project_with_steps(board: &TestBoard, name: &str, count: usize) -> String {
    let project = board
        .add_project(name, "")
        .await
        .expect("Failed to add project");
    for _ in 0..count {
        board
            .add_step(&project.id)
            .await
            .expect("Failed to add step");
    }
    project.id
}

pub fn titles(steps: &[Step]) -> Vec<String> {
    steps.iter().map(|s| s.title.clone()).collect()
}

pub fn orders(steps: &[Step]) -> Vec<u32> {
    steps.iter().map(|s| s.order).collect()
}
