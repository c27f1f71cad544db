use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::Context;
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};

use projectsteps::{
    BoardConfig, Draft, JsonFileLastOpened, KeyCombo, Outcome, StepBoard, StepEdit, SwipeDirection, UiEvent,
    config::{DEFAULT_AUTOSAVE_DELAY, DEFAULT_HISTORY_CAPACITY},
    core::db::{AttachmentRepository, ContentKind, NewImage, Note, Step, WorkspaceDb},
};

type Board = StepBoard<WorkspaceDb, JsonFileLastOpened>;

#[derive(Parser)]
#[command(name = "projectsteps")]
#[command(about = "Keep projects as ordered lists of steps, with undoable deletes")]
struct Cli {
    /// Workspace file; created if it does not exist
    #[arg(value_name = "WORKSPACE", env = "PROJECTSTEPS_WORKSPACE")]
    workspace: PathBuf,

    /// Where last-opened steps are remembered [default: <WORKSPACE>.last-opened.json]
    #[arg(long, value_name = "FILE", env = "PROJECTSTEPS_LAST_OPENED")]
    last_opened: Option<PathBuf>,

    /// Number of deletes that can be undone
    #[arg(long, default_value_t = DEFAULT_HISTORY_CAPACITY)]
    history_capacity: usize,

    /// Quiet period before an edited draft is saved, in milliseconds
    #[arg(long, default_value_t = DEFAULT_AUTOSAVE_DELAY.as_millis() as u64)]
    autosave_ms: u64,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose { "debug" } else { "warn" };
    let filter = std::env::var("RUST_LOG").unwrap_or_else(|_| format!("projectsteps={}", log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let config = BoardConfig::default()
        .with_history_capacity(cli.history_capacity)
        .with_autosave_delay(Duration::from_millis(cli.autosave_ms));
    let last_opened_path = cli
        .last_opened
        .clone()
        .unwrap_or_else(|| default_last_opened_path(&cli.workspace));

    let db = WorkspaceDb::new(&cli.workspace)
        .await
        .with_context(|| format!("Failed to open workspace {:?}", cli.workspace))?;
    let last_opened = JsonFileLastOpened::open(&last_opened_path)?;
    let board = StepBoard::load(db, last_opened, config).await?;

    let mut session = Session {
        project: board.projects().first().map(|p| p.id.clone()),
        board,
    };
    println!("projectsteps: type `help` for commands");
    session.print_header();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let deadline = session.board.autosave_deadline();
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                match session.run(&line).await {
                    Ok(Flow::Continue) => {}
                    Ok(Flow::Quit) => break,
                    Err(e) => println!("error: {:#}", e),
                }
            }
            _ = tokio::time::sleep_until(deadline.unwrap_or_else(tokio::time::Instant::now)), if deadline.is_some() => {
                session.report(session.board.dispatch(UiEvent::Tick).await);
            }
        }
    }

    // A draft that cannot be written must not cost the rest of the session
    if let Err(e) = session.board.shutdown().await {
        tracing::error!(error = %e, "failed to write pending draft on exit");
    }
    session.board.repo().save_workspace().await?;
    Ok(())
}

fn default_last_opened_path(workspace: &Path) -> PathBuf {
    let mut name = workspace.as_os_str().to_owned();
    name.push(".last-opened.json");
    PathBuf::from(name)
}

enum Flow {
    Continue,
    Quit,
}

struct Session {
    board: Board,
    /// Project the step commands act on.
    project: Option<String>,
}

impl Session {
    fn project_id(&self) -> anyhow::Result<String> {
        self.project
            .clone()
            .context("No project selected; use `project add <name>` or `project use <n>`")
    }

    /// Resolves a 1-based position in the selected project.
    fn step_at(&self, arg: &str) -> anyhow::Result<Step> {
        let project_id = self.project_id()?;
        let position = parse_position(arg)?;
        self.board
            .steps(&project_id)
            .into_iter()
            .nth(position)
            .with_context(|| format!("No step at position {}", position + 1))
    }

    async fn run(&mut self, line: &str) -> anyhow::Result<Flow> {
        let mut words = line.split_whitespace();
        let Some(command) = words.next() else {
            return Ok(Flow::Continue);
        };
        let rest: Vec<&str> = words.collect();

        match (command, rest.as_slice()) {
            ("help", _) => print_help(),
            ("list" | "ls", _) => self.print_steps()?,
            ("add", _) => {
                let event = UiEvent::Key(KeyCombo::NewStep {
                    project_id: self.project_id()?,
                });
                self.report(self.board.dispatch(event).await);
            }
            ("open", [n]) => {
                let step = self.step_at(n)?;
                self.report(self.board.dispatch(self.click(&step, false)).await);
            }
            ("mark" | "click", [n]) => {
                let step = self.step_at(n)?;
                self.report(self.board.dispatch(self.click(&step, true)).await);
            }
            ("done" | "undone", [n]) => {
                let step = self.step_at(n)?;
                let direction = if command == "done" {
                    SwipeDirection::Right
                } else {
                    SwipeDirection::Left
                };
                let event = UiEvent::Swipe {
                    project_id: step.project_id,
                    step_id: step.id,
                    direction,
                };
                self.report(self.board.dispatch(event).await);
            }
            ("edit", [n, title @ ..]) if !title.is_empty() => {
                let mut edit = StepEdit::from(&self.step_at(n)?);
                edit.title = title.join(" ");
                self.board.edit_draft(Draft::Step(edit)).await?;
                println!("draft saved in {} ms unless edited again", self.board.config().autosave_delay.as_millis());
            }
            ("close", _) => {
                let written = self.board.flush_drafts().await?;
                println!("{}", if written { "draft saved" } else { "nothing to save" });
            }
            ("move", [from, to]) => {
                let event = UiEvent::DragEnd {
                    project_id: self.project_id()?,
                    source: parse_position(from)?,
                    destination: Some(parse_position(to)?),
                };
                self.report(self.board.dispatch(event).await);
            }
            ("delete" | "rm", [n]) => {
                let step = self.step_at(n)?;
                let event = UiEvent::DeleteRequested {
                    project_id: step.project_id,
                    step_id: step.id,
                };
                self.report(self.board.dispatch(event).await);
            }
            ("reload", _) => {
                let steps = self.board.reload_project(&self.project_id()?).await?;
                println!("reloaded {} steps", steps.len());
            }
            ("undo", _) => self.report(self.board.dispatch(UiEvent::Key(KeyCombo::Undo)).await),
            ("redo", _) => self.report(self.board.dispatch(UiEvent::Key(KeyCombo::Redo)).await),
            ("history", ["clear"]) => {
                self.board.clear_history().await;
                println!("history cleared");
            }
            ("project", args) => self.project_command(args).await?,
            ("note", args) => self.note_command(args).await?,
            ("attach", [n, path]) => self.attach(n, Path::new(path)).await?,
            ("save", _) => {
                self.board.flush_drafts().await?;
                self.board.repo().save_workspace().await?;
                println!("workspace saved");
            }
            ("quit" | "exit", _) => return Ok(Flow::Quit),
            _ => println!("unknown command `{}`; type `help`", line.trim()),
        }
        Ok(Flow::Continue)
    }

    fn click(&self, step: &Step, modifier: bool) -> UiEvent {
        UiEvent::StepClicked {
            project_id: step.project_id.clone(),
            step_id: step.id.clone(),
            modifier,
        }
    }

    async fn project_command(&mut self, args: &[&str]) -> anyhow::Result<()> {
        match args {
            [] | ["list"] => {
                for (i, project) in self.board.projects().iter().enumerate() {
                    let selected = if self.project.as_deref() == Some(project.id.as_str()) { ">" } else { " " };
                    println!("{} {:>2}. {}", selected, i + 1, project.name);
                }
            }
            ["add", name @ ..] if !name.is_empty() => {
                let project = self.board.add_project(&name.join(" "), "").await?;
                self.project = Some(project.id);
                self.print_header();
            }
            ["use", n] => {
                let position = parse_position(n)?;
                let project = self
                    .board
                    .projects()
                    .into_iter()
                    .nth(position)
                    .with_context(|| format!("No project at position {}", position + 1))?;
                self.project = Some(project.id);
                self.print_header();
            }
            ["rename", name @ ..] if !name.is_empty() => {
                let project = self.board.rename_project(&self.project_id()?, &name.join(" ")).await?;
                println!("renamed to {}", project.name);
            }
            ["delete"] => {
                let project_id = self.project_id()?;
                self.board.delete_project(&project_id).await?;
                self.project = self.board.projects().first().map(|p| p.id.clone());
                self.print_header();
            }
            _ => println!("usage: project [list | add <name> | use <n> | rename <name> | delete]"),
        }
        Ok(())
    }

    async fn note_command(&mut self, args: &[&str]) -> anyhow::Result<()> {
        let project_id = self.project_id()?;
        match args {
            [] | ["list"] => {
                let pinned = self.board.important_note(&project_id).await?.map(|n| n.id);
                for (i, note) in self.board.notes(&project_id).await?.iter().enumerate() {
                    let marker = if pinned.as_deref() == Some(note.id.as_str()) { "!" } else { " " };
                    println!("{} {:>2}. {}  {}", marker, i + 1, note.title, note.plain_text);
                }
            }
            ["add", text @ ..] => {
                let text = text.join(" ");
                let (title, body) = text.split_once(':').unwrap_or((text.as_str(), ""));
                let note = self.board.add_note(&project_id, title.trim(), body, body).await?;
                println!("note {} added", note.title);
            }
            ["delete", n] => {
                let note = self.note_at(&project_id, n).await?;
                self.board.delete_note(&note.id).await?;
                println!("note {} deleted", note.title);
            }
            ["pin", n] => {
                let note = self.note_at(&project_id, n).await?;
                self.board.set_important_note(&project_id, Some(&note.id)).await?;
                println!("note {} pinned", note.title);
            }
            ["unpin"] => {
                self.board.set_important_note(&project_id, None).await?;
                println!("important note cleared");
            }
            _ => println!("usage: note [list | add <title>: <text> | delete <n> | pin <n> | unpin]"),
        }
        Ok(())
    }

    async fn note_at(&self, project_id: &str, arg: &str) -> anyhow::Result<Note> {
        let position = parse_position(arg)?;
        self.board
            .notes(project_id)
            .await?
            .into_iter()
            .nth(position)
            .with_context(|| format!("No note at position {}", position + 1))
    }

    async fn attach(&self, n: &str, path: &Path) -> anyhow::Result<()> {
        let step = self.step_at(n)?;
        let data = tokio::fs::read(path)
            .await
            .with_context(|| format!("Failed to read {:?}", path))?;
        let original_name = path
            .file_name()
            .and_then(|s| s.to_str())
            .unwrap_or("image")
            .to_string();
        let attachment = self
            .board
            .repo()
            .store_image(NewImage {
                data,
                original_name,
                content_id: step.id.clone(),
                content_kind: ContentKind::Step,
            })
            .await?;
        println!("attached {} ({}) to {}", attachment.file_name, attachment.content_type, step.title);
        Ok(())
    }

    fn print_header(&self) {
        let Some(project_id) = self.project.as_deref() else {
            println!("no projects yet");
            return;
        };
        match self.board.switch_project(project_id) {
            Ok(view) => {
                println!("== {} ({} steps)", view.project.name, view.steps.len());
                if let Some(step) = view.current_step {
                    println!("   current: {}", step.title);
                }
                if let Some(step) = view.last_opened {
                    println!("   last opened: {}", step.title);
                }
            }
            Err(e) => println!("error: {}", e),
        }
    }

    fn print_steps(&self) -> anyhow::Result<()> {
        let project_id = self.project_id()?;
        let current = self.board.current_step(&project_id).map(|s| s.id);
        for step in self.board.steps(&project_id) {
            let marker = if current.as_deref() == Some(step.id.as_str()) { "*" } else { " " };
            let done = if step.completed { "x" } else { " " };
            println!("{} {:>2}. [{}] {}", marker, step.order + 1, done, step.title);
        }
        Ok(())
    }

    fn report(&self, outcome: Outcome) {
        match outcome {
            Outcome::Opened(step) => println!("{}\n  {}", step.title, step.plain_text),
            Outcome::Highlighted(Some(_)) => println!("step marked as current"),
            Outcome::Highlighted(None) => println!("current marker cleared"),
            Outcome::Added(step) => println!("added {}", step.title),
            Outcome::Updated(step) => {
                println!("{} is {}", step.title, if step.completed { "done" } else { "open" })
            }
            Outcome::Reordered(_) => {
                if let Err(e) = self.print_steps() {
                    println!("error: {:#}", e);
                }
            }
            Outcome::Deleted(step) => println!("deleted {}", step.title),
            Outcome::Undone(true) => println!("undone"),
            Outcome::Undone(false) => println!("nothing to undo"),
            Outcome::Redone(true) => println!("redone"),
            Outcome::Redone(false) => println!("nothing to redo"),
            Outcome::AutoSaved(true) => println!("draft saved"),
            Outcome::AutoSaved(false) | Outcome::Ignored => {}
            Outcome::Failed { notice } => println!("error: {}", notice),
        }
    }
}

fn parse_position(arg: &str) -> anyhow::Result<usize> {
    let n: usize = arg
        .parse()
        .with_context(|| format!("`{}` is not a position", arg))?;
    n.checked_sub(1).context("Positions start at 1")
}

fn print_help() {
    println!(
        "\
project [list | add <name> | use <n> | rename <name> | delete]
list                 show steps of the selected project
add                  append a new step
open <n>             open a step (remembered as last opened)
mark <n>             toggle the current-step marker (alias: click)
done <n> / undone <n>
edit <n> <title>     edit a step title (auto-saved)
close                save a pending edit now
move <from> <to>
delete <n>
undo / redo
reload               re-read the selected project's steps from the workspace
history clear
note [list | add <title>: <text> | delete <n> | pin <n> | unpin]
attach <n> <image>
save
quit"
    );
}
