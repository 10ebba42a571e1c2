use std::fs;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, anyhow};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tempfile::NamedTempFile;
use tracing::{debug, info};
use uuid::Uuid;

use crate::task::{NewTask, Subtask, Task, TaskPatch};

/// Persistence boundary for task snapshots.
pub trait TaskStore {
    fn list_tasks(&self) -> anyhow::Result<Vec<Task>>;
    fn create_task(&self, new: NewTask) -> anyhow::Result<Task>;
    fn patch_task(&self, id: Uuid, patch: &TaskPatch) -> anyhow::Result<Task>;
    fn delete_task(&self, id: Uuid) -> anyhow::Result<()>;
    fn add_subtask(&self, task_id: Uuid, title: &str) -> anyhow::Result<Subtask>;
    fn toggle_subtask(&self, subtask_id: Uuid, is_done: bool) -> anyhow::Result<()>;
}

#[derive(Debug)]
pub struct FileTaskStore {
    pub data_dir: PathBuf,
    pub tasks_path: PathBuf,
}

impl FileTaskStore {
    #[tracing::instrument(skip(data_dir))]
    pub fn open(data_dir: &Path) -> anyhow::Result<Self> {
        let data_dir = data_dir.to_path_buf();
        fs::create_dir_all(&data_dir)
            .with_context(|| format!("failed to create {}", data_dir.display()))?;

        let tasks_path = data_dir.join("tasks.data");
        if !tasks_path.exists() {
            fs::write(&tasks_path, "")
                .with_context(|| format!("failed to create {}", tasks_path.display()))?;
        }

        info!(
            data_dir = %data_dir.display(),
            tasks = %tasks_path.display(),
            "opened task store"
        );

        Ok(Self {
            data_dir,
            tasks_path,
        })
    }

    fn load(&self) -> anyhow::Result<Vec<Task>> {
        load_jsonl(&self.tasks_path).context("failed to load tasks.data")
    }

    fn save(&self, tasks: &[Task]) -> anyhow::Result<()> {
        save_jsonl_atomic(&self.tasks_path, tasks).context("failed to save tasks.data")
    }
}

impl TaskStore for FileTaskStore {
    #[tracing::instrument(skip(self))]
    fn list_tasks(&self) -> anyhow::Result<Vec<Task>> {
        self.load()
    }

    #[tracing::instrument(skip(self, new), fields(title = %new.title))]
    fn create_task(&self, mut new: NewTask) -> anyhow::Result<Task> {
        new.title = normalize_title(&new.title)?;
        let mut tasks = self.load()?;
        let task = Task::from_new(new);
        tasks.push(task.clone());
        self.save(&tasks)?;
        info!(id = %task.id, "task created");
        Ok(task)
    }

    #[tracing::instrument(skip(self, patch), fields(id = %id))]
    fn patch_task(&self, id: Uuid, patch: &TaskPatch) -> anyhow::Result<Task> {
        let mut patch = patch.clone();
        if let Some(title) = &patch.title {
            patch.title = Some(normalize_title(title)?);
        }

        let mut tasks = self.load()?;
        let task = tasks
            .iter_mut()
            .find(|task| task.id == id)
            .ok_or_else(|| anyhow!("task not found: {id}"))?;
        patch.apply(task);
        let updated = task.clone();
        self.save(&tasks)?;
        debug!(status = ?updated.status, "task patched");
        Ok(updated)
    }

    #[tracing::instrument(skip(self), fields(id = %id))]
    fn delete_task(&self, id: Uuid) -> anyhow::Result<()> {
        let mut tasks = self.load()?;
        let before = tasks.len();
        tasks.retain(|task| task.id != id);
        if tasks.len() == before {
            return Err(anyhow!("task not found: {id}"));
        }
        self.save(&tasks)?;
        info!(remaining = tasks.len(), "task deleted");
        Ok(())
    }

    #[tracing::instrument(skip(self, title), fields(task_id = %task_id))]
    fn add_subtask(&self, task_id: Uuid, title: &str) -> anyhow::Result<Subtask> {
        let title = normalize_title(title)?;
        let mut tasks = self.load()?;
        let task = tasks
            .iter_mut()
            .find(|task| task.id == task_id)
            .ok_or_else(|| anyhow!("task not found: {task_id}"))?;
        let subtask = Subtask {
            id: Uuid::new_v4(),
            title,
            is_done: false,
        };
        task.subtasks.push(subtask.clone());
        self.save(&tasks)?;
        debug!(subtask_id = %subtask.id, "subtask added");
        Ok(subtask)
    }

    #[tracing::instrument(skip(self), fields(subtask_id = %subtask_id))]
    fn toggle_subtask(&self, subtask_id: Uuid, is_done: bool) -> anyhow::Result<()> {
        let mut tasks = self.load()?;
        let subtask = tasks
            .iter_mut()
            .flat_map(|task| task.subtasks.iter_mut())
            .find(|sub| sub.id == subtask_id)
            .ok_or_else(|| anyhow!("subtask not found: {subtask_id}"))?;
        subtask.is_done = is_done;
        self.save(&tasks)
    }
}

/// Flips a task between pending and done.
pub fn toggle_status<S: TaskStore + ?Sized>(store: &S, task: &Task) -> anyhow::Result<Task> {
    store.patch_task(task.id, &TaskPatch::status(task.status.toggled()))
}

/// Finds the task whose id starts with `prefix`; the match must be unique.
pub fn resolve_task_id(tasks: &[Task], prefix: &str) -> anyhow::Result<Uuid> {
    resolve_unique(tasks.iter().map(|task| task.id), prefix, "task")
}

pub fn resolve_subtask_id(tasks: &[Task], prefix: &str) -> anyhow::Result<Uuid> {
    resolve_unique(
        tasks
            .iter()
            .flat_map(|task| task.subtasks.iter().map(|sub| sub.id)),
        prefix,
        "subtask",
    )
}

fn resolve_unique<I>(ids: I, prefix: &str, kind: &str) -> anyhow::Result<Uuid>
where
    I: Iterator<Item = Uuid>,
{
    let needle = prefix.trim().to_ascii_lowercase();
    if needle.is_empty() {
        return Err(anyhow!("{kind} id cannot be empty"));
    }

    let mut matches = ids.filter(|id| id.to_string().starts_with(&needle));
    let first = matches
        .next()
        .ok_or_else(|| anyhow!("no {kind} matches id {prefix}"))?;
    if matches.next().is_some() {
        return Err(anyhow!("{kind} id {prefix} is ambiguous; use more characters"));
    }
    Ok(first)
}

fn normalize_title(raw: &str) -> anyhow::Result<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(anyhow!("title cannot be empty"));
    }
    Ok(trimmed.to_string())
}

#[tracing::instrument(skip(path))]
fn load_jsonl<T: DeserializeOwned>(path: &Path) -> anyhow::Result<Vec<T>> {
    debug!(file = %path.display(), "loading jsonl");
    let file = fs::File::open(path)?;
    let reader = BufReader::new(file);

    let mut out = Vec::new();
    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let item: T = serde_json::from_str(trimmed)
            .with_context(|| format!("failed parsing {} line {}", path.display(), idx + 1))?;
        out.push(item);
    }

    debug!(count = out.len(), "loaded records from jsonl");
    Ok(out)
}

#[tracing::instrument(skip(path, items))]
fn save_jsonl_atomic<T: Serialize>(path: &Path, items: &[T]) -> anyhow::Result<()> {
    debug!(file = %path.display(), count = items.len(), "saving jsonl atomically");

    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut temp = NamedTempFile::new_in(dir)?;
    for item in items {
        let serialized = serde_json::to_string(item)?;
        writeln!(temp, "{serialized}")?;
    }
    temp.flush()?;

    temp.persist(path)
        .map_err(|err| anyhow!("failed to persist {}: {}", path.display(), err))?;

    Ok(())
}
