use std::{io::ErrorKind, path::PathBuf};

use anyhow::Result;
use async_trait::async_trait;
use fs4::tokio::AsyncFileExt;
use tokio::{
    fs::File,
    io::{AsyncBufReadExt, AsyncReadExt, AsyncSeekExt, AsyncWriteExt, BufReader},
};
use tracing::{debug, warn};

use super::entities::TaskEntity;

pub const TASKS_FILE: &str = "tasks.jsonl";

/// Interface for abstracting storage of tasks.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TaskStorage: Send + Sync {
    /// Returns every stored task in insertion order.
    async fn load_all(&self) -> Result<Vec<TaskEntity>>;

    async fn get(&self, id: &str) -> Result<Option<TaskEntity>>;

    /// Inserts `task` or replaces the stored task with the same id.
    async fn save(&self, task: TaskEntity) -> Result<()>;

    /// Returns whether a task was removed.
    async fn remove(&self, id: &str) -> Result<bool>;
}

/// Keeps all tasks in a single JSON lines file. Readers take a shared lock, writers an exclusive
/// one and rewrite the whole file.
pub struct TaskStorageImpl {
    path: PathBuf,
}

impl TaskStorageImpl {
    pub fn new(dir: PathBuf) -> Result<Self, std::io::Error> {
        std::fs::create_dir_all(&dir)?;

        Ok(Self {
            path: dir.join(TASKS_FILE),
        })
    }

    async fn read_tasks(&self) -> Result<Vec<TaskEntity>> {
        let file = match File::open(&self.path).await {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(vec![]),
            Err(e) => return Err(e.into()),
        };
        debug!("Reading tasks from {:?}", self.path);
        file.lock_shared()?;
        let mut lines = BufReader::new(file).lines();
        let mut content = Vec::new();
        let result = loop {
            match lines.next_line().await {
                Ok(Some(line)) => content.push(line),
                Ok(None) => break Ok(()),
                Err(e) => break Err(e),
            }
        };
        lines.into_inner().into_inner().unlock_async().await?;
        result?;

        Ok(parse_tasks(content.iter().map(String::as_str)))
    }

    /// Applies `change` to the stored tasks while holding an exclusive lock and writes the result
    /// back.
    async fn update_tasks<R>(&self, change: impl FnOnce(&mut Vec<TaskEntity>) -> R) -> Result<R> {
        let mut file = File::options()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&self.path)
            .await?;

        file.lock_exclusive()?;
        let result = Self::update_with_file(&mut file, change).await;
        file.unlock_async().await?;
        result
    }

    async fn update_with_file<R>(
        file: &mut File,
        change: impl FnOnce(&mut Vec<TaskEntity>) -> R,
    ) -> Result<R> {
        let mut content = String::new();
        file.read_to_string(&mut content).await?;
        let mut tasks = parse_tasks(content.lines());

        let result = change(&mut tasks);

        let mut buffer = Vec::<u8>::new();
        for task in &tasks {
            serde_json::to_writer(&mut buffer, task)?;
            buffer.push(b'\n');
        }

        file.set_len(0).await?;
        file.rewind().await?;
        file.write_all(&buffer).await?;
        file.flush().await?;
        Ok(result)
    }
}

fn parse_tasks<'a>(lines: impl Iterator<Item = &'a str>) -> Vec<TaskEntity> {
    lines
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| match serde_json::from_str::<TaskEntity>(line) {
            Ok(task) => Some(task),
            Err(e) => {
                // A write cut short by a crash leaves a partial line behind.
                warn!("Skipping corrupted task line {line}: {e}");
                None
            }
        })
        .collect()
}

#[async_trait]
impl TaskStorage for TaskStorageImpl {
    async fn load_all(&self) -> Result<Vec<TaskEntity>> {
        self.read_tasks().await
    }

    async fn get(&self, id: &str) -> Result<Option<TaskEntity>> {
        Ok(self
            .read_tasks()
            .await?
            .into_iter()
            .find(|task| &*task.id == id))
    }

    async fn save(&self, task: TaskEntity) -> Result<()> {
        self.update_tasks(move |tasks| {
            match tasks.iter_mut().find(|existing| existing.id == task.id) {
                Some(existing) => *existing = task,
                None => tasks.push(task),
            }
        })
        .await
    }

    async fn remove(&self, id: &str) -> Result<bool> {
        self.update_tasks(|tasks| {
            let before = tasks.len();
            tasks.retain(|task| &*task.id != id);
            tasks.len() != before
        })
        .await
    }
}
