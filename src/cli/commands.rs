use std::sync::Arc;

use anyhow::{anyhow, bail, Result};
use clap::ValueEnum;
use tracing::info;

use crate::{
    settings::Settings,
    tasks::{
        editor::TaskEditor,
        entities::{next_task_id, TaskEntity},
        storage::TaskStorage,
    },
    utils::clock::Clock,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ElapsedField {
    Hours,
    Minutes,
}

/// Loads `id` together with the names of every other task and wraps it in an editor.
pub async fn open_editor(
    storage: &dyn TaskStorage,
    id: &str,
    settings: &Settings,
    clock: Box<dyn Clock>,
) -> Result<TaskEditor> {
    let tasks = storage.load_all().await?;
    let (task, others): (Vec<_>, Vec<_>) = tasks.into_iter().partition(|task| &*task.id == id);
    let task = task
        .into_iter()
        .next()
        .ok_or_else(|| anyhow!("No task with id {id}"))?;
    let other_names = others.into_iter().map(|task| task.name).collect();
    TaskEditor::new(task, other_names, settings, clock)
}

pub async fn add_task(
    storage: Arc<dyn TaskStorage>,
    name: &str,
    settings: &Settings,
    clock: Box<dyn Clock>,
) -> Result<TaskEntity> {
    let tasks = storage.load_all().await?;
    let created = clock.time();
    let id = next_task_id(created, &tasks);
    let other_names = tasks.into_iter().map(|task| task.name).collect();

    let mut editor = TaskEditor::new(
        TaskEntity::new(id, name, created),
        other_names,
        settings,
        clock,
    )?;
    if !editor.validate() {
        bail!("Invalid task: {}", editor.validation_summary().join(", "));
    }

    let task = editor.to_entity();
    storage.save(task.clone()).await?;
    info!("Added task {} ({})", task.id, task.name);
    Ok(task)
}

/// Returns the task after the change and whether anything changed.
pub async fn set_elapsed(
    storage: Arc<dyn TaskStorage>,
    id: &str,
    hours: Option<u32>,
    minutes: Option<u32>,
    settings: &Settings,
    clock: Box<dyn Clock>,
) -> Result<(TaskEntity, bool)> {
    if hours.is_none() && minutes.is_none() {
        bail!("Nothing to set, pass --hours and/or --minutes");
    }
    let editor = open_editor(&*storage, id, settings, clock).await?;

    let mut changed = false;
    if let Some(hours) = hours {
        changed |= editor.tracker().set_hours(hours);
    }
    if let Some(minutes) = minutes {
        changed |= editor.tracker().set_minutes(minutes);
    }

    let task = editor.to_entity();
    if changed {
        storage.save(task.clone()).await?;
    }
    Ok((task, changed))
}

pub async fn increment_elapsed(
    storage: Arc<dyn TaskStorage>,
    id: &str,
    field: ElapsedField,
    settings: &Settings,
    clock: Box<dyn Clock>,
) -> Result<TaskEntity> {
    let editor = open_editor(&*storage, id, settings, clock).await?;
    match field {
        ElapsedField::Hours => editor.tracker().increment_hours(),
        ElapsedField::Minutes => editor.tracker().increment_minutes(),
    }
    let task = editor.to_entity();
    storage.save(task.clone()).await?;
    Ok(task)
}

pub async fn rename_task(
    storage: Arc<dyn TaskStorage>,
    id: &str,
    name: &str,
    settings: &Settings,
    clock: Box<dyn Clock>,
) -> Result<TaskEntity> {
    let mut editor = open_editor(&*storage, id, settings, clock).await?;
    if !editor.set_name(name) {
        bail!("Invalid task: {}", editor.validation_summary().join(", "));
    }
    let task = editor.to_entity();
    storage.save(task.clone()).await?;
    Ok(task)
}
