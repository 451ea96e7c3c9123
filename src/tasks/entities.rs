use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::utils::man_hours::{HoursPerDay, ManHours};

/// A task as stored on disk. One JSON object per line.
#[derive(PartialEq, Eq, Debug, Serialize, Deserialize, Clone)]
pub struct TaskEntity {
    pub id: Arc<str>,
    pub name: String,
    #[serde(default)]
    pub hours: u32,
    #[serde(default)]
    pub minutes: u32,
    #[serde(with = "chrono::serde::ts_seconds")]
    pub created: DateTime<Utc>,
    #[serde(default, with = "chrono::serde::ts_seconds_option")]
    pub last_tracked: Option<DateTime<Utc>>,
}

impl TaskEntity {
    pub fn new(id: Arc<str>, name: impl Into<String>, created: DateTime<Utc>) -> Self {
        Self {
            id,
            name: name.into(),
            hours: 0,
            minutes: 0,
            created,
            last_tracked: None,
        }
    }

    pub fn with_elapsed(self, hours: u32, minutes: u32) -> Self {
        Self {
            hours,
            minutes,
            ..self
        }
    }

    pub fn man_hours(&self, hours_per_day: HoursPerDay) -> ManHours {
        ManHours::from_elapsed(self.hours, self.minutes, hours_per_day)
    }
}

/// Builds an id from the creation time, bumping it until it doesn't collide with `existing`.
pub fn next_task_id(created: DateTime<Utc>, existing: &[TaskEntity]) -> Arc<str> {
    let mut candidate = created.timestamp_millis();
    loop {
        let id = format!("t{candidate}");
        if !existing.iter().any(|task| *task.id == id) {
            return id.into();
        }
        candidate += 1;
    }
}
