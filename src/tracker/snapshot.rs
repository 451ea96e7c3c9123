use std::{fmt::Display, sync::Arc};

/// Copy of a tracker's elapsed time at one moment.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ElapsedTimeSnapshot {
    pub task_id: Arc<str>,
    pub hours: u32,
    pub minutes: u32,
}

impl ElapsedTimeSnapshot {
    pub fn new(task_id: Arc<str>, hours: u32, minutes: u32) -> Self {
        Self {
            task_id,
            hours,
            minutes,
        }
    }

    /// Minutes are not carried into hours by the tracker, so this is the only reliable way to
    /// compare two snapshots by duration.
    pub fn total_minutes(&self) -> u64 {
        self.hours as u64 * 60 + self.minutes as u64
    }
}

impl Display for ElapsedTimeSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}h {}m", self.hours, self.minutes)
    }
}

/// Published once per mutation with the state right before and right after it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElapsedTimeChanged {
    pub before: ElapsedTimeSnapshot,
    pub after: ElapsedTimeSnapshot,
}

impl ElapsedTimeChanged {
    pub fn task_id(&self) -> &Arc<str> {
        &self.after.task_id
    }

    pub fn is_unchanged(&self) -> bool {
        self.before == self.after
    }
}
