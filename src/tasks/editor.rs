use std::{
    cell::RefCell,
    collections::BTreeMap,
    rc::Rc,
    sync::{Arc, Mutex, PoisonError},
};

use anyhow::Result;
use chrono::{DateTime, Utc};

use crate::{
    settings::Settings,
    tracker::{snapshot::ElapsedTimeSnapshot, ElapsedTimeTracker},
    utils::{
        clock::Clock,
        man_hours::{HoursPerDay, ManHours},
    },
    validation::{rule::PropertyRule, PropertyValidator},
};

use super::entities::TaskEntity;

pub const NAME_PROPERTY: &str = "name";
pub const MAX_NAME_LENGTH: usize = 64;

/// The editable part of a task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskDraft {
    pub name: String,
}

/// Edits a single task. Owns the task's tracker and the validator for its editable fields, and
/// keeps a displayed total and a validation summary up to date from their notifications.
pub struct TaskEditor {
    id: Arc<str>,
    created: DateTime<Utc>,
    last_tracked: Option<DateTime<Utc>>,
    draft: TaskDraft,
    validator: PropertyValidator<TaskDraft>,
    tracker: ElapsedTimeTracker,
    hours_per_day: HoursPerDay,
    displayed_total: Arc<Mutex<ElapsedTimeSnapshot>>,
    validation_summary: Rc<RefCell<BTreeMap<String, Vec<String>>>>,
}

impl TaskEditor {
    /// `other_names` are the names of every other task, used to keep names unique.
    pub fn new(
        task: TaskEntity,
        other_names: Vec<String>,
        settings: &Settings,
        clock: Box<dyn Clock>,
    ) -> Result<Self> {
        let tracker = ElapsedTimeTracker::new(task.id.clone(), settings.tick_period(), clock)?
            .with_elapsed(task.hours, task.minutes);

        let displayed_total = Arc::new(Mutex::new(tracker.snapshot()));
        let display = displayed_total.clone();
        tracker.subscribe(move |event| {
            *display.lock().unwrap_or_else(PoisonError::into_inner) = event.after.clone();
        });

        let mut validator = PropertyValidator::<TaskDraft>::new();
        validator.add_rule(
            NAME_PROPERTY,
            PropertyRule::with_message(
                |draft: &TaskDraft| !draft.name.trim().is_empty(),
                "name is required",
            ),
        );
        validator.add_rule(
            NAME_PROPERTY,
            PropertyRule::new(
                |draft: &TaskDraft| draft.name.chars().count() <= MAX_NAME_LENGTH,
                |_: &TaskDraft| format!("name must be at most {MAX_NAME_LENGTH} characters"),
            ),
        );
        validator.add_rule(
            NAME_PROPERTY,
            PropertyRule::with_message(
                move |draft: &TaskDraft| {
                    !other_names
                        .iter()
                        .any(|name| name.trim() == draft.name.trim())
                },
                "a task with this name already exists",
            ),
        );

        let validation_summary = Rc::new(RefCell::new(BTreeMap::<String, Vec<String>>::new()));
        let summary = validation_summary.clone();
        validator.on_errors_changed(move |property, errors| {
            let mut summary = summary.borrow_mut();
            if errors.is_empty() {
                summary.remove(property);
            } else {
                summary.insert(property.to_owned(), errors.to_vec());
            }
        });

        Ok(Self {
            id: task.id,
            created: task.created,
            last_tracked: task.last_tracked,
            draft: TaskDraft { name: task.name },
            validator,
            tracker,
            hours_per_day: settings.hours_per_person_day,
            displayed_total,
            validation_summary,
        })
    }

    pub fn id(&self) -> &Arc<str> {
        &self.id
    }

    pub fn draft(&self) -> &TaskDraft {
        &self.draft
    }

    /// Changes the name and revalidates it. Returns whether the new name is valid.
    pub fn set_name(&mut self, name: impl Into<String>) -> bool {
        self.draft.name = name.into();
        self.validator.validate_property(&self.draft, NAME_PROPERTY)
    }

    pub fn validate(&mut self) -> bool {
        self.validator.validate_all(&self.draft)
    }

    pub fn is_valid(&self) -> bool {
        !self.validator.has_errors()
    }

    pub fn errors(&self, property: &str) -> &[String] {
        self.validator.errors(property)
    }

    /// Every current error prefixed by the property it belongs to.
    pub fn validation_summary(&self) -> Vec<String> {
        self.validation_summary
            .borrow()
            .iter()
            .flat_map(|(property, errors)| {
                errors.iter().map(move |error| format!("{property}: {error}"))
            })
            .collect()
    }

    pub fn tracker(&self) -> &ElapsedTimeTracker {
        &self.tracker
    }

    /// Total as last reported by the tracker.
    pub fn displayed_total(&self) -> ElapsedTimeSnapshot {
        self.displayed_total
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn man_hours(&self) -> ManHours {
        let total = self.tracker.snapshot();
        ManHours::from_elapsed(total.hours, total.minutes, self.hours_per_day)
    }

    pub fn mark_tracked(&mut self, at: DateTime<Utc>) {
        self.last_tracked = Some(at);
    }

    /// Current state as a storable entity.
    pub fn to_entity(&self) -> TaskEntity {
        let total = self.tracker.snapshot();
        TaskEntity {
            id: self.id.clone(),
            name: self.draft.name.trim().to_owned(),
            hours: total.hours,
            minutes: total.minutes,
            created: self.created,
            last_tracked: self.last_tracked,
        }
    }
}
