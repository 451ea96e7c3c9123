use ansi_term::{Colour, Style};

use crate::{tasks::entities::TaskEntity, utils::man_hours::HoursPerDay};

/// One printable line of the task list.
#[derive(Debug, PartialEq, Eq)]
pub struct TaskRow {
    pub id: String,
    pub name: String,
    pub elapsed: String,
    pub man_hours: String,
}

impl TaskRow {
    pub fn new(task: &TaskEntity, hours_per_day: HoursPerDay) -> Self {
        Self {
            id: task.id.to_string(),
            name: task.name.clone(),
            elapsed: format!("{}h {}m", task.hours, task.minutes),
            man_hours: task.man_hours(hours_per_day).to_string(),
        }
    }
}

pub fn print_tasks(tasks: &[TaskEntity], hours_per_day: HoursPerDay) {
    if tasks.is_empty() {
        println!("No tasks yet. Add one with `worktally add <name>`");
        return;
    }

    let name_width = tasks
        .iter()
        .map(|task| task.name.chars().count())
        .max()
        .unwrap_or(0);

    for task in tasks {
        let row = TaskRow::new(task, hours_per_day);
        println!(
            "{}\t{}\t{:>9}\t{} person-days",
            Colour::Cyan.paint(row.id),
            Style::new()
                .bold()
                .paint(format!("{:<name_width$}", row.name)),
            row.elapsed,
            row.man_hours
        );
    }
    let total_minutes: u64 = tasks
        .iter()
        .map(|task| task.hours as u64 * 60 + task.minutes as u64)
        .sum();
    println!(
        "Total {}h {}m at {} per person-day",
        total_minutes / 60,
        total_minutes % 60,
        hours_per_day
    );
}

pub fn print_task(task: &TaskEntity, hours_per_day: HoursPerDay) {
    let row = TaskRow::new(task, hours_per_day);
    println!(
        "{}\t{}\t{}\t{} person-days",
        Colour::Cyan.paint(row.id),
        Style::new().bold().paint(row.name),
        row.elapsed,
        row.man_hours
    );
}
