//! Track elapsed work time against a list of tasks and express it in man-hours.
//!
//! The core is [tracker::ElapsedTimeTracker], which accrues time for one task, and
//! [validation::PropertyValidator], which keeps per-property rule errors for an edited object.
//! Both are owned by [tasks::editor::TaskEditor].

pub mod cli;
pub mod settings;
pub mod tasks;
pub mod tracker;
pub mod utils;
pub mod validation;
