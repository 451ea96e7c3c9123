//! Tasks and everything needed to edit and persist them.
//!
//!  - [entities::TaskEntity] is what lands on disk, one JSON object per line.
//!  - [storage::TaskStorageImpl] owns the task file.
//!  - [editor::TaskEditor] wraps one task with its tracker and validation rules.
//!  - [recorder::TrackingRecorder] persists tracker changes while a task is being tracked.

pub mod editor;
pub mod entities;
pub mod recorder;
pub mod storage;
