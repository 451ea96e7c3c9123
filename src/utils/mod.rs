pub mod clock;
pub mod dir;
pub mod logging;
pub mod man_hours;
pub mod shutdown;
