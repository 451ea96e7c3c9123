use thiserror::Error;

/// Errors raised by [ElapsedTimeTracker](super::ElapsedTimeTracker).
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TrackerError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(&'static str),
    #[error("Tracking needs a tokio runtime to run its tick loop")]
    NoRuntime,
}
