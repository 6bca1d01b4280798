use std::path::PathBuf;

use crate::command::CommandError;

#[derive(Debug, thiserror::Error)]
pub enum LaunchError {
    #[error("missing value for {option}")]
    MissingValue { option: &'static str },

    #[error("invalid value for {option}: {value:?} ({reason})")]
    InvalidValue {
        option: &'static str,
        value: String,
        reason: String,
    },

    /// Carries the level as written, which may not fit any integer type.
    #[error("invalid -el {0} (expected 1, 2 or 3)")]
    InvalidExceptionLevel(String),

    #[error("prerequisites not met: {0}")]
    Prerequisites(String),

    #[error("failed to create image {}: {detail}", path.display())]
    Provision { path: PathBuf, detail: String },

    #[error(transparent)]
    Command(#[from] CommandError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type LaunchResult<T> = Result<T, LaunchError>;
