use crate::CompareMode;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SimCompareError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Comparison failed for mode {mode}: {message}")]
    ModeExecution { mode: CompareMode, message: String },

    #[error("No compare object created")]
    NoCompare,

    #[error("File not in list of matches: {0}")]
    NotInMatches(String),

    #[error("Comparison cancelled")]
    Cancelled,

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl SimCompareError {
    pub fn mode_execution(mode: CompareMode, message: impl Into<String>) -> Self {
        Self::ModeExecution {
            mode,
            message: message.into(),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

pub type Result<T> = std::result::Result<T, SimCompareError>;
