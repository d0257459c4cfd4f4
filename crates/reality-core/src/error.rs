//! Error types for Reality

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// The intent compiler could not produce a usable delta.
    #[error("compiler error: {0}")]
    Compiler(String),

    /// An operation had no input register carrying the payload it needs.
    #[error("missing input: {0}")]
    MissingInput(String),

    #[error("adapter error: {adapter} - {message}")]
    Adapter { adapter: String, message: String },

    #[error("unresolved reference: {0}")]
    UnresolvedReference(String),

    #[error("schedule index {index} out of range (len {len})")]
    ScheduleIndex { index: usize, len: usize },

    #[error("persistence error: {0}")]
    Persistence(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn compiler(message: impl Into<String>) -> Self {
        Self::Compiler(message.into())
    }

    pub fn missing_input(message: impl Into<String>) -> Self {
        Self::MissingInput(message.into())
    }

    pub fn adapter(adapter: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Adapter {
            adapter: adapter.into(),
            message: message.into(),
        }
    }

    /// True for failures that stay local to one operation.
    pub fn is_operation_local(&self) -> bool {
        matches!(
            self,
            Self::MissingInput(_) | Self::Adapter { .. } | Self::UnresolvedReference(_)
        )
    }
}
