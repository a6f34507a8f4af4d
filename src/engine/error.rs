// ABOUTME: Error types for pipeline execution
// ABOUTME: Wraps pre-flight validation and parse failures and reports task failures by label

use thiserror::Error;

use crate::parser::{ParserError, ValidationError};

#[derive(Error, Debug)]
pub enum ExecutionError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Parser error: {0}")]
    Parser(#[from] ParserError),

    #[error("Task '{task}' failed: {message}")]
    TaskFailed { task: String, message: String },

    #[error("Task not found: {task}")]
    TaskNotFound { task: String },

    #[error("Scheduler error: {0}")]
    Scheduler(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ExecutionError {
    /// Whether the error was raised before any task ran.
    pub fn is_preflight(&self) -> bool {
        matches!(self, ExecutionError::Validation(_) | ExecutionError::Parser(_))
    }
}

pub type Result<T> = std::result::Result<T, ExecutionError>;
