// ABOUTME: Error types for contract parsing and evaluation
// ABOUTME: Distinguishes syntax errors from unresolved paths and type mismatches

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ContractError {
    #[error("syntax error at offset {position}: {message}")]
    Syntax { position: usize, message: String },

    #[error("unknown task '{task}'")]
    UnknownTask { task: String },

    #[error("task '{task}' has no config field '{key}'")]
    UnknownKey { task: String, key: String },

    #[error("cannot apply '{op}' to {left} and {right}")]
    TypeMismatch {
        op: String,
        left: String,
        right: String,
    },
}

pub type Result<T> = std::result::Result<T, ContractError>;
