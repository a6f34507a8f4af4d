// ABOUTME: Error types for output handling operations
// ABOUTME: Covers unknown formats and destinations, bad destination settings, and failed writes

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum OutputError {
    #[error("Unknown output format '{format}'")]
    FormatterNotFound { format: String },

    #[error("Unknown output destination '{writer_type}'")]
    WriterNotFound { writer_type: String },

    #[error("Could not write {}: {source}", .path.display())]
    WriteError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid '{writer_type}' destination settings: {message}")]
    InvalidDestination { writer_type: String, message: String },

    #[error("JSON serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("YAML serialization error: {0}")]
    YamlSerializationError(#[from] serde_yaml::Error),
}

pub type Result<T> = std::result::Result<T, OutputError>;
