// ABOUTME: Error types for pipeline document parsing and pre-flight validation
// ABOUTME: Defines parse failures and the wiring/contract/resolution errors raised before execution

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ParserError {
    #[error("Failed to read pipeline file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse YAML: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("Invalid pipeline format: {0}")]
    InvalidFormat(String),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Empty pipeline: no tasks defined")]
    EmptyPipeline,

    #[error("Cannot resolve inherited pipeline '{location}': {reason}")]
    Inheritance { location: String, reason: String },

    #[error("Inheritance cycle detected: {}", .chain.join(" -> "))]
    InheritanceCycle { chain: Vec<String> },
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("Task '{task}' names unknown task class '{class}'")]
    UnknownTask { task: String, class: String },

    #[error("Invalid configuration for task '{task}': {reason}")]
    InvalidTaskConfig { task: String, reason: String },

    #[error("Task '{task}' references unknown parameter '{parameter}'")]
    UnknownParameter { task: String, parameter: String },

    #[error("Input '{task}.{port}' needs dataset type '{dataset_type}', which no task produces and which is not external")]
    DanglingConnection {
        task: String,
        port: String,
        dataset_type: String,
    },

    #[error("Dataset type '{dataset_type}' is produced by both '{first}' and '{second}'")]
    DuplicateProducer {
        dataset_type: String,
        first: String,
        second: String,
    },

    #[error("Dependency cycle detected between tasks: {tasks:?}")]
    Cycle { tasks: Vec<String> },

    #[error("Contract violated: {expression}{}", describe_message(.message))]
    ContractViolation {
        expression: String,
        message: Option<String>,
    },

    #[error("Contract '{expression}' could not be evaluated: {reason}")]
    ContractEvaluation { expression: String, reason: String },

    #[error("Invalid contract '{expression}': {reason}")]
    InvalidContract { expression: String, reason: String },

    #[error("Unknown subset '{subset}'")]
    UnknownSubset { subset: String },

    #[error("Unknown task label '{task}'")]
    UnknownTaskLabel { task: String },
}

fn describe_message(message: &Option<String>) -> String {
    match message {
        Some(msg) => format!(" ({})", msg),
        None => String::new(),
    }
}

pub type Result<T> = std::result::Result<T, ParserError>;
