// ABOUTME: Main library module for the calpipe pipeline engine
// ABOUTME: Exports all core modules and provides the public API

pub mod cli;
pub mod contract;
pub mod engine;
pub mod output;
pub mod parser;
pub mod tasks;

// Re-export commonly used types
pub use cli::{App, Args, Config};
pub use contract::{ContractValidator, Expr};
pub use engine::{
    ConnectionGraph, ExecutionPlan, ExternalDatasets, PipelineExecutor, PipelineResult,
    PipelineStatus, ResolvedPipeline, RunOptions, TaskSelection, TaskStatus,
};
pub use output::{OutputConfig, OutputHandler};
pub use parser::{PipelineDocument, PipelineParser, PipelineValidator, ValidationError};
pub use tasks::{TaskImplementation, TaskRegistry};

// Error handling
pub type Result<T> = anyhow::Result<T>;

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
