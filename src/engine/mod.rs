// ABOUTME: Pipeline execution engine for calpipe
// ABOUTME: Resolves tasks, wires dataset connections, schedules batches, and records run results

pub mod context;
pub mod dataset;
pub mod error;
pub mod executor;
pub mod resolve;
pub mod result;
pub mod scheduler;
pub mod wiring;

pub use context::{ExecutionContext, TaskState};
pub use dataset::{seed_datasets, Dataset, ExternalDatasets};
pub use error::{ExecutionError, Result};
pub use executor::{PipelineExecutor, Preflight, RunOptions};
pub use resolve::{BoundPort, ResolvedPipeline, ResolvedTask, TaskSelection};
pub use result::{
    PipelineResult, PipelineStatus, PipelineSummary, TaskFailure, TaskResult, TaskStatus,
};
pub use scheduler::{ResourceStats, TaskScheduler};
pub use wiring::{ConnectionGraph, DatasetFlow, ExecutionPlan};
