// ABOUTME: Task execution result types and pipeline run result aggregation
// ABOUTME: Defines per-task outcomes, the run summary, and conversion of failed runs into errors

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::dataset::Dataset;
use super::error::{ExecutionError, Result};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Running,
    Success,
    Failed,
    Skipped,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskResult {
    pub task: String,
    pub class: String,
    pub status: TaskStatus,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub duration: Option<Duration>,
    pub inputs: usize,
    pub outputs: usize,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PipelineStatus {
    Running,
    Success,
    Failed,
}

/// The first task failure of a run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaskFailure {
    pub task: String,
    pub error: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineSummary {
    pub total_tasks: usize,
    pub successful_tasks: usize,
    pub failed_tasks: usize,
    pub skipped_tasks: usize,
    pub datasets_produced: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineResult {
    pub pipeline: String,
    pub instrument: Option<String>,
    pub run_id: String,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub duration: Option<Duration>,
    pub status: PipelineStatus,
    pub tasks: Vec<TaskResult>,
    pub datasets: Vec<Dataset>,
    pub failure: Option<TaskFailure>,
    pub summary: PipelineSummary,
}

fn elapsed_since(start: DateTime<Utc>) -> Duration {
    (Utc::now() - start).to_std().unwrap_or(Duration::ZERO)
}

impl TaskResult {
    pub fn new(task: impl Into<String>, class: impl Into<String>) -> Self {
        Self {
            task: task.into(),
            class: class.into(),
            status: TaskStatus::Pending,
            start_time: Utc::now(),
            end_time: None,
            duration: None,
            inputs: 0,
            outputs: 0,
            error: None,
        }
    }

    pub fn mark_started(&mut self) {
        self.status = TaskStatus::Running;
        self.start_time = Utc::now();
    }

    pub fn mark_completed(&mut self, status: TaskStatus, error: Option<String>) {
        self.status = status;
        self.end_time = Some(Utc::now());
        self.duration = Some(elapsed_since(self.start_time));
        self.error = error;
    }

    pub fn skipped(task: impl Into<String>, class: impl Into<String>, reason: String) -> Self {
        let mut result = Self::new(task, class);
        result.status = TaskStatus::Skipped;
        result.error = Some(reason);
        result
    }

    pub fn is_successful(&self) -> bool {
        self.status == TaskStatus::Success
    }

    pub fn is_failed(&self) -> bool {
        self.status == TaskStatus::Failed
    }

    pub fn is_finished(&self) -> bool {
        !matches!(self.status, TaskStatus::Pending | TaskStatus::Running)
    }
}

impl PipelineResult {
    pub fn new(pipeline: impl Into<String>, instrument: Option<String>, run_id: String) -> Self {
        Self {
            pipeline: pipeline.into(),
            instrument,
            run_id,
            start_time: Utc::now(),
            end_time: None,
            duration: None,
            status: PipelineStatus::Running,
            tasks: Vec::new(),
            datasets: Vec::new(),
            failure: None,
            summary: PipelineSummary::default(),
        }
    }

    pub fn add_task_result(&mut self, result: TaskResult) {
        if result.is_failed() && self.failure.is_none() {
            self.failure = Some(TaskFailure {
                task: result.task.clone(),
                error: result.error.clone().unwrap_or_default(),
            });
        }
        self.tasks.push(result);
        self.update_summary();
    }

    pub fn mark_completed(&mut self, datasets: Vec<Dataset>) {
        self.end_time = Some(Utc::now());
        self.duration = Some(elapsed_since(self.start_time));
        self.datasets = datasets;
        self.status = if self.failure.is_some() {
            PipelineStatus::Failed
        } else {
            PipelineStatus::Success
        };
        self.update_summary();
    }

    pub fn get_task_result(&self, task: &str) -> Option<&TaskResult> {
        self.tasks.iter().find(|t| t.task == task)
    }

    pub fn has_failures(&self) -> bool {
        self.failure.is_some()
    }

    /// Datasets produced under `dataset_type`.
    pub fn datasets_of(&self, dataset_type: &str) -> Vec<&Dataset> {
        self.datasets
            .iter()
            .filter(|dataset| dataset.dataset_type == dataset_type)
            .collect()
    }

    /// Turn a failed run into `ExecutionError::TaskFailed`.
    pub fn into_result(self) -> Result<Self> {
        if self.status == PipelineStatus::Failed {
            if let Some(failure) = &self.failure {
                return Err(ExecutionError::TaskFailed {
                    task: failure.task.clone(),
                    message: failure.error.clone(),
                });
            }
        }
        Ok(self)
    }

    fn update_summary(&mut self) {
        let count = |status: TaskStatus| self.tasks.iter().filter(|t| t.status == status).count();

        self.summary = PipelineSummary {
            total_tasks: self.tasks.len(),
            successful_tasks: count(TaskStatus::Success),
            failed_tasks: count(TaskStatus::Failed),
            skipped_tasks: count(TaskStatus::Skipped),
            datasets_produced: self.datasets.len(),
        };
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskStatus::Pending => write!(f, "pending"),
            TaskStatus::Running => write!(f, "running"),
            TaskStatus::Success => write!(f, "success"),
            TaskStatus::Failed => write!(f, "failed"),
            TaskStatus::Skipped => write!(f, "skipped"),
        }
    }
}

impl std::fmt::Display for PipelineStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PipelineStatus::Running => write!(f, "running"),
            PipelineStatus::Success => write!(f, "success"),
            PipelineStatus::Failed => write!(f, "failed"),
        }
    }
}
