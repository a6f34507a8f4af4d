// ABOUTME: Execution context and shared run state
// ABOUTME: Holds task states and the dataset store behind an async RwLock shared across a batch

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use super::dataset::Dataset;
use super::result::TaskStatus;

#[derive(Debug, Clone)]
pub struct ExecutionContext {
    pub pipeline: String,
    pub instrument: Option<String>,
    pub run_id: String,
    pub task: Option<String>,
    pub start_time: DateTime<Utc>,
    pub shared_state: Arc<RwLock<SharedExecutionState>>,
}

#[derive(Debug, Clone, Default)]
pub struct SharedExecutionState {
    pub task_states: HashMap<String, TaskState>,
    /// Datasets available to the run, keyed by dataset type.
    pub datasets: IndexMap<String, Vec<Dataset>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskState {
    pub task: String,
    pub status: TaskStatus,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

impl ExecutionContext {
    pub fn new(
        pipeline: impl Into<String>,
        instrument: Option<String>,
        run_id: impl Into<String>,
    ) -> Self {
        Self {
            pipeline: pipeline.into(),
            instrument,
            run_id: run_id.into(),
            task: None,
            start_time: Utc::now(),
            shared_state: Arc::new(RwLock::new(SharedExecutionState::default())),
        }
    }

    pub fn for_task(&self, task: &str) -> Self {
        Self {
            pipeline: self.pipeline.clone(),
            instrument: self.instrument.clone(),
            run_id: self.run_id.clone(),
            task: Some(task.to_string()),
            start_time: Utc::now(),
            shared_state: Arc::clone(&self.shared_state),
        }
    }

    pub async fn get_task_state(&self, task: &str) -> Option<TaskState> {
        let state = self.shared_state.read().await;
        state.task_states.get(task).cloned()
    }

    pub async fn set_task_state(&self, state: TaskState) {
        let mut shared_state = self.shared_state.write().await;
        shared_state.task_states.insert(state.task.clone(), state);
    }

    /// Add datasets to the store under their own dataset type.
    pub async fn store_datasets(&self, datasets: Vec<Dataset>) {
        let mut shared_state = self.shared_state.write().await;
        for dataset in datasets {
            shared_state
                .datasets
                .entry(dataset.dataset_type.clone())
                .or_default()
                .push(dataset);
        }
    }

    pub async fn get_datasets(&self, dataset_type: &str) -> Vec<Dataset> {
        let state = self.shared_state.read().await;
        state.datasets.get(dataset_type).cloned().unwrap_or_default()
    }

    /// Datasets produced by a task in this run, in store order.
    pub async fn produced_datasets(&self) -> Vec<Dataset> {
        let state = self.shared_state.read().await;
        state
            .datasets
            .values()
            .flatten()
            .filter(|dataset| !dataset.is_external())
            .cloned()
            .collect()
    }
}

impl TaskState {
    pub fn new(task: impl Into<String>) -> Self {
        Self {
            task: task.into(),
            status: TaskStatus::Pending,
            start_time: None,
            end_time: None,
            last_error: None,
        }
    }

    pub fn mark_started(&mut self) {
        self.status = TaskStatus::Running;
        self.start_time = Some(Utc::now());
    }

    pub fn mark_completed(&mut self, status: TaskStatus, error: Option<String>) {
        self.status = status;
        self.end_time = Some(Utc::now());
        self.last_error = error;
    }

    pub fn is_finished(&self) -> bool {
        !matches!(self.status, TaskStatus::Pending | TaskStatus::Running)
    }
}
