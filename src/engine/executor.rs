// ABOUTME: Pipeline executor orchestrating pre-flight checks and batch execution
// ABOUTME: Resolves, wires, and checks contracts before running tasks and propagating datasets

use std::sync::Arc;
use tokio::time::Instant;
use tracing::{error, info, instrument, warn};

use super::context::{ExecutionContext, TaskState};
use super::dataset::{Dataset, ExternalDatasets};
use super::error::{ExecutionError, Result};
use super::resolve::{ResolvedPipeline, ResolvedTask, TaskSelection};
use super::result::{PipelineResult, TaskResult, TaskStatus};
use super::scheduler::{ResourceStats, ScheduledTask, TaskScheduler};
use super::wiring::{ConnectionGraph, ExecutionPlan};
use crate::contract::ContractValidator;
use crate::parser::PipelineDocument;
use crate::tasks::{TaskInputs, TaskRegistry};

/// What to run and with which external data.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub externals: ExternalDatasets,
    pub selection: TaskSelection,
    /// Datasets available before any task runs.
    pub inputs: Vec<Dataset>,
}

impl RunOptions {
    pub fn new(externals: ExternalDatasets) -> Self {
        Self {
            externals,
            ..Self::default()
        }
    }

    pub fn with_selection(mut self, selection: TaskSelection) -> Self {
        self.selection = selection;
        self
    }

    pub fn with_inputs(mut self, inputs: Vec<Dataset>) -> Self {
        self.inputs = inputs;
        self
    }
}

/// Everything established before the first task runs.
#[derive(Debug)]
pub struct Preflight {
    /// Every task of the document, resolved.
    pub resolved: ResolvedPipeline,
    /// The selected tasks.
    pub pipeline: ResolvedPipeline,
    pub graph: ConnectionGraph,
    pub plan: ExecutionPlan,
    pub contracts: ContractValidator,
}

pub struct PipelineExecutor {
    scheduler: TaskScheduler,
    registry: Arc<TaskRegistry>,
}

impl PipelineExecutor {
    /// Create an executor with the built-in task classes
    pub fn new(max_concurrent: usize) -> Self {
        Self::with_registry(Arc::new(TaskRegistry::new()), max_concurrent)
    }

    pub fn with_registry(registry: Arc<TaskRegistry>, max_concurrent: usize) -> Self {
        Self {
            scheduler: TaskScheduler::new(max_concurrent),
            registry,
        }
    }

    pub fn registry(&self) -> &TaskRegistry {
        &self.registry
    }

    /// Resolve, select, wire, plan, and check contracts. No task runs.
    #[instrument(skip_all, fields(pipeline = %document.description))]
    pub fn preflight(&self, document: &PipelineDocument, options: &RunOptions) -> Result<Preflight> {
        let resolved = ResolvedPipeline::resolve(document, &self.registry)?;
        let pipeline = resolved.select(&options.selection)?;

        let graph = ConnectionGraph::build(&pipeline, &options.externals)?;
        let plan = graph.create_execution_plan()?;

        // Contracts see every task, not only the selected ones
        let contracts = ContractValidator::from_entries(&resolved.contracts)?;
        contracts.check(&resolved.config_snapshot())?;

        info!(
            "Pre-flight passed: {} tasks in {} batches, {} contracts hold",
            plan.total_tasks,
            plan.execution_depth(),
            contracts.len()
        );

        Ok(Preflight {
            resolved,
            pipeline,
            graph,
            plan,
            contracts,
        })
    }

    /// Run a pipeline document. Pre-flight failures are returned as errors;
    /// task failures are recorded in the returned result.
    #[instrument(skip_all, fields(pipeline = %document.description))]
    pub async fn execute(
        &self,
        document: &PipelineDocument,
        options: RunOptions,
    ) -> Result<PipelineResult> {
        let start_time = Instant::now();
        let preflight = self.preflight(document, &options)?;
        let pipeline = &preflight.pipeline;
        let run_id = uuid::Uuid::new_v4().to_string();

        info!("Starting pipeline run: {} (run_id: {})", pipeline.description, run_id);

        let context = ExecutionContext::new(
            pipeline.description.clone(),
            pipeline.instrument.clone(),
            run_id.clone(),
        );
        context.store_datasets(options.inputs).await;
        for label in pipeline.tasks.keys() {
            context.set_task_state(TaskState::new(label.clone())).await;
        }

        let mut run = PipelineResult::new(
            pipeline.description.clone(),
            pipeline.instrument.clone(),
            run_id,
        );

        let batch_count = preflight.plan.batches.len();
        for (batch_number, batch) in preflight.plan.batches.iter().enumerate() {
            if run.has_failures() {
                break;
            }

            info!(
                "Executing batch {}/{} with {} tasks: {:?}",
                batch_number + 1,
                batch_count,
                batch.len(),
                batch
            );

            let scheduled = batch
                .iter()
                .map(|label| {
                    pipeline
                        .get(label)
                        .map(|task| ScheduledTask {
                            label: label.clone(),
                            class: task.class.clone(),
                        })
                        .ok_or_else(|| ExecutionError::TaskNotFound {
                            task: label.clone(),
                        })
                })
                .collect::<Result<Vec<_>>>()?;

            let results = self
                .scheduler
                .execute_batch(scheduled, |task| {
                    let context = context.for_task(&task.label);
                    async move {
                        match pipeline.get(&task.label) {
                            Some(resolved) => Self::execute_single_task(resolved, context).await,
                            None => {
                                let mut result = TaskResult::new(task.label, task.class);
                                result.mark_completed(
                                    TaskStatus::Failed,
                                    Some("task is not part of the pipeline".to_string()),
                                );
                                result
                            }
                        }
                    }
                })
                .await;

            for result in results {
                run.add_task_result(result);
            }
        }

        // Tasks never started because an earlier batch failed
        if let Some(failure) = run.failure.clone() {
            warn!("Stopping pipeline run: task '{}' failed", failure.task);
            for label in preflight.plan.tasks() {
                if run.get_task_result(label).is_some() {
                    continue;
                }
                let class = pipeline.get(label).map(|t| t.class.clone()).unwrap_or_default();
                let reason = format!("not run: task '{}' failed", failure.task);

                let mut state = TaskState::new(label.clone());
                state.mark_completed(TaskStatus::Skipped, Some(reason.clone()));
                context.set_task_state(state).await;

                run.add_task_result(TaskResult::skipped(label.clone(), class, reason));
            }
        }

        run.mark_completed(context.produced_datasets().await);

        info!(
            "Pipeline run completed in {:?} with status: {}",
            start_time.elapsed(),
            run.status
        );

        Ok(run)
    }

    /// Run one task: gather its inputs, call the implementation, store its outputs.
    async fn execute_single_task(task: &ResolvedTask, context: ExecutionContext) -> TaskResult {
        let mut state = TaskState::new(task.label.clone());
        state.mark_started();
        context.set_task_state(state.clone()).await;

        let mut result = TaskResult::new(task.label.clone(), task.class.clone());
        result.mark_started();

        info!("Executing task: {} ({})", task.label, task.class);

        let outcome = Self::run_task(task, &context, &mut result).await;

        match outcome {
            Ok(()) => {
                state.mark_completed(TaskStatus::Success, None);
                result.mark_completed(TaskStatus::Success, None);
                info!("Task {} completed successfully", task.label);
            }
            Err(e) => {
                let message = match e {
                    ExecutionError::TaskFailed { message, .. } => message,
                    other => other.to_string(),
                };
                error!("Task {} failed: {}", task.label, message);
                state.mark_completed(TaskStatus::Failed, Some(message.clone()));
                result.mark_completed(TaskStatus::Failed, Some(message));
            }
        }

        context.set_task_state(state).await;
        result
    }

    async fn run_task(
        task: &ResolvedTask,
        context: &ExecutionContext,
        result: &mut TaskResult,
    ) -> Result<()> {
        let failed = |message: String| ExecutionError::TaskFailed {
            task: task.label.clone(),
            message,
        };

        let mut inputs = TaskInputs::new();
        for port in task.inputs() {
            let datasets = context.get_datasets(&port.dataset_type).await;
            if datasets.is_empty() {
                return Err(failed(format!(
                    "missing input dataset '{}' for port '{}'",
                    port.dataset_type, port.name
                )));
            }
            if !port.multiple && datasets.len() > 1 {
                return Err(failed(format!(
                    "port '{}' takes one '{}' dataset but {} are available",
                    port.name,
                    port.dataset_type,
                    datasets.len()
                )));
            }
            result.inputs += datasets.len();
            inputs.insert(port.name.clone(), datasets);
        }

        let outputs = task
            .implementation
            .run(&task.label, &task.config, inputs, context)
            .await?;

        let mut produced = Vec::new();
        for (port_name, datasets) in outputs {
            let port = task
                .outputs()
                .find(|port| port.name == port_name)
                .ok_or_else(|| failed(format!("produced output on undeclared port '{}'", port_name)))?;
            if !port.multiple && datasets.len() > 1 {
                return Err(failed(format!(
                    "port '{}' declares a single dataset but {} were produced",
                    port.name,
                    datasets.len()
                )));
            }
            produced.extend(
                datasets
                    .into_iter()
                    .map(|dataset| dataset.rebind(&port.dataset_type, &task.label)),
            );
        }

        result.outputs = produced.len();
        context.store_datasets(produced).await;
        Ok(())
    }

    pub fn get_stats(&self) -> ResourceStats {
        self.scheduler.get_resource_stats()
    }
}

impl Default for PipelineExecutor {
    fn default() -> Self {
        Self::new(4)
    }
}
