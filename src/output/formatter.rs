// ABOUTME: Output formatters for different result formats (JSON, YAML, text)
// ABOUTME: Renders pipeline runs, validation reports, and resolved pipelines

use async_trait::async_trait;
use serde_json::{self, json, Value as JsonValue};

use super::config::{OutputConfig, OutputOptions};
use super::error::{OutputError, Result};
use crate::contract::ContractStatus;
use crate::engine::{PipelineResult, ResolvedPipeline, TaskResult, TaskStatus};
use crate::parser::ValidationReport;
use crate::tasks::PortKind;

#[async_trait]
pub trait OutputFormatter: Send + Sync {
    async fn format_pipeline_result(
        &self,
        result: &PipelineResult,
        config: &OutputConfig,
    ) -> Result<String>;

    async fn format_validation_report(
        &self,
        report: &ValidationReport,
        config: &OutputConfig,
    ) -> Result<String>;

    async fn format_resolved_pipeline(
        &self,
        pipeline: &ResolvedPipeline,
        config: &OutputConfig,
    ) -> Result<String>;
}

pub struct JsonFormatter {
    pretty: bool,
}

pub struct YamlFormatter;

pub struct TextFormatter;

impl Default for JsonFormatter {
    fn default() -> Self {
        Self::new()
    }
}

impl JsonFormatter {
    pub fn new() -> Self {
        Self { pretty: false }
    }

    pub fn new_pretty() -> Self {
        Self { pretty: true }
    }

    fn render(&self, value: &JsonValue, options: &OutputOptions) -> Result<String> {
        if self.pretty || options.pretty_print {
            serde_json::to_string_pretty(value).map_err(OutputError::SerializationError)
        } else {
            serde_json::to_string(value).map_err(OutputError::SerializationError)
        }
    }
}

#[async_trait]
impl OutputFormatter for JsonFormatter {
    async fn format_pipeline_result(
        &self,
        result: &PipelineResult,
        config: &OutputConfig,
    ) -> Result<String> {
        let value = prepare_pipeline_output(result, &config.options)?;
        self.render(&value, &config.options)
    }

    async fn format_validation_report(
        &self,
        report: &ValidationReport,
        config: &OutputConfig,
    ) -> Result<String> {
        self.render(&serde_json::to_value(report)?, &config.options)
    }

    async fn format_resolved_pipeline(
        &self,
        pipeline: &ResolvedPipeline,
        config: &OutputConfig,
    ) -> Result<String> {
        self.render(&serde_json::to_value(pipeline)?, &config.options)
    }
}

fn prepare_pipeline_output(result: &PipelineResult, options: &OutputOptions) -> Result<JsonValue> {
    let mut output = serde_json::Map::new();

    output.insert("pipeline".to_string(), json!(result.pipeline));
    if let Some(ref instrument) = result.instrument {
        output.insert("instrument".to_string(), json!(instrument));
    }
    output.insert("run_id".to_string(), json!(result.run_id));
    output.insert("status".to_string(), json!(result.status.to_string()));

    if options.include_timestamps {
        output.insert(
            "start_time".to_string(),
            json!(result.start_time.to_rfc3339()),
        );
        if let Some(end_time) = result.end_time {
            output.insert("end_time".to_string(), json!(end_time.to_rfc3339()));
        }
    }

    if options.include_duration {
        if let Some(duration) = result.duration {
            output.insert(
                "duration_seconds".to_string(),
                json!(duration.as_secs_f64()),
            );
        }
    }

    output.insert(
        "summary".to_string(),
        serde_json::to_value(&result.summary)?,
    );

    if let Some(ref failure) = result.failure {
        output.insert("failure".to_string(), serde_json::to_value(failure)?);
    }

    if options.include_task_results {
        let tasks = result
            .tasks
            .iter()
            .map(|task| prepare_task_output(task, options))
            .collect();
        output.insert("tasks".to_string(), JsonValue::Array(tasks));
    }

    if options.include_datasets {
        output.insert(
            "datasets".to_string(),
            serde_json::to_value(&result.datasets)?,
        );
    }

    Ok(JsonValue::Object(output))
}

fn prepare_task_output(result: &TaskResult, options: &OutputOptions) -> JsonValue {
    let mut output = serde_json::Map::new();

    output.insert("task".to_string(), json!(result.task));
    output.insert("class".to_string(), json!(result.class));
    output.insert("status".to_string(), json!(result.status.to_string()));
    output.insert("inputs".to_string(), json!(result.inputs));
    output.insert("outputs".to_string(), json!(result.outputs));

    if options.include_timestamps {
        output.insert(
            "start_time".to_string(),
            json!(result.start_time.to_rfc3339()),
        );
        if let Some(end_time) = result.end_time {
            output.insert("end_time".to_string(), json!(end_time.to_rfc3339()));
        }
    }

    if options.include_duration {
        if let Some(duration) = result.duration {
            output.insert(
                "duration_seconds".to_string(),
                json!(duration.as_secs_f64()),
            );
        }
    }

    if let Some(ref error) = result.error {
        output.insert("error".to_string(), json!(error));
    }

    JsonValue::Object(output)
}

#[async_trait]
impl OutputFormatter for YamlFormatter {
    async fn format_pipeline_result(
        &self,
        result: &PipelineResult,
        config: &OutputConfig,
    ) -> Result<String> {
        let value = prepare_pipeline_output(result, &config.options)?;
        serde_yaml::to_string(&value).map_err(OutputError::YamlSerializationError)
    }

    async fn format_validation_report(
        &self,
        report: &ValidationReport,
        _config: &OutputConfig,
    ) -> Result<String> {
        serde_yaml::to_string(report).map_err(OutputError::YamlSerializationError)
    }

    async fn format_resolved_pipeline(
        &self,
        pipeline: &ResolvedPipeline,
        _config: &OutputConfig,
    ) -> Result<String> {
        serde_yaml::to_string(pipeline).map_err(OutputError::YamlSerializationError)
    }
}

impl Default for YamlFormatter {
    fn default() -> Self {
        Self::new()
    }
}

impl YamlFormatter {
    pub fn new() -> Self {
        Self
    }
}

fn status_icon(status: TaskStatus) -> &'static str {
    match status {
        TaskStatus::Success => "✓",
        TaskStatus::Failed => "✗",
        TaskStatus::Skipped => "⊘",
        TaskStatus::Pending => "⧖",
        TaskStatus::Running => "⟳",
    }
}

#[async_trait]
impl OutputFormatter for TextFormatter {
    async fn format_pipeline_result(
        &self,
        result: &PipelineResult,
        config: &OutputConfig,
    ) -> Result<String> {
        let mut output = String::new();

        output.push_str(&format!(
            "Pipeline: {} ({})\n",
            result.pipeline, result.run_id
        ));
        if let Some(ref instrument) = result.instrument {
            output.push_str(&format!("Instrument: {}\n", instrument));
        }
        output.push_str(&format!("Status: {}\n", result.status));

        if config.options.include_timestamps {
            output.push_str(&format!(
                "Started: {}\n",
                result.start_time.format("%Y-%m-%d %H:%M:%S UTC")
            ));
            if let Some(end_time) = result.end_time {
                output.push_str(&format!(
                    "Completed: {}\n",
                    end_time.format("%Y-%m-%d %H:%M:%S UTC")
                ));
            }
        }

        if config.options.include_duration {
            if let Some(duration) = result.duration {
                output.push_str(&format!("Duration: {:.2}s\n", duration.as_secs_f64()));
            }
        }

        output.push_str("\nSummary:\n");
        output.push_str(&format!("  Total tasks: {}\n", result.summary.total_tasks));
        output.push_str(&format!(
            "  Successful: {}\n",
            result.summary.successful_tasks
        ));
        output.push_str(&format!("  Failed: {}\n", result.summary.failed_tasks));
        output.push_str(&format!("  Skipped: {}\n", result.summary.skipped_tasks));
        output.push_str(&format!(
            "  Datasets produced: {}\n",
            result.summary.datasets_produced
        ));

        if config.options.include_task_results && !result.tasks.is_empty() {
            output.push_str("\nTasks:\n");
            for task in &result.tasks {
                output.push_str(&format!(
                    "  {} {} ({}) {} in, {} out",
                    status_icon(task.status),
                    task.task,
                    task.class,
                    task.inputs,
                    task.outputs
                ));
                if config.options.include_duration {
                    if let Some(duration) = task.duration {
                        output.push_str(&format!(" [{:.2}s]", duration.as_secs_f64()));
                    }
                }
                output.push('\n');
                if let Some(ref error) = task.error {
                    output.push_str(&format!("      Error: {}\n", error));
                }
            }
        }

        if config.options.include_datasets && !result.datasets.is_empty() {
            output.push_str("\nDatasets:\n");
            for dataset in &result.datasets {
                output.push_str(&format!("  {}", dataset));
                if let Some(ref producer) = dataset.produced_by {
                    output.push_str(&format!(" <- {}", producer));
                }
                output.push('\n');
            }
        }

        Ok(output)
    }

    async fn format_validation_report(
        &self,
        report: &ValidationReport,
        _config: &OutputConfig,
    ) -> Result<String> {
        let mut output = String::new();

        for error in &report.errors {
            output.push_str(&format!("✗ {}\n", error));
        }
        for warning in &report.warnings {
            output.push_str(&format!("⚠ {}\n", warning));
        }

        if !report.contracts.is_empty() {
            output.push_str("Contracts:\n");
            for contract in &report.contracts {
                let icon = match contract.status {
                    ContractStatus::Passed => "✓",
                    ContractStatus::Violated | ContractStatus::Error => "✗",
                };
                output.push_str(&format!("  {} {}", icon, contract.expression));
                let detail = match contract.error {
                    Some(ref error) => Some(error),
                    None if !contract.passed() => contract.message.as_ref(),
                    None => None,
                };
                if let Some(detail) = detail {
                    output.push_str(&format!(" ({})", detail));
                }
                output.push('\n');
            }
        }

        if report.is_valid {
            output.push_str("Pipeline is valid\n");
        } else {
            output.push_str(&format!(
                "Pipeline is invalid: {} error(s)\n",
                report.errors.len()
            ));
        }

        Ok(output)
    }

    async fn format_resolved_pipeline(
        &self,
        pipeline: &ResolvedPipeline,
        _config: &OutputConfig,
    ) -> Result<String> {
        let mut output = String::new();

        output.push_str(&format!("Pipeline: {}\n", pipeline.description));
        if let Some(ref instrument) = pipeline.instrument {
            output.push_str(&format!("Instrument: {}\n", instrument));
        }

        for task in pipeline.tasks.values() {
            output.push_str(&format!("\n{} ({})\n", task.label, task.class));
            for port in &task.ports {
                let arrow = match port.kind {
                    PortKind::Input => "<-",
                    PortKind::PrerequisiteInput => "<=",
                    PortKind::Output => "->",
                };
                output.push_str(&format!(
                    "  {} {} {}{}\n",
                    arrow,
                    port.name,
                    port.dataset_type,
                    if port.multiple { "[]" } else { "" }
                ));
            }
            let config = serde_yaml::to_string(&task.config)?;
            for line in config.lines() {
                output.push_str(&format!("    {}\n", line));
            }
        }

        if !pipeline.contracts.is_empty() {
            output.push_str("\nContracts:\n");
            for contract in &pipeline.contracts {
                output.push_str(&format!("  {}\n", contract.expression()));
            }
        }

        Ok(output)
    }
}

impl Default for TextFormatter {
    fn default() -> Self {
        Self::new()
    }
}

impl TextFormatter {
    pub fn new() -> Self {
        Self
    }
}
