// ABOUTME: Command implementations for the calpipe CLI
// ABOUTME: Handles run, validate, show, graph, tasks, and init commands

use anyhow::{anyhow, Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

use super::args::Format;
use super::config::Config;
use crate::engine::{
    seed_datasets, ConnectionGraph, PipelineExecutor, ResolvedPipeline, RunOptions, TaskSelection,
};
use crate::output::{OutputConfig, OutputHandler};
use crate::parser::{PipelineDocument, PipelineParser, PipelineValidator};
use crate::tasks::TaskRegistry;

async fn load_document(path: &Path) -> Result<PipelineDocument> {
    PipelineParser::new()
        .load(path)
        .await
        .with_context(|| format!("Failed to load pipeline {}", path.display()))
}

fn output_config(format: Format, output: Option<PathBuf>) -> OutputConfig {
    let config = OutputConfig::new(format.as_str());
    match output {
        Some(path) => config.to_file(path.to_string_lossy()),
        None => config,
    }
}

pub struct RunRequest {
    pub pipeline: PathBuf,
    pub externals: Vec<String>,
    pub exposures: Option<usize>,
    pub selection: TaskSelection,
    pub dry_run: bool,
    pub output: Option<PathBuf>,
    pub format: Format,
    pub max_concurrent: Option<usize>,
}

/// Run a pipeline document
pub async fn run_pipeline(request: RunRequest, config: &Config) -> Result<()> {
    info!("Starting pipeline run: {}", request.pipeline.display());

    let document = load_document(&request.pipeline).await?;
    let registry = Arc::new(TaskRegistry::new());
    let max_concurrent = request.max_concurrent.unwrap_or(config.max_concurrent_tasks);
    let executor = PipelineExecutor::with_registry(registry, max_concurrent);

    let externals = config.externals_with(&request.externals);
    let options = RunOptions::new(externals.clone()).with_selection(request.selection);
    let preflight = executor
        .preflight(&document, &options)
        .map_err(|e| anyhow!("Pre-flight failed: {}", e))?;

    if request.dry_run {
        println!(
            "✓ Pipeline '{}' passed pre-flight checks",
            preflight.pipeline.description
        );
        for (index, batch) in preflight.plan.batches.iter().enumerate() {
            println!("  Batch {}: {}", index + 1, batch.join(", "));
        }
        println!("  Contracts: {}", preflight.contracts.len());
        return Ok(());
    }

    let exposures = request.exposures.unwrap_or(config.default_exposures);
    let inputs = seed_datasets(&preflight.pipeline, &externals, exposures);
    info!("Seeded {} external datasets", inputs.len());

    let result = executor
        .execute(&document, options.with_inputs(inputs))
        .await
        .map_err(|e| anyhow!("Pipeline run failed: {}", e))?;

    OutputHandler::new()
        .output_pipeline_result(&result, &output_config(request.format, request.output))
        .await?;

    result
        .into_result()
        .map_err(|e| anyhow!("Pipeline run failed: {}", e))?;

    info!("Pipeline run completed");
    Ok(())
}

/// Validate a pipeline document, reporting every problem found
pub async fn validate_pipeline(
    pipeline_path: PathBuf,
    externals: Vec<String>,
    format: Format,
    config: &Config,
) -> Result<()> {
    info!("Validating pipeline: {}", pipeline_path.display());

    let document = load_document(&pipeline_path).await?;
    let report = PipelineValidator::new(Arc::new(TaskRegistry::new()))
        .with_externals(config.externals_with(&externals))
        .validate(&document);

    OutputHandler::new()
        .output_validation_report(&report, &output_config(format, None))
        .await?;

    if report.is_valid {
        info!("Pipeline validation completed successfully");
        Ok(())
    } else {
        Err(anyhow!(
            "Pipeline validation failed with {} error(s)",
            report.errors.len()
        ))
    }
}

/// Print the merged document, or the resolved configuration of every task
pub async fn show_pipeline(pipeline_path: PathBuf, resolved: bool, format: Format) -> Result<()> {
    let document = load_document(&pipeline_path).await?;

    if resolved {
        let pipeline = ResolvedPipeline::resolve(&document, &TaskRegistry::new())
            .map_err(|e| anyhow!("Failed to resolve pipeline: {}", e))?;
        OutputHandler::new()
            .output_resolved_pipeline(&pipeline, &output_config(format, None))
            .await?;
        return Ok(());
    }

    let rendered = match format {
        Format::Json => serde_json::to_string_pretty(&document)?,
        Format::Yaml => document.to_yaml()?,
        Format::Text => {
            return Err(anyhow!(
                "Text format needs --resolved; use yaml or json for the document itself"
            ))
        }
    };
    println!("{}", rendered.trim_end());
    Ok(())
}

/// Print execution batches and dataset flows, or Graphviz DOT
pub async fn graph_pipeline(
    pipeline_path: PathBuf,
    dot: bool,
    externals: Vec<String>,
    config: &Config,
) -> Result<()> {
    let document = load_document(&pipeline_path).await?;
    let pipeline = ResolvedPipeline::resolve(&document, &TaskRegistry::new())
        .map_err(|e| anyhow!("Failed to resolve pipeline: {}", e))?;
    let graph = ConnectionGraph::build(&pipeline, &config.externals_with(&externals))
        .map_err(|e| anyhow!("Failed to wire pipeline: {}", e))?;

    if dot {
        println!("{}", graph.to_dot());
        return Ok(());
    }

    let plan = graph
        .create_execution_plan()
        .map_err(|e| anyhow!("Failed to plan pipeline: {}", e))?;

    println!("Pipeline: {}", pipeline.description);
    println!("Batches:");
    for (index, batch) in plan.batches.iter().enumerate() {
        println!("  {}: {}", index + 1, batch.join(", "));
    }
    println!("Dataset flows:");
    for flow in graph.flows() {
        println!(
            "  {} --{}--> {}.{}",
            flow.producer, flow.dataset_type, flow.consumer, flow.port
        );
    }
    println!("Roots: {}", graph.root_tasks().join(", "));
    println!("Leaves: {}", graph.leaf_tasks().join(", "));
    Ok(())
}

/// List registered task classes and their ports
pub async fn list_tasks() -> Result<()> {
    let registry = TaskRegistry::new();

    for implementation in registry.list_classes() {
        println!("{}", implementation.class_name());
        for alias in implementation.aliases() {
            println!("  alias: {}", alias);
        }
        for port in implementation.ports() {
            println!(
                "  {} {}: {}{}",
                port.kind,
                port.name,
                port.default_dataset_type,
                if port.multiple { "[]" } else { "" }
            );
        }
    }
    Ok(())
}

/// Write a fringe pipeline document named `name`
pub async fn init_pipeline(name: String, output_dir: PathBuf) -> Result<()> {
    info!("Initializing pipeline '{}' in {}", name, output_dir.display());

    if !output_dir.exists() {
        tokio::fs::create_dir_all(&output_dir).await?;
    }

    let pipeline_file = output_dir.join(format!("{}.yaml", name));
    if pipeline_file.exists() {
        return Err(anyhow!(
            "Pipeline file already exists: {}",
            pipeline_file.display()
        ));
    }

    tokio::fs::write(&pipeline_file, generate_pipeline_template(&name)).await?;
    println!("Created pipeline file: {}", pipeline_file.display());
    Ok(())
}

fn generate_pipeline_template(name: &str) -> String {
    format!(
        r#"description: {}
instrument: lsst.obs.lsst.LsstCam
tasks:
  isr:
    class: lsst.ip.isr.isrTask.IsrTask
    config:
      connections.outputExposure: cpFringeIsr
      doBias: true
      doDark: true
      doFlat: true
      doFringe: false
  cpFringe:
    class: lsst.cp.pipe.cpFringeTask.CpFringeTask
    config:
      connections.inputExp: cpFringeIsr
      connections.outputExp: cpFringeProc
  cpCombine:
    class: lsst.cp.pipe.cpCombine.CalibCombineTask
    config:
      connections.inputExps: cpFringeProc
      connections.outputData: fringe
      calibrationType: fringe
      exposureScaling: "None"
contracts:
  - isr.doFringe == False
  - cpCombine.calibrationType == 'fringe'
  - cpCombine.exposureScaling == 'None'
"#,
        name
    )
}
