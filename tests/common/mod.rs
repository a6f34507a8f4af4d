// ABOUTME: Common utilities and helpers for integration tests
// ABOUTME: Provides a pipeline document builder, temp environments, and the shipped fringe pipeline

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tokio::fs;

use calpipe::engine::{
    seed_datasets, ExternalDatasets, ResolvedPipeline, RunOptions, TaskSelection,
};
use calpipe::parser::PipelineDocument;
use calpipe::tasks::TaskRegistry;

pub const FRINGE_PIPELINE: &str = include_str!("../../pipelines/cpFringe.yaml");

pub fn fringe_document() -> PipelineDocument {
    PipelineDocument::from_yaml(FRINGE_PIPELINE).expect("shipped fringe pipeline parses")
}

/// The fringe pipeline with one line of its text replaced
pub fn fringe_document_with(from: &str, to: &str) -> PipelineDocument {
    assert!(FRINGE_PIPELINE.contains(from), "'{}' not in fringe pipeline", from);
    PipelineDocument::from_yaml(&FRINGE_PIPELINE.replace(from, to))
        .expect("edited fringe pipeline parses")
}

/// Run options with `raw` external and `exposures` stand-in inputs per external type
pub fn run_options(document: &PipelineDocument, exposures: usize) -> RunOptions {
    run_options_with(document, &["raw"], exposures)
}

pub fn run_options_with(
    document: &PipelineDocument,
    externals: &[&str],
    exposures: usize,
) -> RunOptions {
    selected_run_options(document, TaskSelection::All, externals, exposures)
}

/// Run options seeded for the selected tasks only
pub fn selected_run_options(
    document: &PipelineDocument,
    selection: TaskSelection,
    externals: &[&str],
    exposures: usize,
) -> RunOptions {
    let externals = ExternalDatasets::new(externals.iter().copied());
    let pipeline = ResolvedPipeline::resolve(document, &TaskRegistry::new())
        .and_then(|pipeline| pipeline.select(&selection))
        .expect("pipeline resolves");
    let inputs = seed_datasets(&pipeline, &externals, exposures);
    RunOptions::new(externals)
        .with_selection(selection)
        .with_inputs(inputs)
}

pub struct TestPipelineBuilder {
    description: String,
    instrument: Option<String>,
    inherits: Option<String>,
    tasks: Vec<TestTask>,
    contracts: Vec<String>,
}

pub struct TestTask {
    pub label: String,
    pub class: String,
    pub config: Vec<(String, String)>,
}

impl TestTask {
    pub fn new(label: &str, class: &str) -> Self {
        Self {
            label: label.to_string(),
            class: class.to_string(),
            config: Vec::new(),
        }
    }

    /// Add a config override; `value` is written as raw YAML
    pub fn with(mut self, key: &str, value: &str) -> Self {
        self.config.push((key.to_string(), value.to_string()));
        self
    }
}

impl TestPipelineBuilder {
    pub fn new(description: &str) -> Self {
        Self {
            description: description.to_string(),
            instrument: Some("lsst.obs.lsst.LsstCam".to_string()),
            inherits: None,
            tasks: Vec::new(),
            contracts: Vec::new(),
        }
    }

    pub fn without_instrument(mut self) -> Self {
        self.instrument = None;
        self
    }

    pub fn inherits(mut self, location: &str) -> Self {
        self.inherits = Some(location.to_string());
        self
    }

    pub fn with_task(mut self, task: TestTask) -> Self {
        self.tasks.push(task);
        self
    }

    pub fn add_isr(self, label: &str, output: &str) -> Self {
        self.with_task(
            TestTask::new(label, "lsst.ip.isr.IsrTask")
                .with("connections.outputExposure", output)
                .with("doFringe", "False"),
        )
    }

    pub fn add_fringe(self, label: &str, input: &str, output: &str) -> Self {
        self.with_task(
            TestTask::new(label, "lsst.cp.pipe.CpFringeTask")
                .with("connections.inputExp", input)
                .with("connections.outputExp", output),
        )
    }

    pub fn add_combine(self, label: &str, input: &str) -> Self {
        self.with_task(
            TestTask::new(label, "lsst.cp.pipe.CalibCombineTask")
                .with("connections.inputExps", input)
                .with("calibrationType", "fringe"),
        )
    }

    pub fn with_contract(mut self, contract: &str) -> Self {
        self.contracts.push(contract.to_string());
        self
    }

    pub fn build(&self) -> PipelineDocument {
        PipelineDocument::from_yaml(&self.generate_yaml()).expect("builder yaml parses")
    }

    pub async fn write_to_file(&self, path: &Path) -> std::io::Result<()> {
        fs::write(path, self.generate_yaml()).await
    }

    pub fn generate_yaml(&self) -> String {
        let mut yaml = format!("description: \"{}\"\n", self.description);

        if let Some(ref instrument) = self.instrument {
            yaml.push_str(&format!("instrument: {}\n", instrument));
        }
        if let Some(ref location) = self.inherits {
            yaml.push_str(&format!("inherits:\n  location: \"{}\"\n", location));
        }

        yaml.push_str("tasks:\n");
        for task in &self.tasks {
            yaml.push_str(&format!("  {}:\n", task.label));
            yaml.push_str(&format!("    class: {}\n", task.class));
            if !task.config.is_empty() {
                yaml.push_str("    config:\n");
                for (key, value) in &task.config {
                    yaml.push_str(&format!("      {}: {}\n", key, value));
                }
            }
        }

        if !self.contracts.is_empty() {
            yaml.push_str("contracts:\n");
            for contract in &self.contracts {
                yaml.push_str(&format!("  - '{}'\n", contract.replace('\'', "''")));
            }
        }

        yaml
    }
}

pub struct TestEnvironment {
    pub temp_dir: TempDir,
}

impl TestEnvironment {
    pub fn new() -> Self {
        Self {
            temp_dir: TempDir::new().expect("Failed to create temp directory"),
        }
    }

    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    pub fn pipeline_file(&self, name: &str) -> PathBuf {
        self.path().join(format!("{}.yaml", name))
    }

    pub fn output_file(&self, name: &str) -> PathBuf {
        self.path().join(format!("{}_output.json", name))
    }

    pub async fn create_pipeline_file(&self, name: &str, builder: &TestPipelineBuilder) -> PathBuf {
        let pipeline_file = self.pipeline_file(name);
        builder
            .write_to_file(&pipeline_file)
            .await
            .expect("Failed to write pipeline file");
        pipeline_file
    }

    pub async fn write_raw(&self, name: &str, content: &str) -> PathBuf {
        let pipeline_file = self.pipeline_file(name);
        fs::write(&pipeline_file, content)
            .await
            .expect("Failed to write pipeline file");
        pipeline_file
    }
}

pub async fn read_json_output(
    file_path: &Path,
) -> Result<serde_json::Value, Box<dyn std::error::Error>> {
    let content = fs::read_to_string(file_path).await?;
    let json: serde_json::Value = serde_json::from_str(&content)?;
    Ok(json)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pipeline_builder() {
        let builder = TestPipelineBuilder::new("chain")
            .add_isr("isr", "cpFringeIsr")
            .add_fringe("cpFringe", "cpFringeIsr", "cpFringeProc")
            .with_contract("cpFringe.stats.stat == 'MEDIAN'");

        let yaml = builder.generate_yaml();
        assert!(yaml.contains("description: \"chain\""));
        assert!(yaml.contains("      connections.outputExposure: cpFringeIsr"));
        assert!(yaml.contains("  - 'cpFringe.stats.stat == ''MEDIAN'''"));

        let document = builder.build();
        assert_eq!(document.task_labels(), vec!["isr", "cpFringe"]);
        assert_eq!(
            document.contracts[0].expression(),
            "cpFringe.stats.stat == 'MEDIAN'"
        );
    }

    #[test]
    fn test_environment_setup() {
        let env = TestEnvironment::new();
        assert!(env.path().exists());
        assert!(env
            .pipeline_file("fringe")
            .to_string_lossy()
            .ends_with("fringe.yaml"));
    }
}
