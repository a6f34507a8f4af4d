// ABOUTME: Output handler module for pipeline result formatting and persistence
// ABOUTME: Routes runs, validation reports, and resolved pipelines through a formatter to writers

pub mod config;
pub mod error;
pub mod formatter;
pub mod writer;

use std::collections::HashMap;

pub use self::config::{OutputConfig, OutputDestination, OutputOptions};
pub use self::error::{OutputError, Result};
use self::formatter::{JsonFormatter, OutputFormatter, TextFormatter, YamlFormatter};
use self::writer::{FileWriter, OutputWriter, StdoutWriter};
use crate::engine::{PipelineResult, ResolvedPipeline};
use crate::parser::ValidationReport;

pub struct OutputHandler {
    formatters: HashMap<String, Box<dyn OutputFormatter>>,
    writers: HashMap<String, Box<dyn OutputWriter>>,
}

impl OutputHandler {
    pub fn new() -> Self {
        let mut handler = Self {
            formatters: HashMap::new(),
            writers: HashMap::new(),
        };

        handler.register_formatter("json", Box::new(JsonFormatter::new()));
        handler.register_formatter("yaml", Box::new(YamlFormatter::new()));
        handler.register_formatter("text", Box::new(TextFormatter::new()));
        handler.register_formatter("pretty", Box::new(JsonFormatter::new_pretty()));

        handler.register_writer("stdout", Box::new(StdoutWriter::new()));
        handler.register_writer("file", Box::new(FileWriter::new()));

        handler
    }

    pub fn register_formatter(&mut self, name: &str, formatter: Box<dyn OutputFormatter>) {
        self.formatters.insert(name.to_string(), formatter);
    }

    pub fn register_writer(&mut self, name: &str, writer: Box<dyn OutputWriter>) {
        self.writers.insert(name.to_string(), writer);
    }

    fn formatter(&self, config: &OutputConfig) -> Result<&dyn OutputFormatter> {
        self.formatters
            .get(&config.format)
            .map(|formatter| formatter.as_ref())
            .ok_or_else(|| OutputError::FormatterNotFound {
                format: config.format.clone(),
            })
    }

    async fn write_all(&self, content: &str, config: &OutputConfig) -> Result<()> {
        for destination in &config.destinations {
            let writer = self.writers.get(&destination.writer_type).ok_or_else(|| {
                OutputError::WriterNotFound {
                    writer_type: destination.writer_type.clone(),
                }
            })?;
            writer.write(content, destination).await?;
        }
        Ok(())
    }

    pub async fn output_pipeline_result(
        &self,
        result: &PipelineResult,
        config: &OutputConfig,
    ) -> Result<()> {
        let formatted = self
            .formatter(config)?
            .format_pipeline_result(result, config)
            .await?;
        self.write_all(&formatted, config).await
    }

    pub async fn output_validation_report(
        &self,
        report: &ValidationReport,
        config: &OutputConfig,
    ) -> Result<()> {
        let formatted = self
            .formatter(config)?
            .format_validation_report(report, config)
            .await?;
        self.write_all(&formatted, config).await
    }

    pub async fn output_resolved_pipeline(
        &self,
        pipeline: &ResolvedPipeline,
        config: &OutputConfig,
    ) -> Result<()> {
        let formatted = self
            .formatter(config)?
            .format_resolved_pipeline(pipeline, config)
            .await?;
        self.write_all(&formatted, config).await
    }

    pub fn list_formatters(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.formatters.keys().map(|k| k.as_str()).collect();
        names.sort_unstable();
        names
    }

    pub fn list_writers(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.writers.keys().map(|k| k.as_str()).collect();
        names.sort_unstable();
        names
    }
}

impl Default for OutputHandler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_builtin_formatters_and_writers() {
        let handler = OutputHandler::new();
        assert_eq!(handler.list_formatters(), vec!["json", "pretty", "text", "yaml"]);
        assert_eq!(handler.list_writers(), vec!["file", "stdout"]);
    }

    #[tokio::test]
    async fn test_unknown_format_is_rejected() {
        let handler = OutputHandler::new();
        let result = PipelineResult::new("fringe", None, "run_1".to_string());
        let err = handler
            .output_pipeline_result(&result, &OutputConfig::new("xml"))
            .await
            .unwrap_err();
        assert!(matches!(err, OutputError::FormatterNotFound { format } if format == "xml"));
    }

    #[tokio::test]
    async fn test_writes_result_to_file() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("run.json");

        let mut result = PipelineResult::new("fringe", None, "run_1".to_string());
        result.mark_completed(Vec::new());

        let config = OutputConfig::new("json").to_file(path.to_string_lossy());
        OutputHandler::new()
            .output_pipeline_result(&result, &config)
            .await
            .unwrap();

        let written: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(written["status"], "success");
        assert_eq!(written["run_id"], "run_1");
    }
}
