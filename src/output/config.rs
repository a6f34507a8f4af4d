// ABOUTME: Configuration types for output handling
// ABOUTME: Selects the output format, destinations, and which run details are included

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::error::OutputError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    #[serde(default = "default_format")]
    pub format: String,
    #[serde(default)]
    pub destinations: Vec<OutputDestination>,
    #[serde(default)]
    pub options: OutputOptions,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputDestination {
    pub writer_type: String,
    #[serde(default)]
    pub config: HashMap<String, serde_yaml::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputOptions {
    #[serde(default)]
    pub include_timestamps: bool,
    #[serde(default = "default_true")]
    pub include_duration: bool,
    #[serde(default = "default_true")]
    pub include_task_results: bool,
    /// List every produced dataset, not only the counts.
    #[serde(default)]
    pub include_datasets: bool,
    #[serde(default)]
    pub pretty_print: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileWriterConfig {
    pub path: String,
    #[serde(default = "default_true")]
    pub create_dirs: bool,
    #[serde(default)]
    pub append: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StdoutWriterConfig {
    #[serde(default)]
    pub quiet: bool,
}

fn default_format() -> String {
    "json".to_string()
}

fn default_true() -> bool {
    true
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            format: default_format(),
            destinations: vec![OutputDestination::new_stdout()],
            options: OutputOptions::default(),
        }
    }
}

impl Default for OutputOptions {
    fn default() -> Self {
        Self {
            include_timestamps: false,
            include_duration: true,
            include_task_results: true,
            include_datasets: false,
            pretty_print: false,
        }
    }
}

impl OutputConfig {
    pub fn new(format: impl Into<String>) -> Self {
        Self {
            format: format.into(),
            ..Self::default()
        }
    }

    /// Write to `path` instead of stdout
    pub fn to_file(mut self, path: impl Into<String>) -> Self {
        self.destinations = vec![OutputDestination::new_file(path)];
        self
    }

    pub fn with_options(mut self, options: OutputOptions) -> Self {
        self.options = options;
        self
    }
}

impl OutputDestination {
    pub fn new_stdout() -> Self {
        Self {
            writer_type: "stdout".to_string(),
            config: HashMap::new(),
        }
    }

    pub fn new_file<S: Into<String>>(path: S) -> Self {
        let mut config = HashMap::new();
        config.insert("path".to_string(), serde_yaml::Value::String(path.into()));

        Self {
            writer_type: "file".to_string(),
            config,
        }
    }

    pub fn get_config<T>(&self) -> Result<T, OutputError>
    where
        T: serde::de::DeserializeOwned,
    {
        let config_value = serde_yaml::Value::Mapping(
            self.config
                .iter()
                .map(|(k, v)| (serde_yaml::Value::String(k.clone()), v.clone()))
                .collect(),
        );

        serde_yaml::from_value(config_value).map_err(|e| OutputError::InvalidDestination {
            writer_type: self.writer_type.clone(),
            message: e.to_string(),
        })
    }
}

impl OutputOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn include_all(mut self) -> Self {
        self.include_timestamps = true;
        self.include_duration = true;
        self.include_task_results = true;
        self.include_datasets = true;
        self
    }

    pub fn pretty(mut self) -> Self {
        self.pretty_print = true;
        self
    }
}
