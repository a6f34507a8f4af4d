// ABOUTME: Configuration management for the calpipe application
// ABOUTME: Loads settings from a YAML file and applies environment variable overrides

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::engine::ExternalDatasets;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub max_concurrent_tasks: usize,

    /// Dataset types supplied from outside every pipeline.
    pub external_datasets: Vec<String>,

    /// Stand-in exposures created per external input type for a run.
    pub default_exposures: usize,

    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_concurrent_tasks: 4,
            external_datasets: vec!["raw".to_string()],
            default_exposures: 3,
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from file path or default locations
    pub fn load(path: Option<PathBuf>) -> Result<Self> {
        let config_path = match path {
            Some(p) => p,
            None => Self::find_config_file(),
        };

        let mut config = if config_path.exists() {
            let contents = std::fs::read_to_string(&config_path)
                .with_context(|| format!("Failed to read config {}", config_path.display()))?;
            serde_yaml::from_str(&contents)
                .with_context(|| format!("Invalid config {}", config_path.display()))?
        } else {
            Config::default()
        };

        config.merge_env()?;
        Ok(config)
    }

    /// Find configuration file in standard locations
    fn find_config_file() -> PathBuf {
        let possible_paths = [
            PathBuf::from("calpipe.yaml"),
            PathBuf::from("calpipe.yml"),
            PathBuf::from(".calpipe.yaml"),
            PathBuf::from(".calpipe.yml"),
        ];

        for path in possible_paths {
            if path.exists() {
                return path;
            }
        }

        if let Some(home_dir) = dirs::home_dir() {
            let home_config = home_dir.join(".calpipe").join("config.yaml");
            if home_config.exists() {
                return home_config;
            }
        }

        // Default path (may not exist)
        PathBuf::from("calpipe.yaml")
    }

    fn merge_env(&mut self) -> Result<()> {
        self.merge_vars(|name| std::env::var(name).ok())
    }

    /// Apply `CALPIPE_*` overrides read through `lookup`
    pub fn merge_vars<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(level) = lookup("CALPIPE_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(format) = lookup("CALPIPE_LOG_FORMAT") {
            self.logging.format = format;
        }
        if let Some(max_tasks) = lookup("CALPIPE_MAX_CONCURRENT") {
            self.max_concurrent_tasks = max_tasks
                .parse()
                .with_context(|| format!("CALPIPE_MAX_CONCURRENT is not a number: {}", max_tasks))?;
        }
        if let Some(externals) = lookup("CALPIPE_EXTERNAL_DATASETS") {
            self.external_datasets = externals
                .split(',')
                .map(str::trim)
                .filter(|name| !name.is_empty())
                .map(str::to_string)
                .collect();
        }
        Ok(())
    }

    /// Configured external types plus any given on the command line
    pub fn externals_with(&self, extra: &[String]) -> ExternalDatasets {
        self.external_datasets
            .iter()
            .chain(extra)
            .cloned()
            .collect()
    }
}
