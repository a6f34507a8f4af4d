// ABOUTME: Output writers for stdout and files
// ABOUTME: Writes formatted results to the configured destinations

use async_trait::async_trait;
use std::path::PathBuf;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use super::config::{FileWriterConfig, OutputDestination, StdoutWriterConfig};
use super::error::{OutputError, Result};

#[async_trait]
pub trait OutputWriter: Send + Sync {
    async fn write(&self, content: &str, destination: &OutputDestination) -> Result<()>;
}

pub struct StdoutWriter;

pub struct FileWriter;

impl Default for StdoutWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl StdoutWriter {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl OutputWriter for StdoutWriter {
    async fn write(&self, content: &str, destination: &OutputDestination) -> Result<()> {
        let config: StdoutWriterConfig = destination.get_config()?;

        if !config.quiet {
            println!("{}", content.trim_end());
        }

        debug!("Output written to stdout ({} chars)", content.len());
        Ok(())
    }
}

impl Default for FileWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl FileWriter {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl OutputWriter for FileWriter {
    async fn write(&self, content: &str, destination: &OutputDestination) -> Result<()> {
        let config: FileWriterConfig = destination.get_config()?;
        let path = PathBuf::from(&config.path);
        let failed = |source: std::io::Error| OutputError::WriteError {
            path: path.clone(),
            source,
        };

        if config.create_dirs {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent).await.map_err(failed)?;
            }
        }

        if config.append {
            // one record per line
            let mut file = fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .await
                .map_err(failed)?;
            file.write_all(content.trim_end().as_bytes())
                .await
                .map_err(failed)?;
            file.write_all(b"\n").await.map_err(failed)?;
        } else {
            fs::write(&path, content).await.map_err(failed)?;
        }

        info!("Wrote {} bytes to {}", content.len(), path.display());
        Ok(())
    }
}
