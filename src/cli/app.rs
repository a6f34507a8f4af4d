// ABOUTME: Main application orchestration for the calpipe CLI
// ABOUTME: Coordinates between CLI arguments, configuration, logging, and command execution

use anyhow::Result;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use super::commands::{self, RunRequest};
use super::{Args, Commands, Config};

pub struct App {
    config: Config,
}

impl App {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Initialize logging based on configuration
    pub fn init_logging(&self, verbose: bool, no_color: bool) -> Result<()> {
        let log_level = if verbose {
            "debug"
        } else {
            &self.config.logging.level
        };

        let env_filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

        // Logs go to stderr; stdout carries results
        match self.config.logging.format.as_str() {
            "compact" => {
                tracing_subscriber::fmt()
                    .compact()
                    .with_env_filter(env_filter)
                    .with_ansi(!no_color)
                    .with_target(false)
                    .with_writer(std::io::stderr)
                    .try_init()
                    .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;
            }
            _ => {
                tracing_subscriber::fmt()
                    .with_env_filter(env_filter)
                    .with_ansi(!no_color)
                    .with_target(false)
                    .with_writer(std::io::stderr)
                    .try_init()
                    .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;
            }
        }

        debug!("Logging initialized with level: {}", log_level);
        Ok(())
    }

    /// Run the application with parsed arguments
    pub async fn run(&mut self, args: Args) -> Result<()> {
        self.init_logging(args.verbose, args.no_color)?;

        info!("Starting calpipe v{}", crate::VERSION);
        debug!("Configuration loaded from: {:?}", args.config);

        match args.command {
            Commands::Run {
                pipeline,
                externals,
                exposures,
                subset,
                tasks,
                dry_run,
                output,
                format,
                max_concurrent,
            } => {
                let request = RunRequest {
                    pipeline,
                    externals,
                    exposures,
                    selection: Args::selection(subset, tasks),
                    dry_run,
                    output,
                    format,
                    max_concurrent,
                };
                commands::run_pipeline(request, &self.config).await
            }

            Commands::Validate {
                pipeline,
                externals,
                format,
            } => commands::validate_pipeline(pipeline, externals, format, &self.config).await,

            Commands::Show {
                pipeline,
                resolved,
                format,
            } => commands::show_pipeline(pipeline, resolved, format).await,

            Commands::Graph {
                pipeline,
                dot,
                externals,
            } => commands::graph_pipeline(pipeline, dot, externals, &self.config).await,

            Commands::Tasks => commands::list_tasks().await,

            Commands::Init { name, output_dir } => commands::init_pipeline(name, output_dir).await,
        }
    }

    /// Load configuration named by the arguments and build the application
    pub fn from_args(args: &Args) -> Result<Self> {
        let config = Config::load(args.config.clone())?;
        Ok(Self::new(config))
    }
}
