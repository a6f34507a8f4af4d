// ABOUTME: Command line argument definitions and parsing using Clap
// ABOUTME: Defines the main CLI structure and subcommands for calpipe

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::engine::TaskSelection;

#[derive(Parser)]
#[command(name = "calpipe")]
#[command(about = "Load, validate, and run declarative calibration pipelines")]
#[command(version)]
pub struct Args {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(short, long, global = true, help = "Enable verbose output")]
    pub verbose: bool,

    #[arg(short, long, global = true, help = "Path to configuration file")]
    pub config: Option<PathBuf>,

    #[arg(long, global = true, help = "Disable colored output")]
    pub no_color: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Format {
    Json,
    Yaml,
    Text,
}

impl Format {
    pub fn as_str(&self) -> &'static str {
        match self {
            Format::Json => "json",
            Format::Yaml => "yaml",
            Format::Text => "text",
        }
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run a pipeline document
    Run {
        #[arg(help = "Path to pipeline YAML file")]
        pipeline: PathBuf,

        #[arg(short, long = "external", help = "Dataset type supplied from outside the pipeline")]
        externals: Vec<String>,

        #[arg(long, help = "Stand-in exposures per external input type")]
        exposures: Option<usize>,

        #[arg(long, conflicts_with = "tasks", help = "Run only the named subset")]
        subset: Option<String>,

        #[arg(short, long = "task", help = "Run only the given task label")]
        tasks: Vec<String>,

        #[arg(long, help = "Dry run - pre-flight checks without executing")]
        dry_run: bool,

        #[arg(short, long, help = "Write the run result to this file")]
        output: Option<PathBuf>,

        #[arg(short, long, value_enum, default_value = "text", help = "Result format")]
        format: Format,

        #[arg(long, help = "Maximum number of concurrent tasks")]
        max_concurrent: Option<usize>,
    },

    /// Validate a pipeline document without running it
    Validate {
        #[arg(help = "Path to pipeline YAML file")]
        pipeline: PathBuf,

        #[arg(short, long = "external", help = "Dataset type supplied from outside the pipeline")]
        externals: Vec<String>,

        #[arg(short, long, value_enum, default_value = "text", help = "Report format")]
        format: Format,
    },

    /// Print the merged document or its resolved configuration
    Show {
        #[arg(help = "Path to pipeline YAML file")]
        pipeline: PathBuf,

        #[arg(long, help = "Show every task's resolved configuration and connections")]
        resolved: bool,

        #[arg(
            short,
            long,
            value_enum,
            default_value = "yaml",
            help = "Output format (text requires --resolved)"
        )]
        format: Format,
    },

    /// Print execution batches and dataset flows
    Graph {
        #[arg(help = "Path to pipeline YAML file")]
        pipeline: PathBuf,

        #[arg(long, help = "Emit Graphviz DOT")]
        dot: bool,

        #[arg(short, long = "external", help = "Dataset type supplied from outside the pipeline")]
        externals: Vec<String>,
    },

    /// List registered task classes
    Tasks,

    /// Write a new fringe pipeline document
    Init {
        #[arg(help = "Name of the pipeline to create")]
        name: String,

        #[arg(short, long, help = "Output directory", default_value = ".")]
        output_dir: PathBuf,
    },
}

impl Args {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Turn `--subset` / `--task` into a task selection
    pub fn selection(subset: Option<String>, tasks: Vec<String>) -> TaskSelection {
        match subset {
            Some(name) => TaskSelection::Subset(name),
            None if tasks.is_empty() => TaskSelection::All,
            None => TaskSelection::Labels(tasks),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_run_command() {
        let args = Args::try_parse_from([
            "calpipe",
            "run",
            "cpFringe.yaml",
            "--external",
            "raw",
            "-e",
            "cpFringeIsr",
            "--task",
            "cpFringe",
            "--format",
            "json",
            "-v",
        ])
        .unwrap();

        assert!(args.verbose);
        match args.command {
            Commands::Run {
                pipeline,
                externals,
                tasks,
                format,
                dry_run,
                ..
            } => {
                assert_eq!(pipeline, PathBuf::from("cpFringe.yaml"));
                assert_eq!(externals, vec!["raw", "cpFringeIsr"]);
                assert_eq!(tasks, vec!["cpFringe"]);
                assert_eq!(format, Format::Json);
                assert!(!dry_run);
            }
            _ => panic!("expected run command"),
        }
    }

    #[test]
    fn test_subset_conflicts_with_tasks() {
        let result = Args::try_parse_from([
            "calpipe", "run", "p.yaml", "--subset", "s", "--task", "isr",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_selection() {
        assert_eq!(Args::selection(None, Vec::new()), TaskSelection::All);
        assert_eq!(
            Args::selection(Some("processing".into()), Vec::new()),
            TaskSelection::Subset("processing".into())
        );
        assert_eq!(
            Args::selection(None, vec!["isr".into()]),
            TaskSelection::Labels(vec!["isr".into()])
        );
    }
}
