//! CLI command definitions for the `flowline` binary.
//!
//! Uses clap derive macros for argument parsing.

pub mod chain;
pub mod execution;
pub mod workflow;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use clap_complete::Shell;
use comfy_table::{Cell, Color};
use flowline_types::chain::ChainRunStatus;
use flowline_types::execution::{ExecutionStatus, StepLogStatus};
use flowline_types::value::StepValue;

/// Run declarative tool workflows and agent chains.
#[derive(Parser)]
#[command(name = "flowline", version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Output machine-readable JSON instead of styled text.
    #[arg(long, global = true)]
    pub json: bool,

    /// Suppress all output except errors.
    #[arg(long, global = true)]
    pub quiet: bool,

    /// Detailed output (-v for verbose, -vv for debug/trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Export tracing spans through OpenTelemetry (stdout exporter).
    #[arg(long, global = true, env = "FLOWLINE_OTEL")]
    pub otel: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Load and compile a workflow file without running it.
    Validate {
        /// Workflow file (.json, .yaml or .yml).
        file: PathBuf,
    },

    /// Run a workflow file.
    Run {
        /// Workflow file (.json, .yaml or .yml).
        file: PathBuf,

        /// Workflow inputs as inline JSON.
        #[arg(long, conflicts_with = "input_file")]
        input: Option<String>,

        /// Read workflow inputs from a JSON file.
        #[arg(long)]
        input_file: Option<PathBuf>,

        /// Override the configured step limit.
        #[arg(long)]
        max_steps: Option<u32>,

        /// Record the execution in memory only.
        #[arg(long)]
        ephemeral: bool,
    },

    /// List recorded executions, most recent first.
    #[command(alias = "ls")]
    Executions {
        /// Only executions of this workflow id.
        #[arg(long)]
        workflow: Option<String>,

        /// Maximum number of executions to display.
        #[arg(long, default_value = "20")]
        limit: u32,
    },

    /// Show an execution and its step logs.
    Show {
        /// Execution UUID.
        execution_id: String,
    },

    /// Run and inspect agent chains.
    Chain {
        #[command(subcommand)]
        action: chain::ChainCommand,
    },

    /// List the registered tools.
    Tools,

    /// Generate shell completions.
    Completions {
        /// Shell to generate completions for.
        shell: Shell,
    },
}

// ---------------------------------------------------------------------------
// Shared helpers
// ---------------------------------------------------------------------------

/// Parse inline JSON, or the contents of a JSON file, into a value.
/// Neither given means `null`.
pub fn read_input(inline: Option<&str>, file: Option<&Path>) -> Result<StepValue> {
    let raw = match (inline, file) {
        (Some(raw), _) => raw.to_string(),
        (None, Some(path)) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read input file {}", path.display()))?,
        (None, None) => return Ok(StepValue::Null),
    };
    let json: serde_json::Value = serde_json::from_str(&raw).context("Invalid JSON input")?;
    Ok(StepValue::from(json))
}

pub fn parse_uuid(raw: &str, what: &str) -> Result<uuid::Uuid> {
    raw.parse()
        .with_context(|| format!("Invalid {what}: '{raw}'"))
}

/// First 8 characters of an id, for tables.
pub fn short_id(id: &uuid::Uuid) -> String {
    id.to_string().chars().take(8).collect()
}

/// Compact one-line rendering of a value, cut at `max` characters.
pub fn preview(value: &StepValue, max: usize) -> String {
    let text = match value {
        StepValue::String(s) => s.clone(),
        other => other.to_json().to_string(),
    };
    if text.chars().count() > max {
        let cut: String = text.chars().take(max).collect();
        format!("{cut}...")
    } else {
        text
    }
}

pub fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub fn execution_status_cell(status: ExecutionStatus) -> Cell {
    match status {
        ExecutionStatus::Running => Cell::new("running").fg(Color::Blue),
        ExecutionStatus::Completed => Cell::new("completed").fg(Color::Green),
        ExecutionStatus::Failed => Cell::new("failed").fg(Color::Red),
        ExecutionStatus::Cancelled => Cell::new("cancelled").fg(Color::DarkYellow),
    }
}

pub fn step_status_cell(status: StepLogStatus) -> Cell {
    match status {
        StepLogStatus::Running => Cell::new("running").fg(Color::Blue),
        StepLogStatus::Completed => Cell::new("completed").fg(Color::Green),
        StepLogStatus::Failed => Cell::new("failed").fg(Color::Red),
    }
}

pub fn chain_status_cell(status: ChainRunStatus) -> Cell {
    match status {
        ChainRunStatus::Running => Cell::new("running").fg(Color::Blue),
        ChainRunStatus::Completed => Cell::new("completed").fg(Color::Green),
        ChainRunStatus::Failed => Cell::new("failed").fg(Color::Red),
        ChainRunStatus::Cancelled => Cell::new("cancelled").fg(Color::DarkYellow),
    }
}
