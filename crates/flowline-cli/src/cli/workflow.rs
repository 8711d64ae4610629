//! Workflow commands: validate, run and tools.

use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use comfy_table::{presets, Cell, Color, ContentArrangement, Table};
use console::style;
use tokio_util::sync::CancellationToken;

use flowline_core::repository::{ExecutionRecorder, InMemoryExecutionRecorder};
use flowline_core::workflow::{load_workflow_file, ExecutionResult, WorkflowError};
use flowline_types::event::EngineEvent;
use flowline_types::execution::ExecutionStatus;
use flowline_types::value::StepValue;
use flowline_types::workflow::WorkflowDefinition;

use super::{preview, print_json, read_input};
use crate::state::AppState;

/// Load a workflow file with user-facing error messages.
pub fn load_definition(file: &Path) -> Result<WorkflowDefinition> {
    load_workflow_file(file).map_err(|e| match e {
        WorkflowError::ParseError(msg) => anyhow::anyhow!("Failed to parse workflow: {msg}"),
        WorkflowError::ValidationError(msg) => anyhow::anyhow!("Workflow validation failed: {msg}"),
        WorkflowError::IoError(err) => {
            anyhow::anyhow!("Failed to read {}: {err}", file.display())
        }
        other => anyhow::anyhow!("Invalid workflow: {other}"),
    })
}

// ---------------------------------------------------------------------------
// Validate
// ---------------------------------------------------------------------------

pub async fn handle_validate(file: &Path, state: &AppState, json: bool) -> Result<()> {
    let def = load_definition(file)?;
    let engine = state.engine(
        Arc::new(InMemoryExecutionRecorder::new()),
        state.config.engine.clone(),
    );
    let compiled = engine
        .compile(&def)
        .map_err(|e| anyhow::anyhow!("Workflow '{}' is invalid: {e}", def.name))?;

    let steps = compiled.steps().count();
    if json {
        print_json(&serde_json::json!({
            "valid": true,
            "name": def.name,
            "version": def.version,
            "start_step_id": compiled.start_step_id(),
            "steps": steps,
        }))?;
    } else {
        println!();
        println!(
            "  {} Workflow '{}' is valid",
            style("*").green().bold(),
            style(&def.name).cyan()
        );
        println!("  Version: {}", def.version);
        println!("  Steps: {steps}");
        println!("  Start: {}", compiled.start_step_id());
        println!();
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Run
// ---------------------------------------------------------------------------

pub struct RunOptions<'a> {
    pub input: Option<&'a str>,
    pub input_file: Option<&'a Path>,
    pub max_steps: Option<u32>,
    pub ephemeral: bool,
}

pub async fn handle_run(
    file: &Path,
    options: RunOptions<'_>,
    state: &AppState,
    json: bool,
    quiet: bool,
) -> Result<()> {
    let def = load_definition(file)?;
    let inputs = read_input(options.input, options.input_file)?;

    let mut engine_config = state.config.engine.clone();
    if let Some(max_steps) = options.max_steps {
        if max_steps == 0 {
            bail!("--max-steps must be at least 1");
        }
        engine_config.max_steps = max_steps;
    }

    let result = if options.ephemeral {
        let recorder = Arc::new(InMemoryExecutionRecorder::new());
        run_with(state, recorder, engine_config, &def, inputs, json || quiet).await?
    } else {
        let recorder = Arc::new(state.execution_recorder().await?);
        run_with(state, recorder, engine_config, &def, inputs, json || quiet).await?
    };

    if json {
        print_json(&result)?;
    } else if !quiet {
        display_result(&def, &result);
    }

    if result.status != ExecutionStatus::Completed {
        bail!(
            "Workflow '{}' {}",
            def.name,
            result
                .failure
                .as_ref()
                .map(|f| format!("failed: {}", f.describe()))
                .unwrap_or_else(|| result.status.as_str().to_string())
        );
    }
    Ok(())
}

/// Run `def` once on an engine over `recorder`. Ctrl+C cancels the run
/// between steps.
async fn run_with<R: ExecutionRecorder + 'static>(
    state: &AppState,
    recorder: Arc<R>,
    config: flowline_types::config::EngineConfig,
    def: &WorkflowDefinition,
    inputs: StepValue,
    silent: bool,
) -> Result<ExecutionResult> {
    let engine = state.engine(recorder, config);

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received, cancelling workflow");
            on_interrupt.cancel();
        }
    });

    let progress = (!silent).then(|| {
        let mut events = engine.subscribe();
        tokio::spawn(async move {
            while let Ok(event) = events.recv().await {
                print_progress(&event);
            }
        })
    });

    let result = engine
        .execute_with_cancel(def, inputs, cancel)
        .await
        .context("Workflow run aborted")?;

    interrupt.abort();
    if let Some(progress) = progress {
        progress.abort();
    }
    Ok(result)
}

fn print_progress(event: &EngineEvent) {
    match event {
        EngineEvent::StepCompleted {
            step_id,
            iterations,
            duration_ms,
            ..
        } => {
            let loops = if *iterations > 1 {
                format!(" x{iterations}")
            } else {
                String::new()
            };
            eprintln!(
                "  {} {step_id}{loops} {}",
                style("+").green(),
                style(format!("({duration_ms} ms)")).dim()
            );
        }
        EngineEvent::StepFailed { step_id, error, .. } => {
            eprintln!("  {} {step_id}: {}", style("x").red(), style(error).red());
        }
        _ => {}
    }
}

fn display_result(def: &WorkflowDefinition, result: &ExecutionResult) {
    println!();
    let (mark, verb) = match result.status {
        ExecutionStatus::Completed => (style("*").green().bold(), "completed"),
        ExecutionStatus::Cancelled => (style("!").yellow().bold(), "was cancelled"),
        _ => (style("x").red().bold(), "failed"),
    };
    println!("  {mark} Workflow '{}' {verb}", style(&def.name).cyan());
    println!("  Execution: {}", result.execution_id);
    println!("  Steps executed: {}", result.steps_executed);
    if let Some(step) = &result.last_completed_step {
        println!("  Last completed step: {step}");
    }
    if let Some(failure) = &result.failure {
        println!("  Error: {}", style(failure.describe()).red());
    }
    if result.status == ExecutionStatus::Completed {
        println!("  Outputs: {}", preview(&result.outputs, 200));
    }
    println!();
}

// ---------------------------------------------------------------------------
// Tools
// ---------------------------------------------------------------------------

pub fn handle_tools(state: &AppState, json: bool) -> Result<()> {
    let tools = state.tools.tools();

    if json {
        let out: Vec<_> = tools
            .iter()
            .map(|t| serde_json::json!({"name": t.name(), "description": t.description()}))
            .collect();
        return print_json(&out);
    }

    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![Cell::new("Tool").fg(Color::Cyan), Cell::new("Description")]);
    for tool in tools {
        table.add_row(vec![Cell::new(tool.name()), Cell::new(tool.description())]);
    }

    println!();
    println!("{table}");
    println!();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn load_definition_reports_unsupported_extension() {
        let mut file = tempfile::Builder::new().suffix(".txt").tempfile().unwrap();
        writeln!(file, "name: x").unwrap();
        let err = load_definition(file.path()).unwrap_err();
        assert!(err.to_string().contains("Failed to parse workflow"));
    }

    #[test]
    fn demo_workflows_compile_against_builtin_tools() {
        let registry =
            flowline_infra::tools::builtin_registry(&flowline_types::config::HttpSettings::default())
                .unwrap();
        let demos = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../demos");
        for name in ["status-check.yaml", "fan-out.json"] {
            let def = load_definition(&demos.join(name)).unwrap();
            flowline_core::workflow::compile(&def, &registry).unwrap();
        }
    }

    #[test]
    fn load_definition_reads_yaml() {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        write!(
            file,
            "name: hello\nsteps:\n  - id: greet\n    tool: echo\n    inputs:\n      text: hi\n"
        )
        .unwrap();
        let def = load_definition(file.path()).unwrap();
        assert_eq!(def.name, "hello");
        assert_eq!(def.start_step_id, "greet");
    }
}
