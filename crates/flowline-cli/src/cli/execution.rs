//! Execution inspection commands: list and show.

use anyhow::{Context, Result};
use comfy_table::{presets, Cell, Color, ContentArrangement, Table};
use console::style;

use flowline_core::repository::ExecutionRecorder;
use flowline_types::execution::{StepLog, WorkflowExecution};

use super::{execution_status_cell, parse_uuid, preview, print_json, short_id, step_status_cell};

// ---------------------------------------------------------------------------
// List
// ---------------------------------------------------------------------------

pub async fn handle_list(
    workflow: Option<&str>,
    limit: u32,
    recorder: &impl ExecutionRecorder,
    json: bool,
) -> Result<()> {
    let workflow_id = workflow.map(|w| parse_uuid(w, "workflow ID")).transpose()?;
    let executions = recorder
        .list_executions(workflow_id.as_ref(), limit)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to list executions: {e}"))?;

    if json {
        return print_json(&executions);
    }

    if executions.is_empty() {
        println!();
        println!("  No executions recorded.");
        println!("  Start one with: {}", style("flowline run <file.yaml>").dim());
        println!();
        return Ok(());
    }

    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("Execution").fg(Color::Cyan),
            Cell::new("Workflow"),
            Cell::new("Version"),
            Cell::new("Status"),
            Cell::new("Step"),
            Cell::new("Started"),
            Cell::new("Completed"),
        ]);

    for e in &executions {
        let completed = e
            .completed_at
            .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| "-".to_string());
        table.add_row(vec![
            Cell::new(short_id(&e.id)),
            Cell::new(&e.workflow_name),
            Cell::new(&e.workflow_version),
            execution_status_cell(e.status),
            Cell::new(e.current_step_id.as_deref().unwrap_or("-")),
            Cell::new(e.started_at.format("%Y-%m-%d %H:%M").to_string()),
            Cell::new(completed),
        ]);
    }

    println!();
    println!("{table}");
    println!();
    Ok(())
}

// ---------------------------------------------------------------------------
// Show
// ---------------------------------------------------------------------------

pub async fn handle_show(
    execution_id: &str,
    recorder: &impl ExecutionRecorder,
    json: bool,
) -> Result<()> {
    let id = parse_uuid(execution_id, "execution ID")?;
    let execution = recorder
        .get_execution(&id)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to get execution: {e}"))?
        .with_context(|| format!("Execution '{execution_id}' not found"))?;
    let logs = recorder
        .list_step_logs(&id)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to list step logs: {e}"))?;

    if json {
        return print_json(&serde_json::json!({
            "execution": execution,
            "step_logs": logs,
        }));
    }

    display_execution(&execution);
    display_step_logs(&logs);
    Ok(())
}

fn display_execution(execution: &WorkflowExecution) {
    println!();
    println!(
        "  {} {}",
        style("Execution").bold(),
        style(execution.id).cyan()
    );
    println!(
        "  Workflow: {} (v{})",
        style(&execution.workflow_name).cyan(),
        execution.workflow_version
    );
    println!("  Status: {}", execution.status.as_str());
    if let Some(step) = &execution.current_step_id {
        println!("  Current step: {step}");
    }
    println!("  Started: {}", execution.started_at.format("%Y-%m-%d %H:%M:%S"));
    if let Some(completed) = execution.completed_at {
        println!("  Completed: {}", completed.format("%Y-%m-%d %H:%M:%S"));
    }
    println!("  Inputs: {}", preview(&execution.inputs, 120));
    if let Some(outputs) = &execution.outputs {
        println!("  Outputs: {}", preview(outputs, 120));
    }
    if let Some(err) = &execution.error {
        println!("  Error: {}", style(err).red());
    }
    println!();
}

fn display_step_logs(logs: &[StepLog]) {
    if logs.is_empty() {
        println!("  No step logs.");
        println!();
        return;
    }

    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("Step").fg(Color::Cyan),
            Cell::new("Tool"),
            Cell::new("Status"),
            Cell::new("Iterations"),
            Cell::new("Started"),
            Cell::new("Output / Error"),
        ]);

    for log in logs {
        let detail = match (&log.error, &log.output) {
            (Some(err), _) => err.chars().take(60).collect::<String>(),
            (None, Some(output)) => preview(output, 60),
            (None, None) => "-".to_string(),
        };
        table.add_row(vec![
            Cell::new(&log.step_id),
            Cell::new(&log.tool),
            step_status_cell(log.status),
            Cell::new(log.iterations),
            Cell::new(log.started_at.format("%H:%M:%S").to_string()),
            Cell::new(detail),
        ]);
    }

    println!("{table}");
    println!();
}
