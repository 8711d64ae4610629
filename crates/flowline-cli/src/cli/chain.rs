//! Agent chain commands.
//!
//! A chain file names its agents, and each agent is backed by a workflow
//! (inline, or a path relative to the chain file). Running an agent's task
//! runs its workflow with inputs `{input: <value>}` and returns the
//! workflow outputs.
//!
//! ```yaml
//! id: research
//! name: Research pipeline
//! start_agent_id: researcher
//! agents:
//!   researcher:
//!     name: Researcher
//!     workflow: researcher.yaml
//!     chain:
//!       next_agent_id: writer
//!       auto_trigger: true
//!       input_mapping: summary
//!   writer:
//!     workflow:
//!       name: write
//!       steps:
//!         - id: draft
//!           tool: echo
//!           inputMappings: [{from: inputs.input, to: notes}]
//! ```

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Subcommand;
use comfy_table::{presets, Cell, Color, ContentArrangement, Table};
use console::style;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use flowline_core::chain::{AgentError, AgentRunner, ChainCoordinator, OutputShaper};
use flowline_core::repository::{
    ChainRunRepository, ExecutionRecorder, InMemoryChainRunRepository, InMemoryExecutionRecorder,
};
use flowline_core::tool::ToolRegistry;
use flowline_core::workflow::submission::{parse_submission_json, parse_submission_yaml};
use flowline_core::workflow::{CompiledWorkflow, WorkflowEngine, WorkflowSubmission};
use flowline_infra::sqlite::{SqliteChainRunRepository, SqliteExecutionRecorder};
use flowline_types::chain::{ChainConfig, ChainDefinition, ChainRun, ChainRunStatus};
use flowline_types::config::ChainSettings;
use flowline_types::execution::ExecutionStatus;
use flowline_types::value::StepValue;

use super::{chain_status_cell, parse_uuid, preview, print_json, read_input, short_id};
use crate::state::AppState;

/// Characters kept by the `summary` input mode.
const SUMMARY_CHARS: usize = 500;

#[derive(Subcommand)]
pub enum ChainCommand {
    /// Run a chain file from its start agent.
    Run {
        /// Chain file (.json, .yaml or .yml).
        file: PathBuf,

        /// Initial input as inline JSON.
        #[arg(long, conflicts_with = "input_file")]
        input: Option<String>,

        /// Read the initial input from a JSON file.
        #[arg(long)]
        input_file: Option<PathBuf>,

        /// Keep the chain run and agent executions in memory only.
        #[arg(long)]
        ephemeral: bool,
    },

    /// Show a recorded chain run.
    Show {
        /// Chain run UUID.
        run_id: String,
    },

    /// List recent runs of a chain.
    List {
        /// Chain id.
        chain_id: String,

        /// Maximum number of runs to display.
        #[arg(long, default_value = "10")]
        limit: u32,
    },
}

pub async fn handle_chain_command(
    cmd: ChainCommand,
    state: &AppState,
    json: bool,
    quiet: bool,
) -> Result<()> {
    match cmd {
        ChainCommand::Run {
            file,
            input,
            input_file,
            ephemeral,
        } => {
            let input = read_input(input.as_deref(), input_file.as_deref())?;
            handle_run(&file, input, ephemeral, state, json, quiet).await
        }
        ChainCommand::Show { run_id } => {
            let repo = state.chain_repository().await?;
            handle_show(&run_id, &repo, json).await
        }
        ChainCommand::List { chain_id, limit } => {
            let repo = state.chain_repository().await?;
            handle_list(&chain_id, limit, &repo, json).await
        }
    }
}

// ---------------------------------------------------------------------------
// Chain files
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct ChainFile {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    pub start_agent_id: String,
    pub agents: BTreeMap<String, AgentEntry>,
}

#[derive(Debug, Deserialize)]
pub struct AgentEntry {
    /// Defaults to the agent id.
    #[serde(default)]
    pub name: Option<String>,
    pub workflow: AgentWorkflow,
    /// Hand-off config; absent means the chain ends after this agent.
    #[serde(default)]
    pub chain: Option<ChainConfig>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum AgentWorkflow {
    /// Path to a workflow file, relative to the chain file.
    File(PathBuf),
    Inline(WorkflowSubmission),
}

/// An agent ready to run: display name plus compiled workflow.
pub struct WorkflowAgent {
    pub name: String,
    pub workflow: CompiledWorkflow,
}

impl ChainFile {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read chain file {}", path.display()))?;
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);
        match extension.as_deref() {
            Some("json") => serde_json::from_str(&content).context("Failed to parse chain JSON"),
            Some("yaml") | Some("yml") => {
                serde_yaml_ng::from_str(&content).context("Failed to parse chain YAML")
            }
            _ => bail!(
                "Unsupported chain file '{}': expected .json, .yaml or .yml",
                path.display()
            ),
        }
    }

    /// Split into the coordinator's definition and the compiled agents.
    ///
    /// `base_dir` resolves relative workflow paths.
    pub fn into_parts<R: ExecutionRecorder>(
        self,
        base_dir: &Path,
        engine: &WorkflowEngine<ToolRegistry, R>,
    ) -> Result<(ChainDefinition, HashMap<String, WorkflowAgent>)> {
        if !self.agents.contains_key(&self.start_agent_id) {
            bail!("Start agent '{}' is not defined", self.start_agent_id);
        }

        let mut links = BTreeMap::new();
        let mut agents = HashMap::new();
        for (agent_id, entry) in self.agents {
            if let Some(config) = entry.chain {
                links.insert(agent_id.clone(), config);
            }

            let submission = match entry.workflow {
                AgentWorkflow::Inline(submission) => submission,
                AgentWorkflow::File(path) => load_submission(&base_dir.join(path))?,
            };
            let definition = submission
                .into_definition()
                .with_context(|| format!("Invalid workflow for agent '{agent_id}'"))?;
            let workflow = engine
                .compile(&definition)
                .with_context(|| format!("Invalid workflow for agent '{agent_id}'"))?;

            let name = entry.name.unwrap_or_else(|| agent_id.clone());
            agents.insert(agent_id, WorkflowAgent { name, workflow });
        }

        for (agent_id, config) in &links {
            if let Some(next) = &config.next_agent_id {
                if !agents.contains_key(next) {
                    bail!("Agent '{agent_id}' hands off to undefined agent '{next}'");
                }
            }
        }

        let definition = ChainDefinition {
            name: self.name.unwrap_or_else(|| self.id.clone()),
            id: self.id,
            start_agent_id: self.start_agent_id,
            links,
        };
        Ok((definition, agents))
    }
}

fn load_submission(path: &Path) -> Result<WorkflowSubmission> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read workflow {}", path.display()))?;
    let submission = if path.extension().and_then(|e| e.to_str()) == Some("json") {
        parse_submission_json(&content)
    } else {
        parse_submission_yaml(&content)
    };
    submission.with_context(|| format!("Failed to parse workflow {}", path.display()))
}

// ---------------------------------------------------------------------------
// Host capabilities
// ---------------------------------------------------------------------------

/// Runs each agent's task as a workflow on a shared engine.
pub struct WorkflowAgentRunner<R: ExecutionRecorder> {
    engine: WorkflowEngine<ToolRegistry, R>,
    agents: HashMap<String, WorkflowAgent>,
}

impl<R: ExecutionRecorder> WorkflowAgentRunner<R> {
    pub fn new(engine: WorkflowEngine<ToolRegistry, R>, agents: HashMap<String, WorkflowAgent>) -> Self {
        Self { engine, agents }
    }
}

impl<R: ExecutionRecorder> AgentRunner for WorkflowAgentRunner<R> {
    fn agent_name(&self, agent_id: &str) -> Option<String> {
        self.agents.get(agent_id).map(|a| a.name.clone())
    }

    async fn run_task(
        &self,
        agent_id: &str,
        input: StepValue,
        cancel: CancellationToken,
    ) -> Result<StepValue, AgentError> {
        let agent = self
            .agents
            .get(agent_id)
            .ok_or_else(|| AgentError(format!("unknown agent '{agent_id}'")))?;

        let mut inputs = BTreeMap::new();
        inputs.insert("input".to_string(), input);

        let result = self
            .engine
            .execute_compiled(&agent.workflow, StepValue::Mapping(inputs), cancel)
            .await
            .map_err(|e| AgentError(e.to_string()))?;

        tracing::debug!(
            agent_id,
            execution_id = %result.execution_id,
            status = result.status.as_str(),
            "agent workflow finished"
        );

        match result.status {
            ExecutionStatus::Completed => Ok(result.outputs),
            status => Err(AgentError(match result.failure {
                Some(failure) => failure.describe(),
                None => format!("workflow {}", status.as_str()),
            })),
        }
    }
}

/// `summary` keeps the first characters of the output's text; `custom` wraps
/// the output with the agent it came from.
#[derive(Debug, Clone, Copy)]
pub struct CliShaper {
    summary_chars: usize,
}

impl Default for CliShaper {
    fn default() -> Self {
        Self {
            summary_chars: SUMMARY_CHARS,
        }
    }
}

impl OutputShaper for CliShaper {
    async fn summarize(&self, output: &StepValue) -> Result<StepValue, AgentError> {
        Ok(StepValue::from(preview(output, self.summary_chars)))
    }

    async fn transform(&self, agent_id: &str, output: &StepValue) -> Result<StepValue, AgentError> {
        let mut wrapped = BTreeMap::new();
        wrapped.insert("previous".to_string(), output.clone());
        wrapped.insert("from_agent".to_string(), StepValue::from(agent_id));
        Ok(StepValue::Mapping(wrapped))
    }
}

// ---------------------------------------------------------------------------
// Run
// ---------------------------------------------------------------------------

async fn handle_run(
    file: &Path,
    input: StepValue,
    ephemeral: bool,
    state: &AppState,
    json: bool,
    quiet: bool,
) -> Result<()> {
    let chain_file = ChainFile::load(file)?;
    let base_dir = file.parent().unwrap_or_else(|| Path::new("."));

    let run = if ephemeral {
        run_chain_with(
            chain_file,
            base_dir,
            input,
            state,
            Arc::new(InMemoryExecutionRecorder::new()),
            Arc::new(InMemoryChainRunRepository::new()),
        )
        .await?
    } else {
        let pool = state.open_pool().await?;
        run_chain_with(
            chain_file,
            base_dir,
            input,
            state,
            Arc::new(SqliteExecutionRecorder::new(pool.clone())),
            Arc::new(SqliteChainRunRepository::new(pool)),
        )
        .await?
    };

    if json {
        print_json(&run)?;
    } else if !quiet {
        display_run(&run);
    }

    if run.status != ChainRunStatus::Completed {
        bail!(
            "Chain '{}' {}",
            run.chain_id,
            run.error
                .as_deref()
                .map(|e| format!("failed: {e}"))
                .unwrap_or_else(|| run.status.as_str().to_string())
        );
    }
    Ok(())
}

async fn run_chain_with<E, C>(
    chain_file: ChainFile,
    base_dir: &Path,
    input: StepValue,
    state: &AppState,
    recorder: Arc<E>,
    repository: Arc<C>,
) -> Result<ChainRun>
where
    E: ExecutionRecorder,
    C: ChainRunRepository,
{
    let engine = state.engine(recorder, state.config.engine.clone());
    let (definition, agents) = chain_file.into_parts(base_dir, &engine)?;
    run_chain(definition, agents, engine, repository, &state.config.chain, input).await
}

/// Drive `definition` to completion. Ctrl+C cancels the run.
pub async fn run_chain<E, C>(
    definition: ChainDefinition,
    agents: HashMap<String, WorkflowAgent>,
    engine: WorkflowEngine<ToolRegistry, E>,
    repository: Arc<C>,
    settings: &ChainSettings,
    input: StepValue,
) -> Result<ChainRun>
where
    E: ExecutionRecorder,
    C: ChainRunRepository,
{
    let coordinator = ChainCoordinator::new(
        Arc::new(WorkflowAgentRunner::new(engine, agents)),
        Arc::new(CliShaper::default()),
        repository,
        settings,
    );

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received, cancelling chain");
            on_interrupt.cancel();
        }
    });

    let run = coordinator
        .run_chain(&definition, input, cancel)
        .await
        .with_context(|| format!("Chain '{}' aborted", definition.name));
    interrupt.abort();
    run
}

fn display_run(run: &ChainRun) {
    println!();
    let (mark, verb) = match run.status {
        ChainRunStatus::Completed => (style("*").green().bold(), "completed"),
        ChainRunStatus::Cancelled => (style("!").yellow().bold(), "was cancelled"),
        _ => (style("x").red().bold(), "failed"),
    };
    println!("  {mark} Chain '{}' {verb}", style(&run.chain_id).cyan());
    println!("  Run: {}", run.id);
    println!("  Started: {}", run.started_at.format("%Y-%m-%d %H:%M:%S"));
    if let Some(completed) = run.completed_at {
        println!("  Completed: {}", completed.format("%Y-%m-%d %H:%M:%S"));
    }
    println!("  Input: {}", preview(&run.initial_input, 120));
    if let Some(err) = &run.error {
        println!("  Error: {}", style(err).red());
    }
    println!();

    if !run.step_results.is_empty() {
        let mut table = Table::new();
        table
            .load_preset(presets::UTF8_FULL_CONDENSED)
            .set_content_arrangement(ContentArrangement::Dynamic)
            .set_header(vec![
                Cell::new("#").fg(Color::Cyan),
                Cell::new("Agent"),
                Cell::new("Completed"),
                Cell::new("Output"),
            ]);
        for (i, step) in run.step_results.iter().enumerate() {
            table.add_row(vec![
                Cell::new(i + 1),
                Cell::new(format!("{} ({})", step.agent_name, step.agent_id)),
                Cell::new(step.completed_at.format("%H:%M:%S").to_string()),
                Cell::new(preview(&step.output, 60)),
            ]);
        }
        println!("{table}");
        println!();
    }

    if let Some(output) = &run.final_output {
        println!("  Final output: {}", preview(output, 200));
        println!();
    }
}

// ---------------------------------------------------------------------------
// Show / List
// ---------------------------------------------------------------------------

async fn handle_show(run_id: &str, repo: &impl ChainRunRepository, json: bool) -> Result<()> {
    let id = parse_uuid(run_id, "chain run ID")?;
    let run = repo
        .get_chain_run(&id)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to get chain run: {e}"))?
        .with_context(|| format!("Chain run '{run_id}' not found"))?;

    if json {
        return print_json(&run);
    }
    display_run(&run);
    Ok(())
}

async fn handle_list(
    chain_id: &str,
    limit: u32,
    repo: &impl ChainRunRepository,
    json: bool,
) -> Result<()> {
    let runs = repo
        .list_chain_runs(chain_id, limit)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to list chain runs: {e}"))?;

    if json {
        return print_json(&runs);
    }

    if runs.is_empty() {
        println!();
        println!("  No runs for chain '{chain_id}'.");
        println!();
        return Ok(());
    }

    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("Run").fg(Color::Cyan),
            Cell::new("Status"),
            Cell::new("Agents"),
            Cell::new("Current"),
            Cell::new("Started"),
        ]);
    for r in &runs {
        table.add_row(vec![
            Cell::new(short_id(&r.id)),
            chain_status_cell(r.status),
            Cell::new(r.step_results.len()),
            Cell::new(r.current_agent_id.as_deref().unwrap_or("-")),
            Cell::new(r.started_at.format("%Y-%m-%d %H:%M").to_string()),
        ]);
    }

    println!();
    println!("  Runs for chain '{}'", style(chain_id).cyan());
    println!();
    println!("{table}");
    println!();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowline_infra::tools::builtin_registry;
    use flowline_types::config::{EngineConfig, HttpSettings};
    use serde_json::json;

    const CHAIN_YAML: &str = r#"
id: research
name: Research pipeline
start_agent_id: researcher
agents:
  researcher:
    name: Researcher
    workflow:
      name: research
      steps:
        - id: notes
          tool: echo
          inputMappings: [{from: inputs.input, to: topic}]
    chain:
      next_agent_id: writer
      auto_trigger: true
  writer:
    name: Writer
    workflow:
      name: write
      steps:
        - id: draft
          tool: echo
          inputMappings: [{from: inputs.input.topic, to: headline}]
"#;

    fn engine() -> WorkflowEngine<ToolRegistry, InMemoryExecutionRecorder> {
        WorkflowEngine::new(
            Arc::new(builtin_registry(&HttpSettings::default()).unwrap()),
            Arc::new(InMemoryExecutionRecorder::new()),
            EngineConfig::default(),
        )
    }

    fn chain_file(yaml: &str) -> ChainFile {
        serde_yaml_ng::from_str(yaml).unwrap()
    }

    #[test]
    fn chain_file_splits_into_definition_and_agents() {
        let engine = engine();
        let (definition, agents) = chain_file(CHAIN_YAML)
            .into_parts(Path::new("."), &engine)
            .unwrap();

        assert_eq!(definition.name, "Research pipeline");
        assert_eq!(definition.start_agent_id, "researcher");
        assert_eq!(definition.links.len(), 1);
        assert_eq!(
            definition.links["researcher"].next_agent_id.as_deref(),
            Some("writer")
        );
        assert_eq!(agents["writer"].name, "Writer");
    }

    #[test]
    fn undefined_hand_off_target_is_rejected() {
        let yaml = CHAIN_YAML.replace("next_agent_id: writer", "next_agent_id: editor");
        let err = chain_file(&yaml)
            .into_parts(Path::new("."), &engine())
            .err()
            .unwrap();
        assert!(err.to_string().contains("undefined agent 'editor'"));
    }

    #[test]
    fn workflow_paths_resolve_against_the_chain_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("solo.yaml"),
            "name: solo\nsteps:\n  - id: only\n    tool: noop\n",
        )
        .unwrap();
        let yaml = "id: solo\nstart_agent_id: a\nagents:\n  a:\n    workflow: solo.yaml\n";

        let (definition, agents) = chain_file(yaml).into_parts(dir.path(), &engine()).unwrap();
        assert_eq!(definition.name, "solo");
        assert_eq!(agents["a"].name, "a");
        assert_eq!(agents["a"].workflow.definition().name, "solo");
    }

    #[tokio::test]
    async fn chain_runs_agents_as_workflows() {
        let engine = engine();
        let (definition, agents) = chain_file(CHAIN_YAML)
            .into_parts(Path::new("."), &engine)
            .unwrap();
        let repository = Arc::new(InMemoryChainRunRepository::new());

        let run = run_chain(
            definition,
            agents,
            engine,
            Arc::clone(&repository),
            &ChainSettings::default(),
            StepValue::from("batteries"),
        )
        .await
        .unwrap();

        assert_eq!(run.status, ChainRunStatus::Completed);
        assert_eq!(run.step_results.len(), 2);
        assert_eq!(run.step_results[0].agent_name, "Researcher");
        assert_eq!(
            run.final_output,
            Some(StepValue::from(json!({"headline": "batteries"})))
        );

        let stored = repository.get_chain_run(&run.id).await.unwrap().unwrap();
        assert_eq!(stored, run);
    }

    #[tokio::test]
    async fn failing_agent_workflow_fails_the_chain() {
        let yaml = CHAIN_YAML.replace("tool: echo\n          inputMappings: [{from: inputs.input.topic, to: headline}]", "tool: fail");
        let engine = engine();
        let (definition, agents) = chain_file(&yaml)
            .into_parts(Path::new("."), &engine)
            .unwrap();

        let run = run_chain(
            definition,
            agents,
            engine,
            Arc::new(InMemoryChainRunRepository::new()),
            &ChainSettings::default(),
            StepValue::from("batteries"),
        )
        .await
        .unwrap();

        assert_eq!(run.status, ChainRunStatus::Failed);
        assert_eq!(run.step_results.len(), 1);
        assert!(run.error.unwrap().contains("fail tool invoked"));
    }

    #[tokio::test]
    async fn shaper_summarizes_and_wraps() {
        let shaper = CliShaper { summary_chars: 5 };
        assert_eq!(
            shaper.summarize(&StepValue::from("abcdefgh")).await.unwrap(),
            StepValue::from("abcde...")
        );

        let wrapped = shaper
            .transform("researcher", &StepValue::from(1_i64))
            .await
            .unwrap();
        assert_eq!(
            wrapped,
            StepValue::from(json!({"previous": 1, "from_agent": "researcher"}))
        );
    }
}
