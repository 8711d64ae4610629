//! Chain coordinator: hands one agent's output to the next agent.
//!
//! `on_agent_complete` is the single hand-off decision. `run_chain` drives a
//! whole [`ChainDefinition`] by invoking agents and following hand-offs until
//! one ends the chain, an agent fails, the hop budget runs out, or the run is
//! cancelled.
//!
//! There is no cycle detection. A chain whose links loop runs until
//! `max_hops` agent invocations and then fails with `HopLimitExceeded`.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use flowline_types::chain::{
    ChainConfig, ChainDefinition, ChainInputMode, ChainRun, ChainRunStatus, ChainStepResult,
};
use flowline_types::config::ChainSettings;
use flowline_types::value::StepValue;
use tokio_util::sync::CancellationToken;

use super::{AgentRunner, ChainError, OutputShaper};
use crate::repository::ChainRunRepository;
use crate::workflow::condition::Condition;

/// Why a chain stopped without handing off.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainEndReason {
    AutoTriggerDisabled,
    NoNextAgent,
    ConditionNotMet,
}

/// Result of a hand-off decision.
#[derive(Debug, Clone, PartialEq)]
pub enum ChainStepOutcome {
    /// The chain ends with the completed agent. Not a failure.
    Ended { reason: ChainEndReason },
    /// The next agent should run with `input` after `delay`.
    Triggered {
        next_agent_id: String,
        input: StepValue,
        delay: Duration,
    },
}

pub struct ChainCoordinator<A, S, R>
where
    A: AgentRunner,
    S: OutputShaper,
    R: ChainRunRepository,
{
    runner: Arc<A>,
    shaper: Arc<S>,
    repository: Arc<R>,
    max_hops: u32,
}

impl<A, S, R> ChainCoordinator<A, S, R>
where
    A: AgentRunner,
    S: OutputShaper,
    R: ChainRunRepository,
{
    pub fn new(runner: Arc<A>, shaper: Arc<S>, repository: Arc<R>, settings: &ChainSettings) -> Self {
        Self {
            runner,
            shaper,
            repository,
            max_hops: settings.max_hops,
        }
    }

    pub fn repository(&self) -> &R {
        &self.repository
    }

    pub fn max_hops(&self) -> u32 {
        self.max_hops
    }

    /// Record a completed agent on `run` and decide whether to hand off.
    ///
    /// The step result is appended and persisted before anything else, so a
    /// failing condition or shaper still leaves the output on record.
    pub async fn on_agent_complete(
        &self,
        run: &mut ChainRun,
        agent_id: &str,
        output: StepValue,
        config: &ChainConfig,
    ) -> Result<ChainStepOutcome, ChainError> {
        if run.status.is_terminal() {
            return Err(ChainError::RunNotActive {
                run_id: run.id,
                status: run.status,
            });
        }

        let agent_name = self
            .runner
            .agent_name(agent_id)
            .unwrap_or_else(|| agent_id.to_string());
        run.step_results.push(ChainStepResult {
            agent_id: agent_id.to_string(),
            agent_name: agent_name.clone(),
            output: output.clone(),
            completed_at: Utc::now(),
        });
        run.current_agent_id = Some(agent_id.to_string());
        self.repository.save_chain_run(run).await?;

        if !config.auto_trigger {
            return Ok(ended(ChainEndReason::AutoTriggerDisabled));
        }
        let Some(next_agent_id) = config.next_agent_id.clone() else {
            return Ok(ended(ChainEndReason::NoNextAgent));
        };

        if let Some(source) = config.condition.as_deref() {
            let condition = Condition::parse_named(source).map_err(|source| {
                ChainError::MalformedCondition {
                    agent_id: agent_id.to_string(),
                    source,
                }
            })?;
            let scope = condition_scope(agent_id, &agent_name, &output);
            let met = condition
                .evaluate(&scope)
                .map_err(|source| ChainError::Condition {
                    agent_id: agent_id.to_string(),
                    source,
                })?;
            if !met {
                tracing::debug!(
                    chain_run_id = %run.id,
                    agent_id,
                    condition = source,
                    "chain condition not met"
                );
                return Ok(ended(ChainEndReason::ConditionNotMet));
            }
        }

        let input = match config.input_mapping {
            ChainInputMode::Full => Ok(output),
            ChainInputMode::Summary => self.shaper.summarize(&output).await,
            ChainInputMode::Custom => self.shaper.transform(agent_id, &output).await,
        }
        .map_err(|source| ChainError::Shaping {
            agent_id: agent_id.to_string(),
            source,
        })?;

        tracing::debug!(
            chain_run_id = %run.id,
            from_agent = agent_id,
            next_agent = %next_agent_id,
            mode = ?config.input_mapping,
            "chain hand-off"
        );
        Ok(ChainStepOutcome::Triggered {
            next_agent_id,
            input,
            delay: Duration::from_secs(config.delay_seconds),
        })
    }

    /// Run a chain from its start agent to completion.
    ///
    /// Agent, condition and hop-limit failures mark the returned run
    /// `failed`; only repository errors are returned as `Err`.
    pub async fn run_chain(
        &self,
        chain: &ChainDefinition,
        initial_input: StepValue,
        cancel: CancellationToken,
    ) -> Result<ChainRun, ChainError> {
        let mut run = ChainRun::start(chain.id.clone(), initial_input.clone());
        self.repository.create_chain_run(&run).await?;
        tracing::info!(chain_run_id = %run.id, chain = %chain.name, "starting chain run");

        match self.drive(chain, &mut run, initial_input, &cancel).await {
            Ok(()) => {}
            Err(ChainError::Repository(e)) => return Err(ChainError::Repository(e)),
            Err(e) => {
                tracing::warn!(chain_run_id = %run.id, error = %e, "chain run failed");
                run.status = ChainRunStatus::Failed;
                run.error = Some(e.to_string());
                run.completed_at = Some(Utc::now());
                self.repository.save_chain_run(&run).await?;
            }
        }

        tracing::info!(
            chain_run_id = %run.id,
            status = run.status.as_str(),
            agents_run = run.step_results.len(),
            "chain run finished"
        );
        Ok(run)
    }

    async fn drive(
        &self,
        chain: &ChainDefinition,
        run: &mut ChainRun,
        initial_input: StepValue,
        cancel: &CancellationToken,
    ) -> Result<(), ChainError> {
        let mut agent_id = chain.start_agent_id.clone();
        let mut input = initial_input;
        let mut hops = 0u32;

        loop {
            if cancel.is_cancelled() {
                return self.cancelled(run).await;
            }
            if hops >= self.max_hops {
                return Err(ChainError::HopLimitExceeded {
                    max_hops: self.max_hops,
                });
            }

            run.current_agent_id = Some(agent_id.clone());
            self.repository.save_chain_run(run).await?;
            tracing::debug!(chain_run_id = %run.id, agent_id = %agent_id, hop = hops, "invoking agent");

            let output = tokio::select! {
                _ = cancel.cancelled() => return self.cancelled(run).await,
                result = self.runner.run_task(&agent_id, input, cancel.clone()) => {
                    result.map_err(|source| ChainError::Agent {
                        agent_id: agent_id.clone(),
                        source,
                    })?
                }
            };
            hops += 1;

            let config = chain.links.get(&agent_id).cloned().unwrap_or_default();
            match self
                .on_agent_complete(run, &agent_id, output.clone(), &config)
                .await?
            {
                ChainStepOutcome::Ended { reason } => {
                    tracing::debug!(chain_run_id = %run.id, agent_id = %agent_id, ?reason, "chain ended");
                    return self.complete(run, output).await;
                }
                ChainStepOutcome::Triggered {
                    next_agent_id,
                    input: next_input,
                    delay,
                } => {
                    if !delay.is_zero() {
                        tokio::select! {
                            _ = cancel.cancelled() => return self.cancelled(run).await,
                            _ = tokio::time::sleep(delay) => {}
                        }
                    }
                    agent_id = next_agent_id;
                    input = next_input;
                }
            }
        }
    }

    /// Set the final output (exactly once) and mark the run completed.
    async fn complete(&self, run: &mut ChainRun, output: StepValue) -> Result<(), ChainError> {
        if run.final_output.is_some() {
            return Err(ChainError::FinalOutputAlreadySet(run.id));
        }
        run.final_output = Some(output);
        run.status = ChainRunStatus::Completed;
        run.completed_at = Some(Utc::now());
        self.repository.save_chain_run(run).await?;
        Ok(())
    }

    async fn cancelled(&self, run: &mut ChainRun) -> Result<(), ChainError> {
        tracing::info!(chain_run_id = %run.id, "chain run cancelled");
        run.status = ChainRunStatus::Cancelled;
        run.completed_at = Some(Utc::now());
        self.repository.save_chain_run(run).await?;
        Ok(())
    }
}

fn ended(reason: ChainEndReason) -> ChainStepOutcome {
    ChainStepOutcome::Ended { reason }
}

/// `{output, agent: {id, name}}`, the scope chain conditions read from.
fn condition_scope(agent_id: &str, agent_name: &str, output: &StepValue) -> StepValue {
    let mut agent = StepValue::mapping();
    if let Some(map) = agent.as_mapping_mut() {
        map.insert("id".to_string(), StepValue::from(agent_id));
        map.insert("name".to_string(), StepValue::from(agent_name));
    }
    let mut scope = StepValue::mapping();
    if let Some(map) = scope.as_mapping_mut() {
        map.insert("output".to_string(), output.clone());
        map.insert("agent".to_string(), agent);
    }
    scope
}
