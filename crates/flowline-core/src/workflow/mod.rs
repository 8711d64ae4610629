//! Workflow definitions, expression resolution and execution.
//!
//! Path and condition parsing happen once at compile time
//! ([`definition::compile`]); the [`engine::WorkflowEngine`] then walks the
//! compiled graph one step at a time through the
//! [`interpreter::StepInterpreter`].

pub mod condition;
pub mod context;
pub mod definition;
pub mod engine;
pub mod interpreter;
pub mod path;
pub mod resolver;
pub mod submission;

pub use condition::{evaluate_condition, Condition, ConditionError};
pub use context::ExecutionContext;
pub use definition::{compile, CompiledStep, CompiledWorkflow, WorkflowError};
pub use engine::{EngineError, ExecutionFailure, ExecutionResult, FailureKind, WorkflowEngine};
pub use interpreter::{StepError, StepInterpreter, StepOutcome, StepReport};
pub use path::{PathError, PathRoot, ReferencePath};
pub use resolver::{resolve, resolve_str, PathScope, ResolutionError};
pub use submission::{load_workflow_file, WorkflowSubmission};
