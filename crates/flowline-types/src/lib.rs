//! Shared domain types for flowline.
//!
//! This crate contains the types used across the workflow engine: step values,
//! workflow definitions, execution records, agent chains, engine events and
//! configuration, plus the repository error type.
//!
//! Zero infrastructure dependencies -- only serde, uuid, chrono, thiserror.

pub mod chain;
pub mod config;
pub mod error;
pub mod event;
pub mod execution;
pub mod value;
pub mod workflow;
