//! Workflow execution engine and chain coordination for flowline.
//!
//! This crate defines the "ports" (tool executor, execution recorder, chain
//! run repository, agent runner) that hosts and the infrastructure layer
//! implement. It depends only on `flowline-types` -- never on
//! `flowline-infra` or any database/IO crate.

pub mod chain;
pub mod event;
pub mod repository;
pub mod tool;
pub mod workflow;
