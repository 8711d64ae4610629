//! Infrastructure adapters for flowline.
//!
//! Implements the ports defined in `flowline-core`:
//! - SQLite execution recorder and chain run repository
//! - Built-in tools (noop, echo, fail, HTTP)
//! - `config.toml` loading and data directory resolution

pub mod config;
pub mod sqlite;
pub mod tools;
