//! Task Assign MCP Library
//!
//! Entity store, dependency graph, lifecycle, workload and recommendation
//! engine, plus the persistence, CLI and MCP layers around them.

pub mod cli;
pub mod config;
pub mod error;
pub mod format;
pub mod logging;
pub mod persist;
pub mod recommend;
pub mod service;
pub mod snapshot;
pub mod store;
pub mod templates;
pub mod tools;
pub mod types;
