//! # mind-cli
//!
//! Command-line interface for the Mind runtime.
//!
//! ## Commands
//!
//! - `mind minds`: Create, list, show and update Minds
//! - `mind delegate`: Run a task and stream its events
//! - `mind feedback`: Record explicit feedback for a Mind
//! - `mind tasks` / `mind drones`: Inspect past runs and their traces
//! - `mind memory`: List and search long-term memory
//! - `mind tools`: Register runtime tools
//! - `mind doctor`: Audit configuration

pub mod commands;

pub use commands::Cli;
