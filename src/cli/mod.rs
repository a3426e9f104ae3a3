//! CLI module
//!
//! Command-line interface for reading streams and converting state.
//!
//! # Commands
//!
//! - `read` - Read a stream concurrently and print protocol messages
//! - `validate` - Validate a stream definition
//! - `state to-concurrent` / `state to-sequential` - Convert stream state

mod commands;
mod runner;

pub use commands::{Cli, Commands, OutputFormat, StateCommand};
pub use runner::Runner;
