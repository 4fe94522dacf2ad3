//! Sentinel CLI library.
//!
//! Argument parsing, session wiring and command handlers for the `sentinel`
//! binary.

pub mod cli;
pub mod commands;
pub mod context;
pub mod styled_output;

pub use cli::{Cli, Commands, GlobalArgs, LogLevel};
pub use context::AppContext;
