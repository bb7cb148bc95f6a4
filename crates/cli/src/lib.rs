// crates/cli/src/lib.rs
//! Interactive front end for the agent job engine.

pub mod args;
pub mod commands;
pub mod render;
pub mod shell;

pub use args::Args;
pub use commands::{parse_command, CommandError, ShellCommand};
pub use shell::{Shell, Step};
