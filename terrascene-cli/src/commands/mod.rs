//! CLI subcommand implementations.

pub mod fly;
pub mod probe;
