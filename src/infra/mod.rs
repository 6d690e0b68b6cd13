//! Infrastructure module
//!
//! Wraps external dependencies (process execution, operational log files)

pub mod command;
pub mod log_sink;

pub use command::{CommandError, CommandResult, CommandSpec};
pub use log_sink::{LogLevel, LogSink};
