//! Configuration module
//!
//! Environment variable parsing and stack topology

pub mod env;
pub mod stack;

pub use env::EnvConfig;
