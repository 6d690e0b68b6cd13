//! Runtime state module
//!
//! Application state and run storage

pub mod app_state;
pub mod run_store;

pub use app_state::{get_shutdown_token, trigger_shutdown, AppState};
pub use run_store::RunStore;
