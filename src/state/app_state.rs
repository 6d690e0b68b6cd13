//! Application state

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

use crate::config::EnvConfig;
use crate::domain::job::ControllerState;
use crate::infra::LogSink;

use super::run_store::RunStore;

/// Global shutdown token for graceful termination of all background tasks
static GLOBAL_SHUTDOWN: std::sync::OnceLock<CancellationToken> = std::sync::OnceLock::new();

/// Get the global shutdown token
pub fn get_shutdown_token() -> CancellationToken {
    GLOBAL_SHUTDOWN.get_or_init(CancellationToken::new).clone()
}

/// Trigger global shutdown
pub fn trigger_shutdown() {
    if let Some(token) = GLOBAL_SHUTDOWN.get() {
        token.cancel();
    }
}

/// The in-flight ETL run, if any
pub struct ActiveRun {
    pub run_id: String,
    pub cancel_token: CancellationToken,
}

/// Application state
pub struct AppState {
    /// API key protecting mutating endpoints
    pub api_key: String,
    /// Configuration, loaded once at startup
    pub config: EnvConfig,
    /// Agent start time
    pub started_at: DateTime<Utc>,
    /// Operational log sink (daily files + error stream)
    pub sink: LogSink,
    /// Run records
    pub runs: RunStore,
    /// Single-slot active run registration; the stack has one ETL job
    pub active_run: RwLock<Option<ActiveRun>>,
    /// Controller state, surfaced in /health
    pub controller: RwLock<ControllerState>,
    /// Next scheduled trigger time, surfaced in /health
    pub next_trigger: RwLock<Option<DateTime<Utc>>>,
}

impl AppState {
    pub fn new(config: EnvConfig) -> Self {
        tracing::info!(
            api_key_len = config.api_key.len(),
            port = config.port,
            stack_dir = %config.stack_dir.display(),
            database = %config.database.host,
            input_artifact = %config.etl.input_artifact.display(),
            schedule_minute = config.schedule.minute_offset,
            "Loaded configuration"
        );

        let sink = LogSink::new(config.logs.dir.clone(), config.logs.retention_days);

        Self {
            api_key: config.api_key.clone(),
            started_at: Utc::now(),
            sink,
            runs: RunStore::new(),
            active_run: RwLock::new(None),
            controller: RwLock::new(ControllerState::Idle),
            next_trigger: RwLock::new(None),
            config,
        }
    }

    /// Whether an ETL run is currently in flight
    pub async fn has_active_run(&self) -> bool {
        self.active_run.read().await.is_some()
    }

    /// Register the in-flight run, returning its cancellation token
    pub async fn register_run(&self, run_id: &str) -> CancellationToken {
        let cancel_token = get_shutdown_token().child_token();
        let mut active = self.active_run.write().await;
        *active = Some(ActiveRun {
            run_id: run_id.to_string(),
            cancel_token: cancel_token.clone(),
        });
        cancel_token
    }

    /// Clear the in-flight run registration
    pub async fn unregister_run(&self) {
        let mut active = self.active_run.write().await;
        *active = None;
    }

    pub async fn active_run_id(&self) -> Option<String> {
        self.active_run.read().await.as_ref().map(|r| r.run_id.clone())
    }

    pub async fn set_controller_state(&self, state: ControllerState) {
        *self.controller.write().await = state;
    }

    pub async fn controller_state(&self) -> ControllerState {
        *self.controller.read().await
    }
}
