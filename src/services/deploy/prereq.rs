//! Deployment prerequisites
//!
//! Missing required tools abort the deploy before anything starts; disk
//! space and port availability only produce advisory warnings.

use sysinfo::Disks;

use crate::config::{stack, EnvConfig};
use crate::error::AgentError;
use crate::infra::{LogLevel, LogSink};

use super::compose::ComposeRunner;

/// Minimum free space before the advisory warning fires
const MIN_FREE_DISK_GB: f64 = 5.0;

/// Check host prerequisites; returns the detected compose runner
pub async fn check(config: &EnvConfig, sink: &LogSink) -> Result<ComposeRunner, AgentError> {
    let compose = match ComposeRunner::detect(&config.stack_dir, stack::COMPOSE_FILE).await {
        Some(compose) => compose,
        None => {
            sink.record(
                LogLevel::Error,
                "docker compose not found; install Docker before deploying",
            );
            return Err(AgentError::PrerequisiteMissing("docker compose".to_string()));
        }
    };
    sink.record(LogLevel::Info, &format!("Using {}", compose.describe()));

    check_disk_space(sink);
    check_ports(config, sink);

    Ok(compose)
}

/// Advisory: warn when the disk holding the working directory is low
fn check_disk_space(sink: &LogSink) {
    let cwd = match std::env::current_dir() {
        Ok(cwd) => cwd,
        Err(_) => return,
    };

    let disks = Disks::new_with_refreshed_list();
    let holding = disks
        .iter()
        .filter(|d| cwd.starts_with(d.mount_point()))
        .max_by_key(|d| d.mount_point().as_os_str().len());

    if let Some(disk) = holding {
        let available_gb = disk.available_space() as f64 / 1024.0 / 1024.0 / 1024.0;
        if available_gb < MIN_FREE_DISK_GB {
            sink.record(
                LogLevel::Warning,
                &format!(
                    "Low disk space on {}: {:.1} GB available",
                    disk.mount_point().display(),
                    available_gb
                ),
            );
        }
    }
}

/// Advisory: warn when a stack port is already bound
fn check_ports(config: &EnvConfig, sink: &LogSink) {
    for (name, port) in stack::stack_ports(config) {
        if std::net::TcpListener::bind(("127.0.0.1", port)).is_err() {
            sink.record(
                LogLevel::Warning,
                &format!(
                    "Port {} ({}) is already in use; the stack may already be running",
                    port, name
                ),
            );
        }
    }
}
