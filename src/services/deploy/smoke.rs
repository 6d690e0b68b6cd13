//! Post-start smoke tests
//!
//! Polls each started service's health check through the shared prober.
//! Required services fail the deploy on timeout; advisory ones only warn.

use crate::domain::probe::ProbeOutcome;
use crate::domain::service::ServiceDescriptor;
use crate::error::AgentError;
use crate::infra::{LogLevel, LogSink};
use crate::services::probe;

/// Smoke-test every service in the slice that exposes a health check
pub async fn run(services: &[&ServiceDescriptor], sink: &LogSink) -> Result<(), AgentError> {
    for service in services {
        let Some(target) = &service.health else {
            continue;
        };

        match probe::probe(target, sink).await {
            ProbeOutcome::Ready { attempts } => {
                sink.record(
                    LogLevel::Info,
                    &format!("{} smoke test passed (attempt {})", service.name, attempts),
                );
            }
            ProbeOutcome::TimedOut { attempts } if service.required => {
                return Err(AgentError::DependencyTimeout {
                    service: service.name.clone(),
                    attempts,
                });
            }
            ProbeOutcome::TimedOut { .. } => {
                sink.record(
                    LogLevel::Warning,
                    &format!("{} smoke test failed, continuing (advisory)", service.name),
                );
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::probe::ProbeTarget;
    use crate::domain::service::ServiceTier;
    use std::time::Duration;

    fn temp_sink() -> LogSink {
        let dir = std::env::temp_dir().join(format!("smoke-test-{}", uuid::Uuid::new_v4()));
        LogSink::new(dir, 7)
    }

    fn service(name: &str, script: &str, required: bool) -> ServiceDescriptor {
        let descriptor = ServiceDescriptor::new(name, ServiceTier::Application, name).with_health(
            ProbeTarget::command(
                name,
                "sh",
                vec!["-c".to_string(), script.to_string()],
                2,
                Duration::from_millis(10),
            ),
        );
        if required {
            descriptor
        } else {
            descriptor.advisory()
        }
    }

    #[tokio::test]
    async fn test_all_healthy_passes() {
        let services = [service("grafana", "exit 0", true)];
        let refs: Vec<_> = services.iter().collect();
        assert!(run(&refs, &temp_sink()).await.is_ok());
    }

    #[tokio::test]
    async fn test_required_failure_is_fatal() {
        let services = [service("grafana", "exit 1", true)];
        let refs: Vec<_> = services.iter().collect();
        let err = run(&refs, &temp_sink()).await.unwrap_err();
        assert!(matches!(err, AgentError::DependencyTimeout { .. }));
    }

    #[tokio::test]
    async fn test_advisory_failure_continues() {
        let services = [
            service("redis", "exit 1", false),
            service("grafana", "exit 0", true),
        ];
        let refs: Vec<_> = services.iter().collect();
        assert!(run(&refs, &temp_sink()).await.is_ok());
    }

    #[tokio::test]
    async fn test_service_without_health_is_skipped() {
        let services = [ServiceDescriptor::new(
            "etl-agent",
            ServiceTier::JobRunner,
            "etl-agent",
        )];
        let refs: Vec<_> = services.iter().collect();
        assert!(run(&refs, &temp_sink()).await.is_ok());
    }
}
