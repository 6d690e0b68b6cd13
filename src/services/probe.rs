//! Dependency prober
//!
//! One parametrized bounded poll loop, reused by the startup dependency
//! gate, the deploy readiness checks and the smoke tests. Readiness is
//! binary per attempt; the total wait is bounded by the attempt budget.

use std::time::Duration;

use crate::domain::probe::{ProbeCheck, ProbeOutcome, ProbeTarget};
use crate::infra::{CommandSpec, LogLevel, LogSink};

/// Poll the target until it reports ready or the attempt budget runs out
///
/// One info log line per attempt; individual failed attempts are not
/// errors, only the final timeout is recorded at error level.
pub async fn probe(target: &ProbeTarget, sink: &LogSink) -> ProbeOutcome {
    for attempt in 1..=target.max_attempts {
        sink.record(
            LogLevel::Info,
            &format!(
                "Probing {} (attempt {}/{})",
                target.name, attempt, target.max_attempts
            ),
        );

        if attempt_once(target).await {
            tracing::info!(service = %target.name, attempts = attempt, "Dependency ready");
            return ProbeOutcome::Ready { attempts: attempt };
        }

        if attempt < target.max_attempts {
            tokio::time::sleep(target.interval).await;
        }
    }

    sink.record(
        LogLevel::Error,
        &format!(
            "{} not ready after {} attempts",
            target.name, target.max_attempts
        ),
    );
    ProbeOutcome::TimedOut {
        attempts: target.max_attempts,
    }
}

async fn attempt_once(target: &ProbeTarget) -> bool {
    match &target.check {
        ProbeCheck::Command { program, args } => {
            let spec = CommandSpec::new(program.clone(), args.clone(), ".")
                .timeout(target.attempt_timeout);
            match spec.run_captured().await {
                Ok(output) => output.status.success(),
                Err(_) => false,
            }
        }
        ProbeCheck::Http { url, expect } => http_ready(url, expect, target.attempt_timeout).await,
    }
}

async fn http_ready(url: &str, expect: &str, timeout: Duration) -> bool {
    let client = match reqwest::Client::builder().timeout(timeout).build() {
        Ok(client) => client,
        Err(_) => return false,
    };

    match client.get(url).send().await {
        Ok(response) if response.status().is_success() => match response.text().await {
            Ok(body) => body.contains(expect),
            Err(_) => false,
        },
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::LogSink;
    use std::time::Instant;

    fn temp_sink() -> LogSink {
        let dir = std::env::temp_dir().join(format!("probe-test-{}", uuid::Uuid::new_v4()));
        LogSink::new(dir, 7)
    }

    fn sh_target(name: &str, script: &str, max_attempts: u32, interval_ms: u64) -> ProbeTarget {
        ProbeTarget::command(
            name,
            "sh",
            vec!["-c".to_string(), script.to_string()],
            max_attempts,
            Duration::from_millis(interval_ms),
        )
    }

    #[tokio::test]
    async fn test_ready_on_first_attempt() {
        let sink = temp_sink();
        let target = sh_target("db", "exit 0", 30, 10);

        let outcome = probe(&target, &sink).await;
        assert_eq!(outcome, ProbeOutcome::Ready { attempts: 1 });
    }

    #[tokio::test]
    async fn test_never_ready_exhausts_exact_budget() {
        let sink = temp_sink();
        let target = sh_target("db", "exit 1", 3, 50);

        let started = Instant::now();
        let outcome = probe(&target, &sink).await;
        let elapsed = started.elapsed();

        assert_eq!(outcome, ProbeOutcome::TimedOut { attempts: 3 });
        // two sleeps between three attempts
        assert!(elapsed >= Duration::from_millis(100));

        let today = chrono::Local::now().date_naive();
        let log = std::fs::read_to_string(sink.log_path_for(today)).unwrap();
        let attempts = log.lines().filter(|l| l.contains("Probing db")).count();
        assert_eq!(attempts, 3);

        let errors = std::fs::read_to_string(sink.error_path_for(today)).unwrap();
        assert_eq!(errors.lines().count(), 1);
        assert!(errors.contains("db not ready after 3 attempts"));
    }

    #[tokio::test]
    async fn test_ready_on_third_attempt() {
        let sink = temp_sink();
        let dir = std::env::temp_dir().join(format!("probe-flag-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        // the first two attempts leave markers, the third succeeds
        let script = format!(
            "test -f {dir}/two && exit 0; test -f {dir}/one && touch {dir}/two; touch {dir}/one; exit 1",
            dir = dir.display()
        );
        let target = sh_target("db", &script, 30, 10);

        let outcome = probe(&target, &sink).await;
        assert_eq!(outcome, ProbeOutcome::Ready { attempts: 3 });

        let today = chrono::Local::now().date_naive();
        let log = std::fs::read_to_string(sink.log_path_for(today)).unwrap();
        assert_eq!(log.lines().filter(|l| l.contains("Probing db")).count(), 3);
        // succeeding within budget is not an error
        assert!(!sink.error_path_for(today).exists());
    }

    #[tokio::test]
    async fn test_http_probe_unreachable() {
        let sink = temp_sink();
        // nothing listens on this port
        let target = ProbeTarget::http(
            "grafana",
            "http://127.0.0.1:1/api/health",
            "database",
            2,
            Duration::from_millis(10),
        )
        .attempt_timeout(Duration::from_millis(200));

        let outcome = probe(&target, &sink).await;
        assert_eq!(outcome, ProbeOutcome::TimedOut { attempts: 2 });
    }
}
