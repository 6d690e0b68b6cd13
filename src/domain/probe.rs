//! Readiness probe domain model

use std::time::Duration;

/// How a single probe attempt decides readiness
#[derive(Clone, Debug)]
pub enum ProbeCheck {
    /// Run an external readiness utility; exit code 0 means ready
    Command { program: String, args: Vec<String> },
    /// GET a health endpoint; ready when the body contains the expected token
    Http { url: String, expect: String },
}

/// A probed dependency with a bounded retry budget
///
/// `max_attempts * interval` bounds the total wait; exhausting the budget is
/// a hard outcome, never an infinite loop.
#[derive(Clone, Debug)]
pub struct ProbeTarget {
    /// Service name used in log lines (e.g. "postgres", "grafana")
    pub name: String,
    pub check: ProbeCheck,
    pub max_attempts: u32,
    /// Fixed sleep between attempts (no sleep after the last one)
    pub interval: Duration,
    /// Upper bound for a single attempt
    pub attempt_timeout: Duration,
}

impl ProbeTarget {
    /// Probe backed by an external command
    pub fn command(
        name: impl Into<String>,
        program: impl Into<String>,
        args: Vec<String>,
        max_attempts: u32,
        interval: Duration,
    ) -> Self {
        Self {
            name: name.into(),
            check: ProbeCheck::Command {
                program: program.into(),
                args,
            },
            max_attempts,
            interval,
            attempt_timeout: Duration::from_secs(5),
        }
    }

    /// Probe backed by an HTTP health endpoint
    pub fn http(
        name: impl Into<String>,
        url: impl Into<String>,
        expect: impl Into<String>,
        max_attempts: u32,
        interval: Duration,
    ) -> Self {
        Self {
            name: name.into(),
            check: ProbeCheck::Http {
                url: url.into(),
                expect: expect.into(),
            },
            max_attempts,
            interval,
            attempt_timeout: Duration::from_secs(5),
        }
    }

    pub fn attempt_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout = timeout;
        self
    }
}

/// Result of a bounded probe
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ProbeOutcome {
    /// Became ready on attempt `attempts`
    Ready { attempts: u32 },
    /// Never became ready within the attempt budget
    TimedOut { attempts: u32 },
}

impl ProbeOutcome {
    pub fn is_ready(&self) -> bool {
        matches!(self, ProbeOutcome::Ready { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_target_defaults() {
        let target = ProbeTarget::command(
            "postgres",
            "pg_isready",
            vec!["-h".into(), "localhost".into()],
            30,
            Duration::from_secs(2),
        );
        assert_eq!(target.name, "postgres");
        assert_eq!(target.max_attempts, 30);
        assert_eq!(target.attempt_timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_outcome_is_ready() {
        assert!(ProbeOutcome::Ready { attempts: 1 }.is_ready());
        assert!(!ProbeOutcome::TimedOut { attempts: 30 }.is_ready());
    }
}
