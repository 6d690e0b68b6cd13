//! Stack service descriptors

use serde::Serialize;

use super::probe::ProbeTarget;

/// Startup tiers of the stack, in strict precedence order
///
/// Data-tier services must be ready before the application tier starts, and
/// the application tier before the job runner.
#[derive(Clone, Copy, Debug, Serialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum ServiceTier {
    Data,
    Application,
    JobRunner,
}

impl ServiceTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceTier::Data => "data",
            ServiceTier::Application => "application",
            ServiceTier::JobRunner => "job_runner",
        }
    }

    /// Startup order rank, lower starts first
    pub fn rank(&self) -> u8 {
        match self {
            ServiceTier::Data => 0,
            ServiceTier::Application => 1,
            ServiceTier::JobRunner => 2,
        }
    }
}

/// One service of the stack as the orchestrator sees it
#[derive(Clone, Debug)]
pub struct ServiceDescriptor {
    pub name: String,
    pub tier: ServiceTier,
    /// Service name in the compose file
    pub compose_service: String,
    /// Readiness/health probe, if the service exposes one
    pub health: Option<ProbeTarget>,
    /// Whether an unhealthy probe fails the deploy (false = advisory)
    pub required: bool,
}

impl ServiceDescriptor {
    pub fn new(name: impl Into<String>, tier: ServiceTier, compose_service: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tier,
            compose_service: compose_service.into(),
            health: None,
            required: true,
        }
    }

    pub fn with_health(mut self, probe: ProbeTarget) -> Self {
        self.health = Some(probe);
        self
    }

    pub fn advisory(mut self) -> Self {
        self.required = false;
        self
    }
}

/// Services of one tier, preserving input order within the tier
pub fn tier_services<'a>(services: &'a [ServiceDescriptor], tier: ServiceTier) -> Vec<&'a ServiceDescriptor> {
    services.iter().filter(|s| s.tier == tier).collect()
}
