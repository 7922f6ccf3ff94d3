//! Priority task router — job type (+ optional override) → execution lane.
//!
//! Resolution never fails: an unregistered or misspelled job type lands in the
//! normal lane rather than being dropped.

use std::time::Duration;

use serde::Serialize;

use crate::lanes::Lane;
use crate::registry::JobRegistry;

/// Business impact tag attached by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BusinessImpact {
    Critical,
    High,
    Medium,
    Low,
}

impl BusinessImpact {
    fn lane(&self) -> Lane {
        match self {
            BusinessImpact::Critical => Lane::Critical,
            BusinessImpact::High => Lane::High,
            BusinessImpact::Medium => Lane::Normal,
            BusinessImpact::Low => Lane::Low,
        }
    }
}

/// Context signals for the escalator, highest precedence first.
#[derive(Debug, Clone, Default)]
pub struct RoutingSignals {
    pub business_impact: Option<BusinessImpact>,
    pub customer_facing: bool,
    pub is_retry: bool,
    pub hours_stuck: Option<f64>,
}

/// Where the lane came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteSource {
    Explicit,
    BusinessImpact,
    CustomerFacing,
    Retry,
    HoursStuck,
    Registry,
    Default,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Route {
    pub lane: Lane,
    pub default_timeout: Duration,
    pub max_concurrent: usize,
    pub source: RouteSource,
}

impl Route {
    fn new(lane: Lane, source: RouteSource) -> Self {
        Self {
            lane,
            default_timeout: lane.default_timeout(),
            max_concurrent: lane.max_concurrent(),
            source,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct PriorityTaskRouter {
    registry: JobRegistry,
}

impl PriorityTaskRouter {
    pub fn new(registry: JobRegistry) -> Self {
        Self { registry }
    }

    /// Explicit priority wins; otherwise registry, otherwise normal.
    pub fn route(&self, job_type: &str, explicit: Option<Lane>) -> Route {
        if let Some(lane) = explicit {
            return Route::new(lane, RouteSource::Explicit);
        }
        self.from_registry(job_type)
    }

    /// Like [`route`](Self::route) with the override given by name.
    pub fn route_named(&self, job_type: &str, explicit: Option<&str>) -> Route {
        let lane = explicit.and_then(|name| {
            let parsed = Lane::parse(name);
            if parsed.is_none() {
                tracing::warn!("⚠️ Ignoring unknown priority '{}' for job '{}'", name, job_type);
            }
            parsed
        });
        self.route(job_type, lane)
    }

    /// Route with context escalation. Escalation only ever raises urgency
    /// above the registry lane.
    pub fn route_with_signals(
        &self,
        job_type: &str,
        explicit: Option<Lane>,
        signals: &RoutingSignals,
    ) -> Route {
        if let Some(lane) = explicit {
            return Route::new(lane, RouteSource::Explicit);
        }
        let base = self.from_registry(job_type);

        let escalated = if let Some(impact) = signals.business_impact {
            Some((impact.lane(), RouteSource::BusinessImpact))
        } else if signals.customer_facing {
            Some((Lane::High, RouteSource::CustomerFacing))
        } else if signals.is_retry {
            Some((base.lane.raised(), RouteSource::Retry))
        } else {
            match signals.hours_stuck {
                Some(h) if h >= 24.0 => Some((Lane::High, RouteSource::HoursStuck)),
                Some(h) if h >= 6.0 => Some((base.lane.raised(), RouteSource::HoursStuck)),
                _ => None,
            }
        };

        match escalated {
            Some((lane, source)) if lane.priority() < base.lane.priority() => {
                tracing::debug!("⏫ Escalated '{}' {} → {} ({:?})", job_type, base.lane, lane, source);
                Route::new(lane, source)
            }
            _ => base,
        }
    }

    fn from_registry(&self, job_type: &str) -> Route {
        match self.registry.lane_for(job_type) {
            Some(lane) => Route::new(lane, RouteSource::Registry),
            None => {
                tracing::debug!("🔀 Unregistered job type '{}', using normal lane", job_type);
                Route::new(Lane::Normal, RouteSource::Default)
            }
        }
    }
}
