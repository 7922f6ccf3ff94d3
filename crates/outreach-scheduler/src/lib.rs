//! # Outreach Scheduler
//!
//! Decides when a site's recurring job runs, keeps runs from overlapping and
//! routes selected work into priority lanes.
//!
//! ## Architecture
//! ```text
//! OutreachEngine (sweep, tokio interval)
//!   ├── SchedulingDecisionEngine  → pure decision table on last status
//!   ├── StuckJobGuard             → already running? stale → FAILED, proceed
//!   ├── JobTracker                → SCHEDULED / RUNNING / COMPLETED / FAILED
//!   ├── CandidatePaginator        → eligible leads (outreach-leads)
//!   └── PriorityTaskRouter → LaneScheduler
//!         critical 2m/50 · high 5m/30 · normal 15m/15 · low 30m/8 · background 60m/5
//! ```

pub mod decision;
pub mod engine;
pub mod guard;
pub mod lanes;
pub mod registry;
pub mod router;
pub mod tracker;

pub use decision::{DecisionOptions, SchedulingDecision, SchedulingDecisionEngine, decide};
pub use engine::{OutreachEngine, SiteResult, SiteStatus, SweepOptions, SweepReport, spawn_sweeper};
pub use guard::{GuardVerdict, StuckJobGuard};
pub use lanes::{Lane, LaneScheduler, LaneStats, LaneTask};
pub use registry::{Criticality, JobProfile, JobRegistry};
pub use router::{BusinessImpact, PriorityTaskRouter, Route, RouteSource, RoutingSignals};
pub use tracker::JobTracker;
