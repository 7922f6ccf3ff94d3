//! # Outreach Core
//!
//! Shared foundation for the outreach decision/selection machinery:
//! data model, store interface, configuration, errors.
//!
//! ## Architecture
//! ```text
//! Orchestrator (external)
//!   └── per site
//!         ├── SchedulingDecisionEngine → run / skip + reason
//!         ├── StuckJobGuard            → mutual exclusion, stuck cleanup
//!         ├── CandidatePaginator ⇄ EligibilityFilter
//!         └── PriorityTaskRouter       → lane + timeout
//!
//! OutreachStore (injected, Arc<dyn OutreachStore>)
//!   ├── candidates  (count / page)
//!   ├── lead tasks  (batched ≤100 ids)
//!   └── job status  (get / upsert)
//! ```

pub mod channels;
pub mod config;
pub mod error;
pub mod report;
pub mod traits;
pub mod types;

#[cfg(any(test, feature = "testing"))]
pub mod memory_store;

pub use channels::{DeliveryChannel, has_valid_channel, normalize_channels};
pub use config::OutreachConfig;
pub use error::{OutreachError, Result};
pub use report::{Report, SweepWarning};
pub use traits::{OutreachStore, SharedStore, timed};
pub use types::{Candidate, JobStatus, JobStatusRecord, LeadTask, Site};
