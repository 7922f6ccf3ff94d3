//! Stuck job guard — keeps two runs of one (site, job type) from overlapping,
//! and recovers records left RUNNING by a crashed worker.
//!
//! Fails open: when the store cannot be read or the cleanup cannot be written,
//! the run proceeds.

use std::time::Duration;

use chrono::{DateTime, Utc};
use outreach_core::error::require_id;
use outreach_core::types::hours_between;
use outreach_core::{JobStatus, Result, SharedStore, timed};
use serde::Serialize;

use crate::registry::JobRegistry;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GuardVerdict {
    pub can_proceed: bool,
    pub was_stuck: bool,
    pub reason: String,
    /// Age of the RUNNING record, when there was one.
    pub hours_stuck: Option<f64>,
}

impl GuardVerdict {
    fn proceed(reason: impl Into<String>) -> Self {
        Self {
            can_proceed: true,
            was_stuck: false,
            reason: reason.into(),
            hours_stuck: None,
        }
    }
}

pub struct StuckJobGuard {
    store: SharedStore,
    registry: JobRegistry,
    timeout: Duration,
}

impl StuckJobGuard {
    pub fn new(store: SharedStore, registry: JobRegistry, timeout: Duration) -> Self {
        Self {
            store,
            registry,
            timeout,
        }
    }

    pub async fn evaluate(
        &self,
        job_type: &str,
        site_id: &str,
        stale_after_hours: u32,
    ) -> Result<GuardVerdict> {
        self.evaluate_at(job_type, site_id, stale_after_hours, Utc::now())
            .await
    }

    /// Evaluate with the staleness bound from the job registry.
    pub async fn evaluate_for(&self, job_type: &str, site_id: &str) -> Result<GuardVerdict> {
        let stale_after = self.registry.stale_after_hours(job_type);
        self.evaluate(job_type, site_id, stale_after).await
    }

    pub async fn evaluate_at(
        &self,
        job_type: &str,
        site_id: &str,
        stale_after_hours: u32,
        now: DateTime<Utc>,
    ) -> Result<GuardVerdict> {
        require_id("job_type", job_type)?;
        require_id("site_id", site_id)?;

        let record = match timed(
            "get_job_status",
            self.timeout,
            self.store.get_job_status(site_id, job_type),
        )
        .await
        {
            Ok(record) => record,
            Err(e) => {
                tracing::warn!("⚠️ [{site_id}] {job_type}: status read failed, proceeding: {e}");
                return Ok(GuardVerdict::proceed(format!("status unavailable ({e}), failing open")));
            }
        };

        let Some(mut record) = record else {
            return Ok(GuardVerdict::proceed("no previous run"));
        };
        if record.status != JobStatus::Running {
            return Ok(GuardVerdict::proceed(format!("last run {}", record.status)));
        }

        let hours = hours_between(record.started_at(), now);
        if hours <= f64::from(stale_after_hours) {
            return Ok(GuardVerdict {
                can_proceed: false,
                was_stuck: false,
                reason: format!("already running ({hours:.1}h, limit {stale_after_hours}h)"),
                hours_stuck: Some(hours),
            });
        }

        // A crashed run counts as a failed attempt.
        record.status = JobStatus::Failed;
        record.retry_count = record.retry_count.saturating_add(1);
        let reason = match timed(
            "upsert_job_status",
            self.timeout,
            self.store.upsert_job_status(&record),
        )
        .await
        {
            Ok(()) => {
                tracing::info!(
                    "🧹 [{site_id}] {job_type}: cleaned stuck record ({hours:.1}h > {stale_after_hours}h)"
                );
                format!("cleaned stuck record after {hours:.1}h")
            }
            Err(e) => {
                tracing::warn!("⚠️ [{site_id}] {job_type}: stuck cleanup failed, proceeding: {e}");
                format!("stuck for {hours:.1}h, cleanup failed ({e}), failing open")
            }
        };

        Ok(GuardVerdict {
            can_proceed: true,
            was_stuck: true,
            reason,
            hours_stuck: Some(hours),
        })
    }
}
