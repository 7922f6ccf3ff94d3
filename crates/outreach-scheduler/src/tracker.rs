//! Lifecycle writes for (site, job type) status records.
//!
//! Read-then-write, not lock-based: two workers racing on the same record
//! both succeed and the later write wins.

use std::time::Duration;

use chrono::{DateTime, Utc};
use outreach_core::error::require_id;
use outreach_core::{JobStatus, JobStatusRecord, Result, SharedStore, timed};

pub struct JobTracker {
    store: SharedStore,
    timeout: Duration,
}

impl JobTracker {
    pub fn new(store: SharedStore, timeout: Duration) -> Self {
        Self { store, timeout }
    }

    pub async fn get(&self, site_id: &str, job_type: &str) -> Result<Option<JobStatusRecord>> {
        require_id("site_id", site_id)?;
        require_id("job_type", job_type)?;
        timed(
            "get_job_status",
            self.timeout,
            self.store.get_job_status(site_id, job_type),
        )
        .await
    }

    /// Mark SCHEDULED; an existing record keeps its retry count and creation time.
    pub async fn schedule(
        &self,
        site_id: &str,
        job_type: &str,
        next_run: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Result<JobStatusRecord> {
        self.transition(site_id, job_type, now, |rec| {
            rec.status = JobStatus::Scheduled;
            rec.next_run = next_run;
        })
        .await
    }

    pub async fn begin(
        &self,
        site_id: &str,
        job_type: &str,
        now: DateTime<Utc>,
    ) -> Result<JobStatusRecord> {
        self.transition(site_id, job_type, now, |rec| {
            rec.status = JobStatus::Running;
            rec.last_run = Some(now);
        })
        .await
    }

    pub async fn complete(
        &self,
        site_id: &str,
        job_type: &str,
        next_run: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Result<JobStatusRecord> {
        self.transition(site_id, job_type, now, |rec| {
            rec.status = JobStatus::Completed;
            rec.retry_count = 0;
            rec.next_run = next_run;
        })
        .await
    }

    pub async fn fail(
        &self,
        site_id: &str,
        job_type: &str,
        now: DateTime<Utc>,
    ) -> Result<JobStatusRecord> {
        self.transition(site_id, job_type, now, |rec| {
            rec.status = JobStatus::Failed;
            rec.retry_count = rec.retry_count.saturating_add(1);
        })
        .await
    }

    async fn transition<F>(
        &self,
        site_id: &str,
        job_type: &str,
        now: DateTime<Utc>,
        apply: F,
    ) -> Result<JobStatusRecord>
    where
        F: FnOnce(&mut JobStatusRecord),
    {
        let mut record = self
            .get(site_id, job_type)
            .await?
            .unwrap_or_else(|| JobStatusRecord::new(site_id, job_type, JobStatus::Scheduled, now));
        apply(&mut record);
        timed(
            "upsert_job_status",
            self.timeout,
            self.store.upsert_job_status(&record),
        )
        .await?;
        tracing::debug!("📝 [{site_id}] {job_type} → {}", record.status);
        Ok(record)
    }
}
