//! Store trait — the read/write operations the core consumes.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::error::{OutreachError, Result};
use crate::types::{Candidate, JobStatusRecord, LeadTask, Site};

/// Largest id list accepted by [`OutreachStore::fetch_tasks_by_lead_ids`].
pub const MAX_LEAD_IDS_PER_LOOKUP: usize = 100;

/// Persistent store backing sites, candidates, tasks and job records.
///
/// Implementations do not retry; failures surface as
/// [`OutreachError::StoreUnavailable`].
#[async_trait]
pub trait OutreachStore: Send + Sync {
    /// Backend name for logging.
    fn name(&self) -> &str;

    async fn list_sites(&self) -> Result<Vec<Site>>;

    async fn count_candidates(
        &self,
        site_id: &str,
        status: &str,
        created_before: DateTime<Utc>,
    ) -> Result<u64>;

    /// Ordered by `created_at` ascending, then `id`.
    async fn fetch_candidates_page(
        &self,
        site_id: &str,
        status: &str,
        created_before: DateTime<Utc>,
        offset: u64,
        limit: u32,
    ) -> Result<Vec<Candidate>>;

    /// At most [`MAX_LEAD_IDS_PER_LOOKUP`] ids per call.
    async fn fetch_tasks_by_lead_ids(
        &self,
        site_id: &str,
        stage: &str,
        lead_ids: &[String],
    ) -> Result<Vec<LeadTask>>;

    async fn get_job_status(&self, site_id: &str, job_type: &str)
    -> Result<Option<JobStatusRecord>>;

    async fn upsert_job_status(&self, record: &JobStatusRecord) -> Result<()>;
}

/// Store handle injected into every component.
pub type SharedStore = Arc<dyn OutreachStore>;

/// Run a store call under the caller-supplied timeout.
pub async fn timed<T, F>(operation: &str, after: Duration, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(after, fut).await {
        Ok(result) => result,
        Err(_) => Err(OutreachError::Timeout {
            operation: operation.to_string(),
            after_ms: after.as_millis() as u64,
        }),
    }
}
