//! In-process store with call counters and failure injection.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use crate::error::{OutreachError, Result};
use crate::traits::OutreachStore;
use crate::traits::store::MAX_LEAD_IDS_PER_LOOKUP;
use crate::types::{Candidate, JobStatusRecord, LeadTask, Site};

#[derive(Default)]
struct State {
    sites: Vec<Site>,
    candidates: Vec<Candidate>,
    /// (site_id, stage, task)
    tasks: Vec<(String, String, LeadTask)>,
    jobs: HashMap<(String, String), JobStatusRecord>,
}

/// Store kept entirely in memory.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
    count_calls: AtomicUsize,
    page_calls: AtomicUsize,
    task_calls: AtomicUsize,
    fail_candidates: AtomicBool,
    fail_job_reads: AtomicBool,
    fail_job_writes: AtomicBool,
    /// 1-based task lookup call that fails (0 = never).
    fail_task_call: AtomicUsize,
    delay_ms: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, State>> {
        self.state
            .lock()
            .map_err(|e| OutreachError::store(format!("memory store poisoned: {e}")))
    }

    pub fn add_site(&self, site: Site) {
        if let Ok(mut s) = self.lock() {
            s.sites.push(site);
        }
    }

    pub fn add_candidate(&self, candidate: Candidate) {
        if let Ok(mut s) = self.lock() {
            s.candidates.push(candidate);
        }
    }

    pub fn add_task(&self, site_id: &str, stage: &str, lead_id: &str, status: &str) {
        if let Ok(mut s) = self.lock() {
            s.tasks.push((
                site_id.to_string(),
                stage.to_string(),
                LeadTask {
                    lead_id: lead_id.to_string(),
                    status: status.to_string(),
                },
            ));
        }
    }

    pub fn put_job(&self, record: JobStatusRecord) {
        if let Ok(mut s) = self.lock() {
            s.jobs
                .insert((record.site_id.clone(), record.job_type.clone()), record);
        }
    }

    pub fn job(&self, site_id: &str, job_type: &str) -> Option<JobStatusRecord> {
        self.lock()
            .ok()?
            .jobs
            .get(&(site_id.to_string(), job_type.to_string()))
            .cloned()
    }

    pub fn page_calls(&self) -> usize {
        self.page_calls.load(Ordering::Relaxed)
    }

    pub fn count_calls(&self) -> usize {
        self.count_calls.load(Ordering::Relaxed)
    }

    pub fn task_calls(&self) -> usize {
        self.task_calls.load(Ordering::Relaxed)
    }

    pub fn fail_candidates(&self, fail: bool) {
        self.fail_candidates.store(fail, Ordering::Relaxed);
    }

    pub fn fail_job_reads(&self, fail: bool) {
        self.fail_job_reads.store(fail, Ordering::Relaxed);
    }

    pub fn fail_job_writes(&self, fail: bool) {
        self.fail_job_writes.store(fail, Ordering::Relaxed);
    }

    pub fn fail_task_call(&self, call: usize) {
        self.fail_task_call.store(call, Ordering::Relaxed);
    }

    /// Delay every call, to exercise caller timeouts.
    pub fn set_delay(&self, delay: Duration) {
        self.delay_ms
            .store(delay.as_millis() as usize, Ordering::Relaxed);
    }

    async fn pause(&self) {
        let ms = self.delay_ms.load(Ordering::Relaxed);
        if ms > 0 {
            tokio::time::sleep(Duration::from_millis(ms as u64)).await;
        }
    }

    fn matching(
        state: &State,
        site_id: &str,
        status: &str,
        created_before: DateTime<Utc>,
    ) -> Vec<Candidate> {
        let mut rows: Vec<Candidate> = state
            .candidates
            .iter()
            .filter(|c| c.site_id == site_id && c.status == status && c.created_at < created_before)
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        rows
    }
}

#[async_trait]
impl OutreachStore for MemoryStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn list_sites(&self) -> Result<Vec<Site>> {
        self.pause().await;
        Ok(self.lock()?.sites.clone())
    }

    async fn count_candidates(
        &self,
        site_id: &str,
        status: &str,
        created_before: DateTime<Utc>,
    ) -> Result<u64> {
        self.pause().await;
        self.count_calls.fetch_add(1, Ordering::Relaxed);
        if self.fail_candidates.load(Ordering::Relaxed) {
            return Err(OutreachError::store("count_candidates: connection refused"));
        }
        let state = self.lock()?;
        Ok(Self::matching(&state, site_id, status, created_before).len() as u64)
    }

    async fn fetch_candidates_page(
        &self,
        site_id: &str,
        status: &str,
        created_before: DateTime<Utc>,
        offset: u64,
        limit: u32,
    ) -> Result<Vec<Candidate>> {
        self.pause().await;
        self.page_calls.fetch_add(1, Ordering::Relaxed);
        if self.fail_candidates.load(Ordering::Relaxed) {
            return Err(OutreachError::store("fetch_candidates_page: connection refused"));
        }
        let state = self.lock()?;
        Ok(Self::matching(&state, site_id, status, created_before)
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .collect())
    }

    async fn fetch_tasks_by_lead_ids(
        &self,
        site_id: &str,
        stage: &str,
        lead_ids: &[String],
    ) -> Result<Vec<LeadTask>> {
        self.pause().await;
        let call = self.task_calls.fetch_add(1, Ordering::Relaxed) + 1;
        if lead_ids.len() > MAX_LEAD_IDS_PER_LOOKUP {
            return Err(OutreachError::invalid(format!(
                "{} lead ids exceed the lookup limit of {MAX_LEAD_IDS_PER_LOOKUP}",
                lead_ids.len()
            )));
        }
        if self.fail_task_call.load(Ordering::Relaxed) == call {
            return Err(OutreachError::store("fetch_tasks_by_lead_ids: query too long"));
        }
        let state = self.lock()?;
        Ok(state
            .tasks
            .iter()
            .filter(|(s, st, t)| s == site_id && st == stage && lead_ids.contains(&t.lead_id))
            .map(|(_, _, t)| t.clone())
            .collect())
    }

    async fn get_job_status(
        &self,
        site_id: &str,
        job_type: &str,
    ) -> Result<Option<JobStatusRecord>> {
        self.pause().await;
        if self.fail_job_reads.load(Ordering::Relaxed) {
            return Err(OutreachError::store("get_job_status: connection refused"));
        }
        Ok(self
            .lock()?
            .jobs
            .get(&(site_id.to_string(), job_type.to_string()))
            .cloned())
    }

    async fn upsert_job_status(&self, record: &JobStatusRecord) -> Result<()> {
        self.pause().await;
        if self.fail_job_writes.load(Ordering::Relaxed) {
            return Err(OutreachError::store("upsert_job_status: connection refused"));
        }
        self.lock()?.jobs.insert(
            (record.site_id.clone(), record.job_type.clone()),
            record.clone(),
        );
        Ok(())
    }
}
