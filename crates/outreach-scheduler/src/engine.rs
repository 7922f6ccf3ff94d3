//! Outreach engine — the per-site sweep that ties decision, guard, search and
//! routing together, plus the interval loop that runs it.
//!
//! ```text
//! run_sweep(job_type)
//!   └── list_sites → active only
//!         └── per site (buffer_unordered)
//!               decide → guard → begin → search → route → queue → complete
//! ```

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::StreamExt;
use outreach_core::{
    JobStatus, JobStatusRecord, OutreachConfig, OutreachError, Report, Result, SharedStore, Site,
    timed,
};
use outreach_leads::{CandidatePaginator, SearchParams, StopReason};
use serde::Serialize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::decision::{DecisionOptions, SchedulingDecisionEngine};
use crate::guard::{GuardVerdict, StuckJobGuard};
use crate::lanes::{Lane, LaneScheduler, LaneTask};
use crate::registry::JobRegistry;
use crate::router::{PriorityTaskRouter, RoutingSignals};
use crate::tracker::JobTracker;

/// What to sweep.
#[derive(Debug, Clone)]
pub struct SweepOptions {
    pub job_type: String,
    /// Lane name overriding the registry (case-insensitive).
    pub explicit_priority: Option<String>,
    /// ORed with `[sweep] force_schedule_all`.
    pub force_schedule_all: bool,
}

impl SweepOptions {
    pub fn new(job_type: &str) -> Self {
        Self {
            job_type: job_type.to_string(),
            explicit_priority: None,
            force_schedule_all: false,
        }
    }

    pub fn with_priority(mut self, priority: &str) -> Self {
        self.explicit_priority = Some(priority.to_string());
        self
    }

    pub fn forced(mut self) -> Self {
        self.force_schedule_all = true;
        self
    }
}

/// Outcome for one site.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SiteStatus {
    /// Decision said not now.
    Skipped,
    /// Another run is in flight.
    Blocked,
    Queued {
        task_id: String,
        lane: Lane,
        leads: usize,
        /// Selected leads, oldest first.
        lead_ids: Vec<String>,
    },
    NoLeads,
    Failed,
    Cancelled,
}

#[derive(Debug, Clone, Serialize)]
pub struct SiteResult {
    pub site_id: String,
    #[serde(flatten)]
    pub status: SiteStatus,
    pub reason: String,
    pub stop_reason: Option<StopReason>,
    pub pages_searched: u32,
}

impl SiteResult {
    fn new(site_id: &str, status: SiteStatus, reason: impl Into<String>) -> Self {
        Self {
            site_id: site_id.to_string(),
            status,
            reason: reason.into(),
            stop_reason: None,
            pages_searched: 0,
        }
    }
}

pub type SweepReport = Report<SiteResult>;

/// Per-sweep inputs shared by every site.
struct SiteRun<'a> {
    job_type: &'a str,
    explicit: Option<Lane>,
    decisions: &'a SchedulingDecisionEngine,
    now: DateTime<Utc>,
    next_run: DateTime<Utc>,
}

pub struct OutreachEngine {
    store: SharedStore,
    config: OutreachConfig,
    registry: JobRegistry,
    guard: StuckJobGuard,
    paginator: CandidatePaginator,
    router: PriorityTaskRouter,
    tracker: JobTracker,
    lanes: LaneScheduler,
}

impl OutreachEngine {
    pub fn new(store: SharedStore, config: OutreachConfig) -> Self {
        Self::with_registry(store, config, JobRegistry::builtin())
    }

    pub fn with_registry(store: SharedStore, config: OutreachConfig, registry: JobRegistry) -> Self {
        let timeout = config.store.timeout();
        Self {
            guard: StuckJobGuard::new(store.clone(), registry.clone(), timeout),
            paginator: CandidatePaginator::from_config(store.clone(), &config),
            router: PriorityTaskRouter::new(registry.clone()),
            tracker: JobTracker::new(store.clone(), timeout),
            lanes: LaneScheduler::new(),
            store,
            config,
            registry,
        }
    }

    /// Queue holding the work selected by past sweeps.
    pub fn lanes(&self) -> &LaneScheduler {
        &self.lanes
    }

    pub fn router(&self) -> &PriorityTaskRouter {
        &self.router
    }

    pub fn tracker(&self) -> &JobTracker {
        &self.tracker
    }

    pub fn config(&self) -> &OutreachConfig {
        &self.config
    }

    pub async fn run_sweep(
        &self,
        options: &SweepOptions,
        cancel: &CancellationToken,
    ) -> Result<SweepReport> {
        self.run_sweep_at(options, Utc::now(), cancel).await
    }

    /// Sweep every active site with an explicit clock. Only a failure to list
    /// sites fails the sweep; everything else lands in the report.
    pub async fn run_sweep_at(
        &self,
        options: &SweepOptions,
        now: DateTime<Utc>,
        cancel: &CancellationToken,
    ) -> Result<SweepReport> {
        outreach_core::error::require_id("job_type", &options.job_type)?;
        let spacing = self.config.scheduling.min_hours_between_runs;
        let next_run = now
            .checked_add_signed(chrono::Duration::hours(i64::from(spacing)))
            .ok_or_else(|| {
                OutreachError::invalid(format!(
                    "min_hours_between_runs {spacing} puts the next run out of range"
                ))
            })?;

        let sites = timed("list_sites", self.config.store.timeout(), self.store.list_sites()).await?;
        let sites: Vec<Site> = sites.into_iter().filter(|s| s.active).collect();

        let mut decision_options = DecisionOptions::from_config(&self.config);
        decision_options.force_schedule_all |= options.force_schedule_all;
        let decisions = SchedulingDecisionEngine::new(decision_options);

        let explicit = options.explicit_priority.as_deref().and_then(|name| {
            let lane = Lane::parse(name);
            if lane.is_none() {
                tracing::warn!("⚠️ Ignoring unknown priority '{}' for sweep", name);
            }
            lane
        });

        tracing::info!(
            "🔄 Sweep '{}' over {} active sites (store: {})",
            options.job_type,
            sites.len(),
            self.store.name()
        );

        let run = SiteRun {
            job_type: &options.job_type,
            explicit,
            decisions: &decisions,
            now,
            next_run,
        };
        let concurrency = self.config.sweep.concurrency.max(1);
        let pending: Vec<_> = sites.iter().map(|site| self.sweep_site(site, &run, cancel)).collect();
        let per_site: Vec<SweepReport> = futures::stream::iter(pending)
            .buffer_unordered(concurrency)
            .collect()
            .await;

        let mut report = SweepReport::new();
        for site_report in per_site {
            report.merge(site_report);
        }
        report.results.sort_by(|a, b| a.site_id.cmp(&b.site_id));

        let queued = report
            .results
            .iter()
            .filter(|r| matches!(r.status, SiteStatus::Queued { .. }))
            .count();
        tracing::info!(
            "✅ Sweep '{}' done: {} queued, {} sites, {} warnings",
            options.job_type,
            queued,
            report.results.len(),
            report.warnings.len()
        );
        Ok(report)
    }

    async fn sweep_site(
        &self,
        site: &Site,
        run: &SiteRun<'_>,
        cancel: &CancellationToken,
    ) -> SweepReport {
        let mut report = SweepReport::new();
        let site_id = site.id.as_str();
        let (job_type, now) = (run.job_type, run.now);

        if cancel.is_cancelled() {
            report.push(SiteResult::new(site_id, SiteStatus::Cancelled, "sweep cancelled"));
            return report;
        }

        // No decision without the last record. The guard's own fail-open read
        // only matters once the decision has said to run.
        let last = match self.tracker.get(site_id, job_type).await {
            Ok(last) => last,
            Err(e) => {
                report.warn(site_id, "status", e.to_string());
                report.push(SiteResult::new(site_id, SiteStatus::Failed, "job status unavailable"));
                return report;
            }
        };

        let decision = match run.decisions.decide(site, last.as_ref(), now) {
            Ok(decision) => decision,
            Err(e) => {
                report.warn(site_id, "decision", e.to_string());
                report.push(SiteResult::new(site_id, SiteStatus::Failed, e.to_string()));
                return report;
            }
        };
        if !decision.should_schedule {
            report.push(SiteResult::new(site_id, SiteStatus::Skipped, decision.reason));
            return report;
        }

        let stale_after = self.registry.stale_after_hours(job_type);
        let verdict = match self.guard.evaluate_at(job_type, site_id, stale_after, now).await {
            Ok(verdict) => verdict,
            Err(e) => {
                report.warn(site_id, "guard", e.to_string());
                report.push(SiteResult::new(site_id, SiteStatus::Failed, e.to_string()));
                return report;
            }
        };
        if !verdict.can_proceed {
            report.push(SiteResult::new(site_id, SiteStatus::Blocked, verdict.reason));
            return report;
        }
        if verdict.was_stuck {
            report.warn(site_id, "guard", verdict.reason.clone());
        }

        if let Err(e) = self.tracker.begin(site_id, job_type, now).await {
            report.warn(site_id, "status", format!("could not mark running: {e}"));
        }

        let params = SearchParams::from_config(site_id, &self.config.leads);
        let outcome = match self.paginator.search_at(&params, now, cancel).await {
            Ok(outcome) => outcome,
            Err(e) => {
                let status = match e {
                    OutreachError::Cancelled(_) => SiteStatus::Cancelled,
                    _ => SiteStatus::Failed,
                };
                report.warn(site_id, "search", e.to_string());
                if let Err(write) = self.tracker.fail(site_id, job_type, now).await {
                    report.warn(site_id, "status", format!("could not mark failed: {write}"));
                }
                report.push(SiteResult::new(site_id, status, e.to_string()));
                return report;
            }
        };

        let mut result = if outcome.leads.is_empty() {
            SiteResult::new(
                site_id,
                SiteStatus::NoLeads,
                format!("no eligible leads ({})", outcome.stop_reason),
            )
        } else {
            let signals = routing_signals(last.as_ref(), &verdict);
            let route = self.router.route_with_signals(job_type, run.explicit, &signals);
            let lead_ids = outcome.leads.iter().map(|c| c.id.clone()).collect::<Vec<_>>();
            let task = LaneTask::new(route.lane, site_id, job_type, lead_ids.clone());
            let task_id = task.id.clone();
            self.lanes.submit(task).await;
            SiteResult::new(
                site_id,
                SiteStatus::Queued {
                    task_id,
                    lane: route.lane,
                    leads: lead_ids.len(),
                    lead_ids,
                },
                decision.reason,
            )
        };
        result.stop_reason = Some(outcome.stop_reason);
        result.pages_searched = outcome.pages_searched;

        if let Err(e) = self.tracker.complete(site_id, job_type, Some(run.next_run), now).await {
            report.warn(site_id, "status", format!("could not mark completed: {e}"));
        }

        report.push(result);
        report
    }
}

fn routing_signals(last: Option<&JobStatusRecord>, verdict: &GuardVerdict) -> RoutingSignals {
    RoutingSignals {
        is_retry: last.is_some_and(|r| r.status == JobStatus::Failed) || verdict.was_stuck,
        hours_stuck: if verdict.was_stuck {
            verdict.hours_stuck
        } else {
            None
        },
        ..Default::default()
    }
}

/// Run sweeps on an interval until `cancel` fires. After each sweep the lanes
/// are drained into `tasks`, so the queue never outlives one tick.
pub async fn spawn_sweeper(
    engine: Arc<OutreachEngine>,
    options: SweepOptions,
    every: Duration,
    cancel: CancellationToken,
    tasks: mpsc::Sender<LaneTask>,
) {
    tracing::info!(
        "⏰ Sweeper started for '{}' (every {}s)",
        options.job_type,
        every.as_secs()
    );
    let mut interval = tokio::time::interval(every);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("🛑 Sweeper for '{}' stopped", options.job_type);
                break;
            }
            _ = interval.tick() => {
                match engine.run_sweep(&options, &cancel).await {
                    Ok(report) => {
                        for w in &report.warnings {
                            tracing::warn!("⚠️ [{}] {}: {}", w.site_id, w.stage, w.message);
                        }
                    }
                    Err(e) => tracing::error!("❌ Sweep '{}' failed: {e}", options.job_type),
                }
                for task in engine.lanes().drain().await {
                    if tasks.send(task).await.is_err() {
                        tracing::warn!(
                            "⚠️ Task receiver closed, stopping sweeper for '{}'",
                            options.job_type
                        );
                        return;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;
    use outreach_core::Candidate;
    use outreach_core::memory_store::MemoryStore;
    use serde_json::json;

    const JOB: &str = "daily_prospection";

    fn now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-03-01T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    fn email_site(id: &str) -> Site {
        Site::new(id, id).with_channels(json!([{"type": "email", "from_address": "hi@acme.io"}]))
    }

    fn seeded() -> Arc<MemoryStore> {
        let store = Arc::new(MemoryStore::new());
        store.add_site(email_site("s1"));
        for i in 0..3 {
            store.add_candidate(Candidate::new(
                &format!("l{i}"),
                "s1",
                now() - ChronoDuration::days(3) + ChronoDuration::minutes(i),
            ));
        }
        store
    }

    fn engine(store: Arc<MemoryStore>) -> OutreachEngine {
        OutreachEngine::new(store, OutreachConfig::default())
    }

    #[tokio::test]
    async fn test_sweep_queues_selected_leads() {
        let store = seeded();
        let engine = engine(store.clone());
        let report = engine
            .run_sweep_at(&SweepOptions::new(JOB), now(), &CancellationToken::new())
            .await
            .unwrap();

        assert!(report.is_clean(), "{:?}", report.warnings);
        let result = &report.results[0];
        match &result.status {
            SiteStatus::Queued { lane, leads, lead_ids, .. } => {
                assert_eq!(*lane, Lane::Normal);
                assert_eq!(*leads, 3);
                assert_eq!(lead_ids, &vec!["l0", "l1", "l2"]);
            }
            other => panic!("expected queued, got {other:?}"),
        }
        let json = serde_json::to_value(result).unwrap();
        assert_eq!(json["status"], "queued");
        assert_eq!(json["lead_ids"], json!(["l0", "l1", "l2"]));
        assert_eq!(result.stop_reason, Some(StopReason::FoundLeads));

        let task = engine.lanes().next().await.unwrap();
        assert_eq!(task.lead_ids, vec!["l0", "l1", "l2"]);
        assert_eq!(task.site_id, "s1");

        let rec = store.job("s1", JOB).unwrap();
        assert_eq!(rec.status, JobStatus::Completed);
        assert_eq!(rec.last_run, Some(now()));
        assert_eq!(rec.next_run, Some(now() + ChronoDuration::hours(3)));
    }

    #[tokio::test]
    async fn test_sites_without_channel_or_inactive() {
        let store = seeded();
        store.add_site(Site::new("s2", "no channels"));
        let mut off = email_site("s3");
        off.active = false;
        store.add_site(off);

        let report = engine(store)
            .run_sweep_at(&SweepOptions::new(JOB), now(), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(report.results.len(), 2);
        let s2 = report.results.iter().find(|r| r.site_id == "s2").unwrap();
        assert_eq!(s2.status, SiteStatus::Skipped);
        assert_eq!(s2.reason, "no valid delivery channel configured");
    }

    #[tokio::test]
    async fn test_running_job_blocks_site() {
        let store = seeded();
        let mut rec = JobStatusRecord::new("s1", JOB, JobStatus::Running, now());
        rec.last_run = Some(now() - ChronoDuration::minutes(5));
        store.put_job(rec);

        let report = engine(store)
            .run_sweep_at(&SweepOptions::new(JOB), now(), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(report.results[0].status, SiteStatus::Blocked);
    }

    #[tokio::test]
    async fn test_stuck_job_is_recovered_and_escalated() {
        let store = seeded();
        let mut rec = JobStatusRecord::new("s1", JOB, JobStatus::Running, now());
        rec.last_run = Some(now() - ChronoDuration::hours(30));
        store.put_job(rec);

        let report = engine(store)
            .run_sweep_at(&SweepOptions::new(JOB), now(), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(report.warnings_for("s1").count(), 1);
        assert!(matches!(
            report.results[0].status,
            SiteStatus::Queued { lane: Lane::High, .. }
        ));
    }

    #[tokio::test]
    async fn test_search_failure_marks_job_failed() {
        let store = seeded();
        store.fail_candidates(true);
        let report = engine(store.clone())
            .run_sweep_at(&SweepOptions::new(JOB), now(), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(report.results[0].status, SiteStatus::Failed);
        assert_eq!(report.warnings[0].stage, "search");
        let rec = store.job("s1", JOB).unwrap();
        assert_eq!(rec.status, JobStatus::Failed);
        assert_eq!(rec.retry_count, 1);
    }

    #[tokio::test]
    async fn test_retry_raises_lane_and_explicit_wins() {
        let store = seeded();
        let mut rec = JobStatusRecord::new("s1", JOB, JobStatus::Failed, now());
        rec.last_run = Some(now() - ChronoDuration::hours(1));
        rec.retry_count = 1;
        store.put_job(rec);

        let report = engine(store.clone())
            .run_sweep_at(&SweepOptions::new(JOB), now(), &CancellationToken::new())
            .await
            .unwrap();
        assert!(matches!(
            report.results[0].status,
            SiteStatus::Queued { lane: Lane::High, .. }
        ));

        let options = SweepOptions::new(JOB).with_priority("background").forced();
        let report = engine(store)
            .run_sweep_at(&options, now(), &CancellationToken::new())
            .await
            .unwrap();
        assert!(matches!(
            report.results[0].status,
            SiteStatus::Queued { lane: Lane::Background, .. }
        ));
    }

    #[tokio::test]
    async fn test_no_leads() {
        let store = Arc::new(MemoryStore::new());
        store.add_site(email_site("s1"));
        let report = engine(store.clone())
            .run_sweep_at(&SweepOptions::new(JOB), now(), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(report.results[0].status, SiteStatus::NoLeads);
        assert_eq!(report.results[0].stop_reason, Some(StopReason::NoMorePages));
        assert_eq!(store.job("s1", JOB).unwrap().status, JobStatus::Completed);
    }

    #[tokio::test]
    async fn test_cancelled_sweep() {
        let store = seeded();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let report = engine(store.clone())
            .run_sweep_at(&SweepOptions::new(JOB), now(), &cancel)
            .await
            .unwrap();
        assert_eq!(report.results[0].status, SiteStatus::Cancelled);
        assert!(store.job("s1", JOB).is_none());
    }

    #[tokio::test]
    async fn test_list_sites_timeout_fails_sweep() {
        let store = seeded();
        store.set_delay(Duration::from_millis(200));
        let mut config = OutreachConfig::default();
        config.store.timeout_ms = 20;
        let err = OutreachEngine::new(store, config)
            .run_sweep_at(&SweepOptions::new(JOB), now(), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, OutreachError::Timeout { .. }));
    }

    #[tokio::test]
    async fn test_sweeper_hands_off_tasks_and_stops_on_cancel() {
        let store = seeded();
        let engine = Arc::new(engine(store));
        let cancel = CancellationToken::new();
        let (tx, mut rx) = mpsc::channel(8);
        let handle = tokio::spawn(spawn_sweeper(
            engine.clone(),
            SweepOptions::new(JOB),
            Duration::from_secs(3600),
            cancel.clone(),
            tx,
        ));

        // first tick fires immediately
        let task = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(task.site_id, "s1");
        assert_eq!(task.lead_ids, vec!["l0", "l1", "l2"]);
        assert_eq!(engine.lanes().total_pending().await, 0);

        cancel.cancel();
        handle.await.unwrap();
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_repeated_sweeps_do_not_accumulate_under_sweeper() {
        let store = seeded();
        let engine = Arc::new(engine(store));
        let cancel = CancellationToken::new();
        let (tx, mut rx) = mpsc::channel(8);
        let options = SweepOptions::new(JOB).forced();
        let handle = tokio::spawn(spawn_sweeper(
            engine.clone(),
            options,
            Duration::from_millis(20),
            cancel.clone(),
            tx,
        ));

        for _ in 0..3 {
            tokio::time::timeout(Duration::from_secs(5), rx.recv())
                .await
                .unwrap()
                .unwrap();
        }
        cancel.cancel();
        handle.await.unwrap();
        assert_eq!(engine.lanes().stats().await.iter().map(|s| s.queued).sum::<usize>(), 0);
    }

    #[tokio::test]
    async fn test_unreadable_status_fails_site_without_writes() {
        let store = seeded();
        store.fail_job_reads(true);
        let report = engine(store.clone())
            .run_sweep_at(&SweepOptions::new(JOB), now(), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(report.results[0].status, SiteStatus::Failed);
        assert_eq!(report.warnings[0].stage, "status");
        assert_eq!(store.page_calls(), 0);
        assert!(store.job("s1", JOB).is_none());
    }

    #[tokio::test]
    async fn test_out_of_range_spacing_is_invalid_input() {
        let store = seeded();
        let mut config = OutreachConfig::default();
        config.scheduling.min_hours_between_runs = u32::MAX;
        let err = OutreachEngine::new(store.clone(), config)
            .run_sweep_at(&SweepOptions::new(JOB), now(), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, OutreachError::InvalidInput(_)));
        assert!(store.job("s1", JOB).is_none());
    }
}
