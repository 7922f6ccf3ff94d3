//! Eligibility filter — two sequential exclusion stages over one page.
//!
//! Stage A drops candidates already engaged in the protected pipeline stage.
//! Stage B drops every candidate of a company that someone already owns.
//! Any failed lookup fails the whole call: eligibility is never computed over
//! a partial view.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use futures::future::try_join_all;
use outreach_core::traits::store::MAX_LEAD_IDS_PER_LOOKUP;
use outreach_core::types::TASK_PENDING;
use outreach_core::{Candidate, OutreachError, Result, SharedStore, timed};

use crate::company::CompanyKey;

/// Eligible candidates plus per-stage exclusion counts.
#[derive(Debug, Clone, Default)]
pub struct FilterReport {
    pub eligible: Vec<Candidate>,
    pub excluded_by_task: usize,
    pub excluded_by_company: usize,
}

pub struct EligibilityFilter {
    store: SharedStore,
    protected_stage: String,
    timeout: Duration,
}

impl EligibilityFilter {
    pub fn new(store: SharedStore, protected_stage: &str, timeout: Duration) -> Self {
        Self {
            store,
            protected_stage: protected_stage.to_string(),
            timeout,
        }
    }

    /// Eligible subset of `candidates`, in input order.
    pub async fn filter(&self, candidates: Vec<Candidate>, site_id: &str) -> Result<Vec<Candidate>> {
        Ok(self.filter_with_report(candidates, site_id).await?.eligible)
    }

    pub async fn filter_with_report(
        &self,
        candidates: Vec<Candidate>,
        site_id: &str,
    ) -> Result<FilterReport> {
        outreach_core::error::require_id("site_id", site_id)?;
        if candidates.is_empty() {
            return Ok(FilterReport::default());
        }

        // Stage A
        let ids: Vec<String> = candidates.iter().map(|c| c.id.clone()).collect();
        let engaged = self.engaged_leads(site_id, &ids).await?;
        let before = candidates.len();
        let remaining: Vec<Candidate> = candidates
            .into_iter()
            .filter(|c| !engaged.contains(&c.id))
            .collect();
        let excluded_by_task = before - remaining.len();

        // Stage B
        let (eligible, excluded_by_company) = exclude_assigned_companies(remaining);

        tracing::debug!(
            "🔎 [{}] eligibility: {} in, {} task-excluded, {} company-excluded, {} eligible",
            site_id,
            before,
            excluded_by_task,
            excluded_by_company,
            eligible.len()
        );

        Ok(FilterReport {
            eligible,
            excluded_by_task,
            excluded_by_company,
        })
    }

    /// Lead ids with a non-pending task in the protected stage.
    async fn engaged_leads(&self, site_id: &str, ids: &[String]) -> Result<HashSet<String>> {
        let batches: Vec<&[String]> = ids.chunks(MAX_LEAD_IDS_PER_LOOKUP).collect();
        let total = batches.len();

        let lookups = batches.into_iter().enumerate().map(|(idx, batch)| async move {
            timed(
                "fetch_tasks_by_lead_ids",
                self.timeout,
                self.store
                    .fetch_tasks_by_lead_ids(site_id, &self.protected_stage, batch),
            )
            .await
            .map_err(|e| {
                if total > 1 {
                    OutreachError::PartialBatchFailure {
                        batch: idx + 1,
                        batches: total,
                        reason: e.to_string(),
                    }
                } else {
                    e
                }
            })
        });

        let results = try_join_all(lookups).await?;
        Ok(results
            .into_iter()
            .flatten()
            .filter(|task| !task.status.trim().eq_ignore_ascii_case(TASK_PENDING))
            .map(|task| task.lead_id)
            .collect())
    }
}

/// Drop every company group containing an assigned candidate.
///
/// Returns the kept candidates (input order) and the number dropped.
pub fn exclude_assigned_companies(candidates: Vec<Candidate>) -> (Vec<Candidate>, usize) {
    let keys: Vec<CompanyKey> = candidates.iter().map(CompanyKey::of).collect();

    let mut owned: HashMap<&CompanyKey, bool> = HashMap::new();
    for (key, candidate) in keys.iter().zip(&candidates) {
        if key.is_singleton() {
            continue;
        }
        let entry = owned.entry(key).or_insert(false);
        *entry |= candidate.is_assigned();
    }

    let before = candidates.len();
    let kept: Vec<Candidate> = candidates
        .iter()
        .zip(&keys)
        .filter(|(candidate, key)| {
            if key.is_singleton() {
                !candidate.is_assigned()
            } else {
                !owned.get(key).copied().unwrap_or(false)
            }
        })
        .map(|(candidate, _)| candidate.clone())
        .collect();
    let dropped = before - kept.len();
    (kept, dropped)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration as ChronoDuration, Utc};
    use outreach_core::memory_store::MemoryStore;
    use proptest::prelude::*;
    use std::sync::Arc;

    fn lead(id: &str) -> Candidate {
        Candidate::new(id, "s1", Utc::now() - ChronoDuration::days(5))
    }

    fn filter_over(store: Arc<MemoryStore>) -> EligibilityFilter {
        EligibilityFilter::new(store, "awareness", Duration::from_secs(1))
    }

    #[tokio::test]
    async fn test_pending_task_does_not_block() {
        let store = Arc::new(MemoryStore::new());
        store.add_task("s1", "awareness", "l1", "pending");
        store.add_task("s1", "awareness", "l2", "in_progress");
        store.add_task("s1", "consideration", "l3", "in_progress");

        let out = filter_over(store)
            .filter(vec![lead("l1"), lead("l2"), lead("l3")], "s1")
            .await
            .unwrap();
        let ids: Vec<_> = out.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["l1", "l3"]);
    }

    #[tokio::test]
    async fn test_company_group_excluded_when_any_member_assigned() {
        let store = Arc::new(MemoryStore::new());
        let candidates = vec![
            lead("l1").with_company_name("Acme"),
            lead("l2").with_company_name("acme ").with_assignee("u7"),
            lead("l3").with_company_id("co-2"),
            lead("l4"),
            lead("l5").with_assignee("u1"),
            lead("l6").with_company_name("ACME"),
        ];
        let report = filter_over(store)
            .filter_with_report(candidates, "s1")
            .await
            .unwrap();
        let ids: Vec<_> = report.eligible.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["l3", "l4"]);
        assert_eq!(report.excluded_by_company, 4);
        assert_eq!(report.excluded_by_task, 0);
    }

    #[tokio::test]
    async fn test_lookups_are_batched_by_100() {
        let store = Arc::new(MemoryStore::new());
        let candidates: Vec<_> = (0..250).map(|i| lead(&format!("l{i:03}"))).collect();
        store.add_task("s1", "awareness", "l249", "active");

        let out = filter_over(store.clone()).filter(candidates, "s1").await.unwrap();
        assert_eq!(out.len(), 249);
        assert_eq!(store.task_calls(), 3);
    }

    #[tokio::test]
    async fn test_one_failed_batch_fails_the_call() {
        let store = Arc::new(MemoryStore::new());
        store.fail_task_call(2);
        let candidates: Vec<_> = (0..150).map(|i| lead(&format!("l{i:03}"))).collect();

        let err = filter_over(store).filter(candidates, "s1").await.unwrap_err();
        assert!(matches!(err, OutreachError::PartialBatchFailure { batches: 2, .. }));
    }

    #[tokio::test]
    async fn test_single_batch_failure_is_store_error() {
        let store = Arc::new(MemoryStore::new());
        store.fail_task_call(1);
        let err = filter_over(store)
            .filter(vec![lead("l1")], "s1")
            .await
            .unwrap_err();
        assert!(matches!(err, OutreachError::StoreUnavailable(_)));
    }

    #[tokio::test]
    async fn test_empty_input_skips_store() {
        let store = Arc::new(MemoryStore::new());
        let out = filter_over(store.clone()).filter(Vec::new(), "s1").await.unwrap();
        assert!(out.is_empty());
        assert_eq!(store.task_calls(), 0);
    }

    #[tokio::test]
    async fn test_rejects_missing_site() {
        let store = Arc::new(MemoryStore::new());
        let err = filter_over(store).filter(vec![lead("l1")], "").await.unwrap_err();
        assert!(matches!(err, OutreachError::InvalidInput(_)));
    }

    proptest! {
        #[test]
        fn prop_company_exclusion_is_all_or_nothing(
            rows in proptest::collection::vec((0usize..5, any::<bool>()), 0..40)
        ) {
            let names = ["Acme", "Globex", "Initech", "Umbrella", ""];
            let candidates: Vec<Candidate> = rows
                .iter()
                .enumerate()
                .map(|(i, (company, assigned))| {
                    let mut c = lead(&format!("l{i}")).with_company_name(names[*company]);
                    if *assigned {
                        c = c.with_assignee("u1");
                    }
                    c
                })
                .collect();

            let (kept, dropped) = exclude_assigned_companies(candidates.clone());
            prop_assert_eq!(kept.len() + dropped, candidates.len());

            for c in &candidates {
                let key = CompanyKey::of(c);
                let group: Vec<&Candidate> =
                    candidates.iter().filter(|o| CompanyKey::of(o) == key).collect();
                let kept_in_group = kept.iter().filter(|k| CompanyKey::of(k) == key).count();
                if key.is_singleton() {
                    continue;
                }
                if group.iter().any(|g| g.is_assigned()) {
                    prop_assert_eq!(kept_in_group, 0);
                } else {
                    prop_assert_eq!(kept_in_group, group.len());
                }
            }
            prop_assert!(kept.iter().all(|k| !k.is_assigned()));
        }
    }
}
