//! Candidate paginator — walks the candidate set oldest-first, page by page,
//! until enough eligible leads are found or the search budget runs out.

use std::time::Duration;

use chrono::{DateTime, Utc};
use outreach_core::config::{LeadSearchConfig, OutreachConfig};
use outreach_core::types::STATUS_NEW;
use outreach_core::{Candidate, OutreachError, Result, SharedStore, timed};
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::eligibility::EligibilityFilter;

/// Why the search loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    FoundLeads,
    MaxPagesReached,
    NoMorePages,
}

impl std::fmt::Display for StopReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StopReason::FoundLeads => write!(f, "found_leads"),
            StopReason::MaxPagesReached => write!(f, "max_pages_reached"),
            StopReason::NoMorePages => write!(f, "no_more_pages"),
        }
    }
}

/// Search request for one site.
#[derive(Debug, Clone)]
pub struct SearchParams {
    pub site_id: String,
    pub hours_threshold: u32,
    pub page_size: u32,
    pub max_pages: u32,
    pub min_leads_required: u32,
}

impl SearchParams {
    pub fn from_config(site_id: &str, config: &LeadSearchConfig) -> Self {
        Self {
            site_id: site_id.to_string(),
            hours_threshold: config.hours_threshold,
            page_size: config.page_size,
            max_pages: config.max_pages,
            min_leads_required: config.min_leads_required,
        }
    }

    fn validate(&self) -> Result<()> {
        outreach_core::error::require_id("site_id", &self.site_id)?;
        if self.page_size == 0 {
            return Err(OutreachError::invalid("page_size must be > 0"));
        }
        if self.max_pages == 0 {
            return Err(OutreachError::invalid("max_pages must be > 0"));
        }
        Ok(())
    }
}

/// One fetched page.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PageInfo {
    pub offset: u64,
    pub limit: u32,
    /// Derived from the authoritative count, not from the rows returned.
    pub has_more: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchOutcome {
    pub leads: Vec<Candidate>,
    pub pages_searched: u32,
    /// Count reported on the last page fetched.
    pub total_candidates: u64,
    pub stop_reason: StopReason,
    pub pages: Vec<PageInfo>,
    pub excluded_by_task: usize,
    pub excluded_by_company: usize,
}

pub struct CandidatePaginator {
    store: SharedStore,
    filter: EligibilityFilter,
    timeout: Duration,
}

impl CandidatePaginator {
    pub fn new(store: SharedStore, protected_stage: &str, timeout: Duration) -> Self {
        Self {
            filter: EligibilityFilter::new(store.clone(), protected_stage, timeout),
            store,
            timeout,
        }
    }

    pub fn from_config(store: SharedStore, config: &OutreachConfig) -> Self {
        Self::new(store, &config.leads.protected_stage, config.store.timeout())
    }

    pub async fn search(
        &self,
        params: &SearchParams,
        cancel: &CancellationToken,
    ) -> Result<SearchOutcome> {
        self.search_at(params, Utc::now(), cancel).await
    }

    /// Search with an explicit clock.
    pub async fn search_at(
        &self,
        params: &SearchParams,
        now: DateTime<Utc>,
        cancel: &CancellationToken,
    ) -> Result<SearchOutcome> {
        params.validate()?;
        let site_id = params.site_id.as_str();
        let cutoff = now
            .checked_sub_signed(chrono::Duration::hours(i64::from(params.hours_threshold)))
            .ok_or_else(|| {
                OutreachError::invalid(format!(
                    "hours_threshold {} puts the cutoff out of range",
                    params.hours_threshold
                ))
            })?;
        let page_size = params.page_size;
        let wanted = params.min_leads_required as usize;

        let mut leads = Vec::new();
        let mut pages = Vec::new();
        let mut excluded_by_task = 0;
        let mut excluded_by_company = 0;
        let mut page: u32 = 0;

        loop {
            if cancel.is_cancelled() {
                return Err(OutreachError::Cancelled(format!(
                    "lead search for site {site_id} after {page} pages"
                )));
            }

            let total = timed(
                "count_candidates",
                self.timeout,
                self.store.count_candidates(site_id, STATUS_NEW, cutoff),
            )
            .await?;

            let offset = u64::from(page) * u64::from(page_size);
            let mut rows = timed(
                "fetch_candidates_page",
                self.timeout,
                self.store
                    .fetch_candidates_page(site_id, STATUS_NEW, cutoff, offset, page_size),
            )
            .await?;

            if rows.len() > page_size as usize {
                tracing::warn!(
                    "⚠️ [{}] store returned {} rows for a page of {}, truncating",
                    site_id,
                    rows.len(),
                    page_size
                );
                rows.truncate(page_size as usize);
            }
            let fetched = rows.len();
            rows.retain(|c| c.site_id == site_id && c.status == STATUS_NEW && c.created_at < cutoff);
            if rows.len() < fetched {
                tracing::warn!(
                    "⚠️ [{}] dropped {} rows outside the base predicate",
                    site_id,
                    fetched - rows.len()
                );
            }

            let report = self.filter.filter_with_report(rows, site_id).await?;
            excluded_by_task += report.excluded_by_task;
            excluded_by_company += report.excluded_by_company;
            leads.extend(report.eligible);

            let has_more = offset + u64::from(page_size) < total;
            pages.push(PageInfo {
                offset,
                limit: page_size,
                has_more,
            });
            tracing::debug!(
                "📄 [{}] page {} (offset {}): {} fetched, {} eligible so far, {} total",
                site_id,
                page,
                offset,
                fetched,
                leads.len(),
                total
            );

            let stop = if leads.len() >= wanted {
                Some(StopReason::FoundLeads)
            } else if page + 1 >= params.max_pages {
                Some(StopReason::MaxPagesReached)
            } else if !has_more {
                Some(StopReason::NoMorePages)
            } else {
                None
            };

            if let Some(stop_reason) = stop {
                let pages_searched = page + 1;
                tracing::info!(
                    "🎯 [{}] lead search done: {} leads, {} pages, {}",
                    site_id,
                    leads.len(),
                    pages_searched,
                    stop_reason
                );
                return Ok(SearchOutcome {
                    leads,
                    pages_searched,
                    total_candidates: total,
                    stop_reason,
                    pages,
                    excluded_by_task,
                    excluded_by_company,
                });
            }
            page += 1;
        }
    }
}
