//! Per-site decision table on the last recorded job status.
//!
//! Pure: the same site, record, options and clock always produce the same
//! decision. Mutual exclusion is not decided here (see [`crate::guard`]).

use chrono::{DateTime, Utc};
use outreach_core::config::OutreachConfig;
use outreach_core::types::hours_between;
use outreach_core::{JobStatus, JobStatusRecord, Result, Site, has_valid_channel};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DecisionOptions {
    pub max_retries: u32,
    pub retry_delay_minutes: u32,
    pub min_hours_between_runs: u32,
    pub running_stale_hours: u32,
    pub force_schedule_all: bool,
}

impl DecisionOptions {
    pub fn from_config(config: &OutreachConfig) -> Self {
        Self {
            max_retries: config.scheduling.max_retries,
            retry_delay_minutes: config.scheduling.retry_delay_minutes,
            min_hours_between_runs: config.scheduling.min_hours_between_runs,
            running_stale_hours: config.scheduling.running_stale_hours,
            force_schedule_all: config.sweep.force_schedule_all,
        }
    }
}

impl Default for DecisionOptions {
    fn default() -> Self {
        Self::from_config(&OutreachConfig::default())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SchedulingDecision {
    pub should_schedule: bool,
    pub reason: String,
    pub has_valid_prerequisite: bool,
}

impl SchedulingDecision {
    fn run(reason: impl Into<String>) -> Self {
        Self {
            should_schedule: true,
            reason: reason.into(),
            has_valid_prerequisite: true,
        }
    }

    fn wait(reason: impl Into<String>) -> Self {
        Self {
            should_schedule: false,
            reason: reason.into(),
            has_valid_prerequisite: true,
        }
    }
}

/// Decide whether `site` should run its job now.
pub fn decide(
    site: &Site,
    last: Option<&JobStatusRecord>,
    options: &DecisionOptions,
    now: DateTime<Utc>,
) -> Result<SchedulingDecision> {
    outreach_core::error::require_id("site_id", &site.id)?;

    if !has_valid_channel(&site.channels) {
        return Ok(SchedulingDecision {
            should_schedule: false,
            reason: "no valid delivery channel configured".into(),
            has_valid_prerequisite: false,
        });
    }

    if options.force_schedule_all {
        return Ok(SchedulingDecision::run("force scheduling enabled"));
    }

    let Some(record) = last else {
        return Ok(SchedulingDecision::run("needs initial scheduling"));
    };

    Ok(match &record.status {
        JobStatus::Failed => failed(record, options, now),
        JobStatus::Completed => {
            // Spacing is left to the caller's cadence; the value is informational.
            let hours = hours_between(record.started_at(), now);
            SchedulingDecision::run(format!(
                "completed {hours:.1}h ago (min spacing {}h), scheduling next run",
                options.min_hours_between_runs
            ))
        }
        JobStatus::Running => {
            let hours = hours_between(record.started_at(), now);
            if hours > f64::from(options.running_stale_hours) {
                SchedulingDecision::run(format!(
                    "running for {hours:.1}h, likely stuck; scheduling anyway"
                ))
            } else {
                SchedulingDecision::run(format!(
                    "running for {}min, scheduling; overlap is checked before execution",
                    (now - record.started_at()).num_minutes()
                ))
            }
        }
        JobStatus::Scheduled => scheduled(record, options, now),
        JobStatus::Unknown(raw) => {
            SchedulingDecision::run(format!("unknown status '{raw}', needs attention"))
        }
    })
}

fn failed(record: &JobStatusRecord, options: &DecisionOptions, now: DateTime<Utc>) -> SchedulingDecision {
    if record.retry_count >= options.max_retries {
        return SchedulingDecision::run(format!(
            "exceeded max retries ({}/{}), force reschedule",
            record.retry_count, options.max_retries
        ));
    }
    let minutes = (now - record.started_at()).num_minutes();
    let delay = i64::from(options.retry_delay_minutes);
    if minutes >= delay {
        SchedulingDecision::run(format!(
            "ready for retry ({minutes}min since last run, attempt {}/{})",
            record.retry_count.saturating_add(1),
            options.max_retries
        ))
    } else {
        SchedulingDecision::wait(format!("waiting {}min before retry", delay - minutes))
    }
}

fn scheduled(record: &JobStatusRecord, options: &DecisionOptions, now: DateTime<Utc>) -> SchedulingDecision {
    let spacing = f64::from(options.min_hours_between_runs);

    if let Some(next) = record.next_run {
        if next <= now {
            return SchedulingDecision::run(format!(
                "missed scheduled run ({}min overdue)",
                (now - next).num_minutes()
            ));
        }
        let hours_away = hours_between(now, next);
        if hours_away > 2.0 * spacing {
            return SchedulingDecision::run(format!(
                "next run too distant ({hours_away:.1}h away > {:.0}h), reschedule sooner",
                2.0 * spacing
            ));
        }
    }

    if record.last_run.is_none() {
        let age = hours_between(record.created_at, now);
        if age >= spacing {
            return SchedulingDecision::run(format!(
                "scheduled but never executed (created {age:.1}h ago)"
            ));
        }
    }

    match record.next_run {
        Some(next) => SchedulingDecision::wait(format!(
            "waiting for scheduled run in {}min",
            (next - now).num_minutes()
        )),
        None => SchedulingDecision::wait("waiting, no next run recorded yet"),
    }
}

/// Decision engine bound to one set of options.
#[derive(Debug, Clone, Default)]
pub struct SchedulingDecisionEngine {
    options: DecisionOptions,
}

impl SchedulingDecisionEngine {
    pub fn new(options: DecisionOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &DecisionOptions {
        &self.options
    }

    pub fn decide(
        &self,
        site: &Site,
        last: Option<&JobStatusRecord>,
        now: DateTime<Utc>,
    ) -> Result<SchedulingDecision> {
        let decision = decide(site, last, &self.options, now)?;
        tracing::debug!(
            "🗓️ [{}] schedule={} ({})",
            site.id,
            decision.should_schedule,
            decision.reason
        );
        Ok(decision)
    }

    /// Decide for many sites against one clock; order follows the input.
    pub fn decide_all<'a>(
        &self,
        sites: impl IntoIterator<Item = (&'a Site, Option<&'a JobStatusRecord>)>,
        now: DateTime<Utc>,
    ) -> Vec<(String, Result<SchedulingDecision>)> {
        sites
            .into_iter()
            .map(|(site, last)| (site.id.clone(), self.decide(site, last, now)))
            .collect()
    }
}
