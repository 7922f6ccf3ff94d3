//! Static profile per known job type.

use crate::lanes::Lane;

/// How quickly a job type is expected to finish; sets its staleness bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Criticality {
    /// Frequent sync jobs.
    FastSync,
    /// Once-a-day business jobs.
    Daily,
    /// Housekeeping.
    Maintenance,
}

impl Criticality {
    pub fn stale_after_hours(&self) -> u32 {
        match self {
            Criticality::FastSync => 6,
            Criticality::Daily => 24,
            Criticality::Maintenance => 48,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct JobProfile {
    pub job_type: String,
    pub lane: Lane,
    pub criticality: Criticality,
}

impl JobProfile {
    pub fn new(job_type: &str, lane: Lane, criticality: Criticality) -> Self {
        Self {
            job_type: job_type.to_string(),
            lane,
            criticality,
        }
    }
}

/// Used when a job type has no profile.
pub const DEFAULT_STALE_AFTER_HOURS: u32 = 24;

const BUILTIN: &[(&str, Lane, Criticality)] = &[
    ("customer_reply", Lane::Critical, Criticality::FastSync),
    ("lead_follow_up", Lane::High, Criticality::Daily),
    ("email_sync", Lane::High, Criticality::FastSync),
    ("whatsapp_sync", Lane::High, Criticality::FastSync),
    ("daily_prospection", Lane::Normal, Criticality::Daily),
    ("lead_qualification", Lane::Normal, Criticality::Daily),
    ("lead_generation", Lane::Low, Criticality::Daily),
    ("analytics_report", Lane::Low, Criticality::Daily),
    ("data_cleanup", Lane::Background, Criticality::Maintenance),
    ("stuck_job_cleanup", Lane::Background, Criticality::Maintenance),
];

#[derive(Debug, Clone)]
pub struct JobRegistry {
    profiles: Vec<JobProfile>,
}

impl JobRegistry {
    pub fn new(profiles: Vec<JobProfile>) -> Self {
        Self { profiles }
    }

    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    pub fn builtin() -> Self {
        Self::new(
            BUILTIN
                .iter()
                .map(|(job_type, lane, criticality)| JobProfile::new(job_type, *lane, *criticality))
                .collect(),
        )
    }

    /// Exact job type match; misspellings are not corrected.
    pub fn get(&self, job_type: &str) -> Option<&JobProfile> {
        self.profiles.iter().find(|p| p.job_type == job_type)
    }

    pub fn lane_for(&self, job_type: &str) -> Option<Lane> {
        self.get(job_type).map(|p| p.lane)
    }

    pub fn stale_after_hours(&self, job_type: &str) -> u32 {
        self.get(job_type)
            .map(|p| p.criticality.stale_after_hours())
            .unwrap_or(DEFAULT_STALE_AFTER_HOURS)
    }

    pub fn job_types(&self) -> impl Iterator<Item = &str> {
        self.profiles.iter().map(|p| p.job_type.as_str())
    }
}

impl Default for JobRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}
