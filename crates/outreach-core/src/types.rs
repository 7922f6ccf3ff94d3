//! Sites, candidates and job status records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Candidate status that makes a lead selectable.
pub const STATUS_NEW: &str = "new";
/// Task status that reserves intent without blocking eligibility.
pub const TASK_PENDING: &str = "pending";

/// A tenant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Site {
    pub id: String,
    pub name: String,
    pub active: bool,
    /// Raw channel configuration as stored (array or keyed object).
    #[serde(default)]
    pub channels: serde_json::Value,
}

impl Site {
    pub fn new(id: &str, name: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            active: true,
            channels: serde_json::Value::Null,
        }
    }

    pub fn with_channels(mut self, channels: serde_json::Value) -> Self {
        self.channels = channels;
        self
    }
}

/// A prospect record eligible for automated outreach.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub id: String,
    pub site_id: String,
    pub created_at: DateTime<Utc>,
    pub status: String,
    pub company_id: Option<String>,
    pub company_name: Option<String>,
    pub assignee_id: Option<String>,
}

impl Candidate {
    pub fn new(id: &str, site_id: &str, created_at: DateTime<Utc>) -> Self {
        Self {
            id: id.to_string(),
            site_id: site_id.to_string(),
            created_at,
            status: STATUS_NEW.to_string(),
            company_id: None,
            company_name: None,
            assignee_id: None,
        }
    }

    pub fn with_company_id(mut self, company_id: &str) -> Self {
        self.company_id = Some(company_id.to_string());
        self
    }

    pub fn with_company_name(mut self, name: &str) -> Self {
        self.company_name = Some(name.to_string());
        self
    }

    pub fn with_assignee(mut self, assignee_id: &str) -> Self {
        self.assignee_id = Some(assignee_id.to_string());
        self
    }

    pub fn with_status(mut self, status: &str) -> Self {
        self.status = status.to_string();
        self
    }

    pub fn is_assigned(&self) -> bool {
        self.assignee_id.as_deref().is_some_and(|a| !a.trim().is_empty())
    }
}

/// Pipeline task attached to a lead, as returned by task-stage lookups.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeadTask {
    pub lead_id: String,
    pub status: String,
}

/// Last known state of a recurring job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobStatus {
    Scheduled,
    Running,
    Completed,
    Failed,
    /// Persisted value this build does not recognize.
    Unknown(String),
}

impl JobStatus {
    pub fn as_str(&self) -> &str {
        match self {
            JobStatus::Scheduled => "SCHEDULED",
            JobStatus::Running => "RUNNING",
            JobStatus::Completed => "COMPLETED",
            JobStatus::Failed => "FAILED",
            JobStatus::Unknown(raw) => raw,
        }
    }

    /// Parse a persisted status (case-insensitive). Never fails.
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_uppercase().as_str() {
            "SCHEDULED" => JobStatus::Scheduled,
            "RUNNING" => JobStatus::Running,
            "COMPLETED" => JobStatus::Completed,
            "FAILED" => JobStatus::Failed,
            _ => JobStatus::Unknown(raw.to_string()),
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unique per (site_id, job_type).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobStatusRecord {
    pub site_id: String,
    pub job_type: String,
    pub status: JobStatus,
    /// Start time of the most recent run.
    pub last_run: Option<DateTime<Utc>>,
    pub next_run: Option<DateTime<Utc>>,
    pub retry_count: u32,
    pub created_at: DateTime<Utc>,
}

impl JobStatusRecord {
    pub fn new(site_id: &str, job_type: &str, status: JobStatus, now: DateTime<Utc>) -> Self {
        Self {
            site_id: site_id.to_string(),
            job_type: job_type.to_string(),
            status,
            last_run: None,
            next_run: None,
            retry_count: 0,
            created_at: now,
        }
    }

    /// Reference point for age checks: last start, else creation.
    pub fn started_at(&self) -> DateTime<Utc> {
        self.last_run.unwrap_or(self.created_at)
    }
}

/// Hours between two instants as a float (negative if `to` precedes `from`).
pub fn hours_between(from: DateTime<Utc>, to: DateTime<Utc>) -> f64 {
    (to - from).num_seconds() as f64 / 3600.0
}
