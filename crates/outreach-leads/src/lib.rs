//! # Outreach Leads
//!
//! Selects which candidates a site may contact next.
//!
//! ```text
//! CandidatePaginator (sequential pages, oldest first)
//!   ├── count   → authoritative total, drives has_more
//!   ├── page    → OFFSET/LIMIT, created_at asc + id
//!   └── EligibilityFilter
//!         ├── Stage A: non-pending task in protected stage → out
//!         └── Stage B: company with any assignee → whole company out
//! ```

pub mod company;
pub mod eligibility;
pub mod paginator;

pub use company::CompanyKey;
pub use eligibility::{EligibilityFilter, FilterReport, exclude_assigned_companies};
pub use paginator::{CandidatePaginator, PageInfo, SearchOutcome, SearchParams, StopReason};
