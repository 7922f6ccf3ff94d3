//! Company grouping key.
//!
//! Candidates of the same organization are treated as one unit when deciding
//! whether someone already owns the account. Name matching is a fallback and
//! can merge distinct companies that share a generic name.

use outreach_core::Candidate;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CompanyKey {
    Id(String),
    /// Trimmed, lowercased company name.
    Name(String),
    /// No company reference: the candidate stands alone.
    None,
}

impl CompanyKey {
    pub fn of(candidate: &Candidate) -> Self {
        if let Some(id) = non_blank(candidate.company_id.as_deref()) {
            return CompanyKey::Id(id.to_string());
        }
        match non_blank(candidate.company_name.as_deref()) {
            Some(name) => CompanyKey::Name(name.to_lowercase()),
            None => CompanyKey::None,
        }
    }

    pub fn is_singleton(&self) -> bool {
        matches!(self, CompanyKey::None)
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}
