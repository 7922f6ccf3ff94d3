//! Per-item results collected alongside structured warnings.

use serde::{Deserialize, Serialize};

/// A soft, continuable problem met while processing one site.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SweepWarning {
    pub site_id: String,
    /// Pipeline step that produced the warning (e.g. "search", "guard").
    pub stage: String,
    pub message: String,
}

/// Per-item results collected alongside warnings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report<T> {
    pub results: Vec<T>,
    pub warnings: Vec<SweepWarning>,
}

impl<T> Default for Report<T> {
    fn default() -> Self {
        Self {
            results: Vec::new(),
            warnings: Vec::new(),
        }
    }
}

impl<T> Report<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, result: T) {
        self.results.push(result);
    }

    pub fn warn(&mut self, site_id: &str, stage: &str, message: impl Into<String>) {
        self.warnings.push(SweepWarning {
            site_id: site_id.to_string(),
            stage: stage.to_string(),
            message: message.into(),
        });
    }

    /// Fold another report into this one.
    pub fn merge(&mut self, other: Report<T>) {
        self.results.extend(other.results);
        self.warnings.extend(other.warnings);
    }

    pub fn is_clean(&self) -> bool {
        self.warnings.is_empty()
    }

    pub fn warnings_for(&self, site_id: &str) -> impl Iterator<Item = &SweepWarning> {
        self.warnings.iter().filter(move |w| w.site_id == site_id)
    }
}
