//! Error types shared by every outreach crate.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, OutreachError>;

#[derive(Debug, Error)]
pub enum OutreachError {
    /// The persistent store could not be reached or rejected the query.
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Store operation '{operation}' timed out after {after_ms}ms")]
    Timeout { operation: String, after_ms: u64 },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// One of several task-stage lookups failed; eligibility is not computed
    /// over a partial candidate set.
    #[error("Task lookup batch {batch}/{batches} failed: {reason}")]
    PartialBatchFailure {
        batch: usize,
        batches: usize,
        reason: String,
    },

    #[error("Operation cancelled: {0}")]
    Cancelled(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl OutreachError {
    pub fn store(msg: impl Into<String>) -> Self {
        Self::StoreUnavailable(msg.into())
    }

    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Infrastructure failures are the ones the orchestrator may retry.
    pub fn is_infrastructure(&self) -> bool {
        matches!(
            self,
            Self::StoreUnavailable(_) | Self::Timeout { .. } | Self::PartialBatchFailure { .. }
        )
    }
}

/// Reject empty identifiers before they reach the store.
pub fn require_id(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(OutreachError::invalid(format!("{field} must not be empty")));
    }
    Ok(())
}
