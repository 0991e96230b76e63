//! Persistence seams the pipeline depends on.
//!
//! Both are remote, already concurrency-safe resources; implementations
//! make exactly one attempt per call and never retry.

use async_trait::async_trait;

use crate::error::StoreError;
use crate::pipeline::types::ExpenseRecord;

/// Access list of callers allowed to submit expenses.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// Whether `external_id` has at least one matching user record.
    async fn is_whitelisted(&self, external_id: &str) -> Result<bool, StoreError>;
}

/// Destination for accepted expenses.
#[async_trait]
pub trait ExpenseStore: Send + Sync {
    /// Insert one record. `Ok` only when the store acknowledged creation.
    async fn insert_expense(&self, record: &ExpenseRecord) -> Result<(), StoreError>;
}
