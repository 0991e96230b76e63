//! Persistence gateway — one write attempt per accepted expense.
//!
//! There is no idempotency key: a caller that resubmits after a failure
//! may end up with a duplicate row.

use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info};

use crate::pipeline::types::ExpenseRecord;
use crate::store::traits::ExpenseStore;

pub struct PersistenceGateway {
    store: Arc<dyn ExpenseStore>,
    timeout: Duration,
}

impl PersistenceGateway {
    pub fn new(store: Arc<dyn ExpenseStore>, timeout: Duration) -> Self {
        Self { store, timeout }
    }

    /// `true` only when the store acknowledged creation.
    pub async fn persist(&self, record: &ExpenseRecord) -> bool {
        match tokio::time::timeout(self.timeout, self.store.insert_expense(record)).await {
            Ok(Ok(())) => {
                info!(
                    user_id = %record.user_id,
                    category = %record.category,
                    "Expense saved"
                );
                true
            }
            Ok(Err(e)) => {
                error!(user_id = %record.user_id, error = %e, "Failed to save expense");
                false
            }
            Err(_) => {
                error!(
                    user_id = %record.user_id,
                    timeout = ?self.timeout,
                    "Expense write timed out"
                );
                false
            }
        }
    }
}
