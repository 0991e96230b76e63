//! In-process store for dry runs and tests.

use std::collections::HashSet;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::error::StoreError;
use crate::pipeline::types::ExpenseRecord;
use crate::store::traits::{ExpenseStore, UserDirectory};

/// Keeps the whitelist and accepted expenses in memory.
#[derive(Default)]
pub struct MemoryStore {
    whitelist: HashSet<String>,
    expenses: Mutex<Vec<ExpenseRecord>>,
}

impl MemoryStore {
    pub fn new<I, S>(whitelist: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            whitelist: whitelist.into_iter().map(Into::into).collect(),
            expenses: Mutex::new(Vec::new()),
        }
    }

    /// Snapshot of everything inserted so far, oldest first.
    pub async fn expenses(&self) -> Vec<ExpenseRecord> {
        self.expenses.lock().await.clone()
    }
}

#[async_trait]
impl UserDirectory for MemoryStore {
    async fn is_whitelisted(&self, external_id: &str) -> Result<bool, StoreError> {
        Ok(self.whitelist.contains(external_id))
    }
}

#[async_trait]
impl ExpenseStore for MemoryStore {
    async fn insert_expense(&self, record: &ExpenseRecord) -> Result<(), StoreError> {
        self.expenses.lock().await.push(record.clone());
        Ok(())
    }
}
