//! Result normalizer — the only place category validity is enforced.

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::pipeline::types::{Category, ExpenseRecord, ValidExpense};

/// Turn a valid verdict into the canonical record.
///
/// Categories outside the vocabulary (case-sensitive) become `Other`,
/// negative amounts are dropped, and the description is trimmed.
pub fn normalize(user_id: &str, expense: ValidExpense, accepted_at: DateTime<Utc>) -> ExpenseRecord {
    let category = expense.category.parse::<Category>().unwrap_or_else(|e| {
        debug!(error = %e, "Falling back to Other");
        Category::Other
    });

    let amount = expense.amount.filter(|a| !a.is_sign_negative());

    ExpenseRecord {
        user_id: user_id.to_string(),
        description: expense.description.trim().to_string(),
        amount,
        category,
        added_at: accepted_at,
    }
}
