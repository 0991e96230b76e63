//! Access control gate. Fails closed: a lookup that errors is a denial.

use std::sync::Arc;
use std::time::Duration;

use tracing::warn;

use crate::store::traits::UserDirectory;

/// Result of one authorization lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessDecision {
    Granted,
    Denied,
    /// The directory did not answer within the timeout.
    TimedOut,
}

/// Decides whether a caller may submit expenses.
pub struct AccessGate {
    directory: Arc<dyn UserDirectory>,
    timeout: Duration,
}

impl AccessGate {
    pub fn new(directory: Arc<dyn UserDirectory>, timeout: Duration) -> Self {
        Self { directory, timeout }
    }

    /// One lookup, no retry.
    pub async fn is_authorized(&self, external_id: &str) -> AccessDecision {
        match tokio::time::timeout(self.timeout, self.directory.is_whitelisted(external_id)).await
        {
            Ok(Ok(true)) => AccessDecision::Granted,
            Ok(Ok(false)) => AccessDecision::Denied,
            Ok(Err(e)) => {
                warn!(external_id, error = %e, "Authorization lookup failed, denying");
                AccessDecision::Denied
            }
            Err(_) => {
                warn!(external_id, timeout = ?self.timeout, "Authorization lookup timed out");
                AccessDecision::TimedOut
            }
        }
    }
}
