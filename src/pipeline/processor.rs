//! Expense pipeline — the single request handler every transport delegates to.
//!
//! Flow (one pass, no retries):
//! 1. Field check → MissingFields, no external calls
//! 2. Access gate → NotWhitelisted (fails closed)
//! 3. LLM classification → Irrelevant / Ambiguous
//! 4. Normalization → canonical record
//! 5. Persistence → Accepted / PersistFailed

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, info};

use crate::llm::provider::LlmProvider;
use crate::pipeline::access::{AccessDecision, AccessGate};
use crate::pipeline::classifier::ExpenseClassifier;
use crate::pipeline::normalizer::normalize;
use crate::pipeline::persistence::PersistenceGateway;
use crate::pipeline::types::{
    ClassificationVerdict, ExpenseRequest, PipelineOutcome, PipelineStage, RejectReason,
    UnavailableStage,
};
use crate::store::traits::{ExpenseStore, UserDirectory};

/// Timeouts for the external calls made per request.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub auth_timeout: Duration,
    pub classify_timeout: Duration,
    pub persist_timeout: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            auth_timeout: Duration::from_secs(5),
            classify_timeout: Duration::from_secs(20),
            persist_timeout: Duration::from_secs(10),
        }
    }
}

impl PipelineConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let secs = |key: &str, default: Duration| {
            std::env::var(key)
                .ok()
                .and_then(|s| s.parse::<u64>().ok())
                .map(Duration::from_secs)
                .unwrap_or(default)
        };

        Self {
            auth_timeout: secs("EXPENSE_AUTH_TIMEOUT_SECS", defaults.auth_timeout),
            classify_timeout: secs("EXPENSE_CLASSIFY_TIMEOUT_SECS", defaults.classify_timeout),
            persist_timeout: secs("EXPENSE_PERSIST_TIMEOUT_SECS", defaults.persist_timeout),
        }
    }
}

/// Tracks one request's progress through the stages.
struct Pass<'a> {
    channel: &'a str,
    stage: PipelineStage,
}

impl<'a> Pass<'a> {
    fn new(channel: &'a str) -> Self {
        Self {
            channel,
            stage: PipelineStage::Received,
        }
    }

    fn advance(&mut self, target: PipelineStage) {
        debug_assert!(
            self.stage.can_transition_to(target),
            "invalid stage transition {:?} -> {:?}",
            self.stage,
            target
        );
        debug!(channel = self.channel, from = ?self.stage, to = ?target, "Pipeline stage");
        self.stage = target;
    }

    fn reject(&mut self, reason: RejectReason) -> PipelineOutcome {
        self.advance(PipelineStage::Rejected);
        info!(channel = self.channel, reason = ?reason, "Message rejected");
        PipelineOutcome::rejected(reason)
    }

    fn unavailable(&mut self, stage: UnavailableStage) -> PipelineOutcome {
        self.advance(PipelineStage::Unavailable);
        PipelineOutcome::Unavailable { stage }
    }
}

/// Validation → access control → classification → normalization → persistence.
///
/// Holds no per-request state; share it behind an `Arc`.
pub struct ExpensePipeline {
    gate: AccessGate,
    classifier: ExpenseClassifier,
    gateway: PersistenceGateway,
}

impl ExpensePipeline {
    pub fn new(
        directory: Arc<dyn UserDirectory>,
        llm: Arc<dyn LlmProvider>,
        store: Arc<dyn ExpenseStore>,
        config: &PipelineConfig,
    ) -> Self {
        Self {
            gate: AccessGate::new(directory, config.auth_timeout),
            classifier: ExpenseClassifier::new(llm, config.classify_timeout),
            gateway: PersistenceGateway::new(store, config.persist_timeout),
        }
    }

    /// Run one message to a terminal outcome.
    pub async fn process(&self, request: ExpenseRequest) -> PipelineOutcome {
        let outcome = self.run_pass(&request).await;
        info!(
            channel = %request.channel,
            outcome = outcome.label(),
            status = outcome.status_code(),
            "Expense message handled"
        );
        outcome
    }

    async fn run_pass(&self, request: &ExpenseRequest) -> PipelineOutcome {
        let mut pass = Pass::new(&request.channel);

        let text = request.text.as_deref().map(str::trim).unwrap_or_default();
        let identity = match &request.identity {
            Some(identity) if identity.is_complete() && !text.is_empty() => identity,
            _ => return pass.reject(RejectReason::MissingFields),
        };
        pass.advance(PipelineStage::FieldsChecked);

        info!(
            channel = %request.channel,
            external_id = %identity.external_id,
            preview = %text.chars().take(80).collect::<String>(),
            "Processing expense message"
        );

        match self.gate.is_authorized(&identity.external_id).await {
            AccessDecision::Granted => {}
            AccessDecision::Denied => return pass.reject(RejectReason::NotWhitelisted),
            AccessDecision::TimedOut => {
                return pass.unavailable(UnavailableStage::Authorization);
            }
        }
        pass.advance(PipelineStage::AuthorizationChecked);

        let verdict = match self.classifier.classify(text).await {
            Ok(verdict) => verdict,
            Err(e) => {
                info!(error = %e, "Classification unavailable");
                return pass.unavailable(UnavailableStage::Classification);
            }
        };
        debug!(verdict = verdict.label(), "Message classified");

        let expense = match verdict {
            ClassificationVerdict::Irrelevant => return pass.reject(RejectReason::Irrelevant),
            ClassificationVerdict::Ambiguous => return pass.reject(RejectReason::Ambiguous),
            ClassificationVerdict::Valid(expense) if expense.description.trim().is_empty() => {
                return pass.reject(RejectReason::Invalid);
            }
            ClassificationVerdict::Valid(expense) => expense,
        };
        pass.advance(PipelineStage::Classified);

        let record = normalize(&identity.internal_user_id, expense, Utc::now());
        pass.advance(PipelineStage::Normalized);

        if !self.gateway.persist(&record).await {
            pass.advance(PipelineStage::PersistFailed);
            return PipelineOutcome::PersistFailed;
        }
        pass.advance(PipelineStage::Persisted);

        PipelineOutcome::Accepted { record }
    }
}
