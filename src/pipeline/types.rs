//! Shared types for the expense intake pipeline.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

// ── Inbound request ─────────────────────────────────────────────────

/// A caller: the id checked against the access list and the id that owns
/// the stored expenses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub external_id: String,
    pub internal_user_id: String,
}

impl Identity {
    pub fn new(external_id: impl Into<String>, internal_user_id: impl Into<String>) -> Self {
        Self {
            external_id: external_id.into(),
            internal_user_id: internal_user_id.into(),
        }
    }

    /// Both ids are present and non-blank.
    pub fn is_complete(&self) -> bool {
        !self.external_id.trim().is_empty() && !self.internal_user_id.trim().is_empty()
    }
}

/// Canonical request every transport adapter produces.
///
/// Fields are optional so adapters can forward whatever the caller sent;
/// the orchestrator decides what counts as missing.
#[derive(Debug, Clone, Default)]
pub struct ExpenseRequest {
    /// Transport that delivered the message ("http", "telegram", "cli").
    pub channel: String,
    pub identity: Option<Identity>,
    pub text: Option<String>,
}

impl ExpenseRequest {
    pub fn new(channel: impl Into<String>, identity: Identity, text: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
            identity: Some(identity),
            text: Some(text.into()),
        }
    }
}

// ── Categories ──────────────────────────────────────────────────────

/// The closed expense category vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Category {
    Housing,
    Transportation,
    Food,
    Utilities,
    Insurance,
    #[serde(rename = "Medical/Healthcare")]
    MedicalHealthcare,
    Savings,
    Debt,
    Education,
    Entertainment,
    Other,
}

impl Category {
    pub const ALL: [Category; 11] = [
        Self::Housing,
        Self::Transportation,
        Self::Food,
        Self::Utilities,
        Self::Insurance,
        Self::MedicalHealthcare,
        Self::Savings,
        Self::Debt,
        Self::Education,
        Self::Entertainment,
        Self::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Housing => "Housing",
            Self::Transportation => "Transportation",
            Self::Food => "Food",
            Self::Utilities => "Utilities",
            Self::Insurance => "Insurance",
            Self::MedicalHealthcare => "Medical/Healthcare",
            Self::Savings => "Savings",
            Self::Debt => "Debt",
            Self::Education => "Education",
            Self::Entertainment => "Entertainment",
            Self::Other => "Other",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error for a string outside the category vocabulary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownCategory(pub String);

impl fmt::Display for UnknownCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown expense category: '{}'", self.0)
    }
}

impl std::error::Error for UnknownCategory {}

impl FromStr for Category {
    type Err = UnknownCategory;

    /// Case-sensitive: "food" is not "Food".
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| UnknownCategory(s.to_string()))
    }
}

// ── Classifier verdict ──────────────────────────────────────────────

/// Fields the classifier extracted from a valid expense message.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidExpense {
    pub description: String,
    pub amount: Option<Decimal>,
    /// Raw category string; may be outside the vocabulary.
    pub category: String,
}

impl From<&ExpenseRecord> for ValidExpense {
    fn from(record: &ExpenseRecord) -> Self {
        Self {
            description: record.description.clone(),
            amount: record.amount,
            category: record.category.as_str().to_string(),
        }
    }
}

/// The classifier's pre-normalization judgment of one message.
#[derive(Debug, Clone, PartialEq)]
pub enum ClassificationVerdict {
    Irrelevant,
    Ambiguous,
    Valid(ValidExpense),
}

impl ClassificationVerdict {
    /// Short label for logging.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Irrelevant => "irrelevant",
            Self::Ambiguous => "ambiguous",
            Self::Valid(_) => "valid",
        }
    }
}

// ── Canonical record ────────────────────────────────────────────────

/// A normalized expense, as written to the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpenseRecord {
    pub user_id: String,
    pub description: String,
    #[serde(with = "rust_decimal::serde::float_option")]
    pub amount: Option<Decimal>,
    pub category: Category,
    pub added_at: DateTime<Utc>,
}

// ── Outcome ─────────────────────────────────────────────────────────

/// Why a message was turned away before anything was stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    MissingFields,
    NotWhitelisted,
    Irrelevant,
    Ambiguous,
    Invalid,
}

/// External call that did not answer in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnavailableStage {
    Authorization,
    Classification,
}

/// Terminal result of one pass through the pipeline.
///
/// Every transport renders this into its own response shape.
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineOutcome {
    Rejected { reason: RejectReason },
    PersistFailed,
    Accepted { record: ExpenseRecord },
    Unavailable { stage: UnavailableStage },
}

impl PipelineOutcome {
    pub fn rejected(reason: RejectReason) -> Self {
        Self::Rejected { reason }
    }

    /// Short label for logging.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Rejected { .. } => "rejected",
            Self::PersistFailed => "persist_failed",
            Self::Accepted { .. } => "accepted",
            Self::Unavailable { .. } => "unavailable",
        }
    }

    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted { .. })
    }

    /// HTTP-equivalent status code.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Rejected {
                reason: RejectReason::NotWhitelisted,
            } => 403,
            Self::Rejected { .. } => 400,
            Self::PersistFailed => 500,
            Self::Unavailable { .. } => 503,
            Self::Accepted { .. } => 200,
        }
    }

    /// User-facing message, shared by every transport.
    pub fn message(&self) -> String {
        match self {
            Self::Rejected { reason } => match reason {
                RejectReason::MissingFields => "Missing required fields",
                RejectReason::NotWhitelisted => "User not whitelisted",
                RejectReason::Irrelevant => "This message is not related to expenses.",
                RejectReason::Ambiguous => "Please provide more details about your expense.",
                RejectReason::Invalid => "This message does not seem to be a valid expense.",
            }
            .to_string(),
            Self::PersistFailed => "Failed to save expense".to_string(),
            Self::Unavailable { .. } => "Expense service temporarily unavailable".to_string(),
            Self::Accepted { record } => format!("{} expense added ✅", record.category),
        }
    }
}

// ── Stages ──────────────────────────────────────────────────────────

/// Where a request is in its single pass through the pipeline.
///
/// Progresses linearly: Received → FieldsChecked → AuthorizationChecked →
/// Classified → Normalized → Persisted. Any non-terminal stage may exit to
/// Rejected; only Normalized may exit to PersistFailed. A timed-out lookup or
/// classification exits to Unavailable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    Received,
    FieldsChecked,
    AuthorizationChecked,
    Classified,
    Normalized,
    Persisted,
    Rejected,
    PersistFailed,
    Unavailable,
}

impl PipelineStage {
    /// Check if a transition from `self` to `target` is valid.
    pub fn can_transition_to(&self, target: PipelineStage) -> bool {
        use PipelineStage::*;
        match target {
            Rejected => !self.is_terminal() && *self != Normalized,
            PersistFailed => *self == Normalized,
            Unavailable => matches!(self, FieldsChecked | AuthorizationChecked),
            _ => self.next() == Some(target),
        }
    }

    /// Whether this stage ends the pass.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Persisted | Self::Rejected | Self::PersistFailed | Self::Unavailable
        )
    }

    /// The next stage on the happy path, if any.
    pub fn next(&self) -> Option<PipelineStage> {
        use PipelineStage::*;
        match self {
            Received => Some(FieldsChecked),
            FieldsChecked => Some(AuthorizationChecked),
            AuthorizationChecked => Some(Classified),
            Classified => Some(Normalized),
            Normalized => Some(Persisted),
            Persisted | Rejected | PersistFailed | Unavailable => None,
        }
    }
}
