//! Expense intake pipeline.
//!
//! Every inbound message, from any transport, flows through:
//! 1. `AccessGate::is_authorized()` — whitelist lookup, fails closed
//! 2. `ExpenseClassifier::classify()` — LLM verdict, decoded defensively
//! 3. `normalize()` — canonical record, category vocabulary enforced
//! 4. `PersistenceGateway::persist()` — single write, no retry
//!
//! `ExpensePipeline::process()` composes them and returns a `PipelineOutcome`
//! that each transport renders in its own format.

pub mod access;
pub mod classifier;
pub mod normalizer;
pub mod persistence;
pub mod processor;
pub mod types;

pub use processor::{ExpensePipeline, PipelineConfig};
pub use types::{
    Category, ClassificationVerdict, ExpenseRecord, ExpenseRequest, Identity, PipelineOutcome,
    RejectReason,
};
