//! Expense intake — classifies chat messages into categorized expense records.

pub mod app;
pub mod channels;
pub mod config;
pub mod error;
pub mod llm;
pub mod pipeline;
pub mod store;
