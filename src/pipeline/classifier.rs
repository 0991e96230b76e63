//! Semantic classifier — asks the reasoning service whether a message is an
//! expense and decodes its answer defensively.
//!
//! The service is untrusted: anything that does not decode cleanly becomes
//! `Irrelevant`, never an expense and never a crash.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use rust_decimal::Decimal;
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{ClassifyError, DecodeError};
use crate::llm::provider::{ChatMessage, CompletionRequest, LlmProvider};
use crate::pipeline::types::{Category, ClassificationVerdict, ValidExpense};

/// Temperature for classification.
const CLASSIFY_TEMPERATURE: f32 = 0.3;

/// Max tokens for the classification call; the answer is one small object.
const CLASSIFY_MAX_TOKENS: u32 = 256;

/// Longest message forwarded to the reasoning service.
const MAX_MESSAGE_CHARS: usize = 1000;

/// Classifies free text via an LLM.
pub struct ExpenseClassifier {
    llm: Arc<dyn LlmProvider>,
    timeout: Duration,
}

impl ExpenseClassifier {
    pub fn new(llm: Arc<dyn LlmProvider>, timeout: Duration) -> Self {
        Self { llm, timeout }
    }

    /// Classify one message with a single reasoning call.
    ///
    /// Transport and decode failures resolve to `Irrelevant`. Only a call
    /// that exceeds the timeout is reported as an error.
    pub async fn classify(&self, text: &str) -> Result<ClassificationVerdict, ClassifyError> {
        let request = CompletionRequest::new(vec![
            ChatMessage::system(build_system_prompt()),
            ChatMessage::user(build_user_prompt(text)),
        ])
        .with_temperature(CLASSIFY_TEMPERATURE)
        .with_max_tokens(CLASSIFY_MAX_TOKENS);

        let response = match tokio::time::timeout(self.timeout, self.llm.complete(request)).await
        {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => {
                warn!(
                    model = self.llm.model_name(),
                    error = %e,
                    "Classification call failed, treating message as irrelevant"
                );
                return Ok(ClassificationVerdict::Irrelevant);
            }
            Err(_) => {
                warn!(
                    model = self.llm.model_name(),
                    timeout = ?self.timeout,
                    "Classification call timed out"
                );
                return Err(ClassifyError::TimedOut(self.timeout));
            }
        };

        debug!(
            input_tokens = response.input_tokens,
            output_tokens = response.output_tokens,
            "Classification response received"
        );

        Ok(decode_verdict(&response.content).unwrap_or_else(|e| {
            warn!(
                raw_response = %response.content,
                error = %e,
                "Failed to decode classification, treating message as irrelevant"
            );
            ClassificationVerdict::Irrelevant
        }))
    }
}

// ── Prompt construction ─────────────────────────────────────────────

/// Build the fixed classification instruction.
fn build_system_prompt() -> String {
    let categories: Vec<&str> = Category::ALL.iter().map(Category::as_str).collect();
    format!(
        "You are an expert assistant for processing personal expenses.\n\
         Analyze the message and classify it into one of three categories:\n\
         1. Expense-related: extract the description, amount, and category.\n\
         2. Ambiguous: the message suggests an expense but lacks key details.\n\
         3. Irrelevant: the message is not related to expenses.\n\n\
         Respond with ONLY a JSON object:\n\
         - Irrelevant: {{\"valid\": false, \"type\": \"irrelevant\"}}\n\
         - Ambiguous: {{\"valid\": false, \"type\": \"ambiguous\"}}\n\
         - Valid: {{\"valid\": true, \"description\": \"...\", \"amount\": 0, \"category\": \"...\"}}\n\n\
         Valid categories: {}.\n\
         Use \"Other\" when no category fits. Use null for amount when no number is given.\n\n\
         Example: \"Lunch 15 dollars\" -> {{\"valid\": true, \"description\": \"Lunch\", \"amount\": 15, \"category\": \"Food\"}}\n\
         Example: \"Hello, how are you?\" -> {{\"valid\": false, \"type\": \"irrelevant\"}}\n\
         Example: \"I paid for something\" -> {{\"valid\": false, \"type\": \"ambiguous\"}}",
        categories.join(", ")
    )
}

/// Build the user turn, truncating very long messages.
fn build_user_prompt(text: &str) -> String {
    let preview: String = text.chars().take(MAX_MESSAGE_CHARS).collect();
    format!("Process this message: {preview}")
}

// ── Response decoding ───────────────────────────────────────────────

/// Decode a reasoning-service payload into a verdict.
pub fn decode_verdict(raw: &str) -> Result<ClassificationVerdict, DecodeError> {
    let json_str = extract_json_object(raw);
    let value: Value =
        serde_json::from_str(&json_str).map_err(|e| DecodeError::NotAnObject(e.to_string()))?;
    let object = value
        .as_object()
        .ok_or_else(|| DecodeError::NotAnObject(format!("got {}", json_kind(&value))))?;

    let valid = object
        .get("valid")
        .and_then(Value::as_bool)
        .ok_or(DecodeError::MissingDiscriminator)?;

    if !valid {
        return Ok(match object.get("type").and_then(Value::as_str) {
            Some("ambiguous") => ClassificationVerdict::Ambiguous,
            _ => ClassificationVerdict::Irrelevant,
        });
    }

    let description = object
        .get("description")
        .and_then(Value::as_str)
        .ok_or(DecodeError::MissingField("description"))?
        .to_string();

    let category = object
        .get("category")
        .and_then(Value::as_str)
        .unwrap_or(Category::Other.as_str())
        .to_string();

    let amount = object.get("amount").and_then(parse_amount);

    Ok(ClassificationVerdict::Valid(ValidExpense {
        description,
        amount,
        category,
    }))
}

/// Parse a non-negative amount from a JSON number or numeric string.
fn parse_amount(value: &Value) -> Option<Decimal> {
    let text = match value {
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.trim().to_string(),
        _ => return None,
    };
    let amount = Decimal::from_str(&text)
        .or_else(|_| Decimal::from_scientific(&text))
        .ok()?;
    (!amount.is_sign_negative()).then_some(amount)
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Extract a JSON object from LLM output (handles markdown wrapping).
fn extract_json_object(text: &str) -> String {
    let trimmed = text.trim();

    if trimmed.starts_with('{') {
        return trimmed.to_string();
    }

    // Wrapped in a markdown code block
    if let Some(start) = trimmed.find("```") {
        let after = trimmed[start + 3..].trim_start_matches("json");
        if let Some(end) = after.find("```") {
            let inner = after[..end].trim();
            if inner.starts_with('{') {
                return inner.to_string();
            }
        }
    }

    if let (Some(start), Some(end)) = (trimmed.find('{'), trimmed.rfind('}'))
        && end > start
    {
        return trimmed[start..=end].to_string();
    }

    trimmed.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LlmError;
    use crate::llm::provider::CompletionResponse;
    use rust_decimal_macros::dec;

    fn valid(raw: &str) -> ValidExpense {
        match decode_verdict(raw).unwrap() {
            ClassificationVerdict::Valid(expense) => expense,
            other => panic!("Expected Valid, got {:?}", other),
        }
    }

    // ── Prompt construction ─────────────────────────────────────────

    #[test]
    fn system_prompt_lists_every_category() {
        let prompt = build_system_prompt();
        for category in Category::ALL {
            assert!(prompt.contains(category.as_str()), "missing {category}");
        }
        assert!(prompt.contains("irrelevant"));
        assert!(prompt.contains("ambiguous"));
    }

    #[test]
    fn user_prompt_truncates_long_messages() {
        let prompt = build_user_prompt(&"x".repeat(5000));
        assert!(prompt.starts_with("Process this message: "));
        assert!(prompt.len() < MAX_MESSAGE_CHARS + 50);
    }

    // ── Decoding ────────────────────────────────────────────────────

    #[test]
    fn decode_valid_expense() {
        let expense =
            valid(r#"{"valid": true, "description": "Lunch", "amount": 15, "category": "Food"}"#);
        assert_eq!(expense.description, "Lunch");
        assert_eq!(expense.amount, Some(dec!(15)));
        assert_eq!(expense.category, "Food");
    }

    #[test]
    fn decode_keeps_unknown_category_for_the_normalizer() {
        let expense = valid(
            r#"{"valid": true, "description": "Concert", "amount": 40, "category": "Fun"}"#,
        );
        assert_eq!(expense.category, "Fun");
    }

    #[test]
    fn decode_missing_category_defaults_to_other() {
        let expense = valid(r#"{"valid": true, "description": "Stuff", "amount": 3}"#);
        assert_eq!(expense.category, "Other");
    }

    #[test]
    fn decode_irrelevant_and_ambiguous() {
        assert_eq!(
            decode_verdict(r#"{"valid": false, "type": "irrelevant"}"#),
            Ok(ClassificationVerdict::Irrelevant)
        );
        assert_eq!(
            decode_verdict(r#"{"valid": false, "type": "ambiguous"}"#),
            Ok(ClassificationVerdict::Ambiguous)
        );
    }

    #[test]
    fn decode_invalid_without_type_defaults_to_irrelevant() {
        assert_eq!(
            decode_verdict(r#"{"valid": false}"#),
            Ok(ClassificationVerdict::Irrelevant)
        );
        assert_eq!(
            decode_verdict(r#"{"valid": false, "type": "spam"}"#),
            Ok(ClassificationVerdict::Irrelevant)
        );
    }

    #[test]
    fn decode_rejects_missing_discriminator() {
        assert_eq!(
            decode_verdict(r#"{"description": "Lunch", "amount": 15}"#),
            Err(DecodeError::MissingDiscriminator)
        );
        assert_eq!(
            decode_verdict(r#"{"valid": "yes"}"#),
            Err(DecodeError::MissingDiscriminator)
        );
    }

    #[test]
    fn decode_rejects_non_objects() {
        assert!(matches!(
            decode_verdict("I think this is about lunch"),
            Err(DecodeError::NotAnObject(_))
        ));
        assert!(matches!(
            decode_verdict("[1, 2, 3]"),
            Err(DecodeError::NotAnObject(_))
        ));
    }

    #[test]
    fn decode_valid_without_description_fails() {
        assert_eq!(
            decode_verdict(r#"{"valid": true, "amount": 15, "category": "Food"}"#),
            Err(DecodeError::MissingField("description"))
        );
    }

    #[test]
    fn decode_amount_variants() {
        let parse = |amount: &str| {
            valid(&format!(
                r#"{{"valid": true, "description": "x", "amount": {amount}, "category": "Food"}}"#
            ))
            .amount
        };
        assert_eq!(parse("12.50"), Some(dec!(12.50)));
        assert_eq!(parse(r#""7.25""#), Some(dec!(7.25)));
        assert_eq!(parse("0"), Some(dec!(0)));
        assert_eq!(parse("1e2"), Some(dec!(100)));
        assert_eq!(parse("-5"), None);
        assert_eq!(parse(r#""-5""#), None);
        assert_eq!(parse(r#""fifteen""#), None);
        assert_eq!(parse("null"), None);
        assert_eq!(parse("[15]"), None);
    }

    #[test]
    fn decode_missing_amount_is_none() {
        let expense = valid(r#"{"valid": true, "description": "Gift", "category": "Other"}"#);
        assert_eq!(expense.amount, None);
    }

    #[test]
    fn decode_handles_markdown_fences() {
        let raw = "```json\n{\"valid\": false, \"type\": \"ambiguous\"}\n```";
        assert_eq!(decode_verdict(raw), Ok(ClassificationVerdict::Ambiguous));
    }

    #[test]
    fn decode_handles_surrounding_prose() {
        let raw = "Here you go: {\"valid\": true, \"description\": \"Taxi\", \"amount\": 20, \"category\": \"Transportation\"} hope that helps";
        assert_eq!(valid(raw).category, "Transportation");
    }

    // ── Classifier with mock LLM ────────────────────────────────────

    enum MockBehavior {
        Reply(String),
        Fail,
        Hang,
    }

    struct MockLlm {
        behavior: MockBehavior,
    }

    #[async_trait::async_trait]
    impl LlmProvider for MockLlm {
        fn model_name(&self) -> &str {
            "mock-classifier"
        }

        async fn complete(
            &self,
            request: CompletionRequest,
        ) -> Result<CompletionResponse, LlmError> {
            assert!(request.system_prompt().is_some());
            match &self.behavior {
                MockBehavior::Reply(content) => Ok(CompletionResponse {
                    content: content.clone(),
                    input_tokens: 120,
                    output_tokens: 20,
                }),
                MockBehavior::Fail => Err(LlmError::RequestFailed {
                    provider: "mock".into(),
                    reason: "connection reset".into(),
                }),
                MockBehavior::Hang => {
                    tokio::time::sleep(Duration::from_secs(60)).await;
                    unreachable!("classifier should time out first")
                }
            }
        }
    }

    fn classifier(behavior: MockBehavior) -> ExpenseClassifier {
        ExpenseClassifier::new(Arc::new(MockLlm { behavior }), Duration::from_millis(100))
    }

    #[tokio::test]
    async fn classify_valid_message() {
        let c = classifier(MockBehavior::Reply(
            r#"{"valid": true, "description": "Lunch", "amount": 15, "category": "Food"}"#.into(),
        ));
        let verdict = c.classify("Lunch 15 dollars").await.unwrap();
        assert_eq!(verdict.label(), "valid");
    }

    #[tokio::test]
    async fn classify_garbage_is_irrelevant() {
        let c = classifier(MockBehavior::Reply("Sure! That's lunch.".into()));
        let verdict = c.classify("Lunch 15 dollars").await.unwrap();
        assert_eq!(verdict, ClassificationVerdict::Irrelevant);
    }

    #[tokio::test]
    async fn classify_transport_failure_is_irrelevant() {
        let c = classifier(MockBehavior::Fail);
        let verdict = c.classify("Lunch 15 dollars").await.unwrap();
        assert_eq!(verdict, ClassificationVerdict::Irrelevant);
    }

    #[tokio::test]
    async fn classify_timeout_is_an_error() {
        let c = classifier(MockBehavior::Hang);
        let result = c.classify("Lunch 15 dollars").await;
        assert!(matches!(result, Err(ClassifyError::TimedOut(_))));
    }
}
