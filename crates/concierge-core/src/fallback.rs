//! Failure classification and user-facing fallback text
//!
//! Raw failure text is matched against substring patterns, one category at a
//! time in a fixed order; the first category with a hit wins. The raw text is
//! only logged. What the user sees is a fixed sentence per category, preceded
//! by emergency instructions whenever the utterance itself was urgent.

use std::sync::Arc;

use tracing::warn;

use crate::error::{ErrorCategory, FailureRecord};
use crate::intent::IntentClassifier;

const OVERLOADED_PATTERNS: &[&str] = &[
    "429",
    "too many requests",
    "rate limit",
    "rate_limit",
    "ratelimit",
    "overloaded",
    "503",
    "service unavailable",
    "capacity",
    "quota",
    "resource exhausted",
    "resource_exhausted",
];

const CONNECTIVITY_PATTERNS: &[&str] = &[
    "timed out",
    "timeout",
    "connection",
    "connect error",
    "network",
    "dns",
    "unreachable",
    "502",
    "504",
    "bad gateway",
    "gateway timeout",
    "broken pipe",
    "reset by peer",
];

const AUTHENTICATION_PATTERNS: &[&str] = &[
    "401",
    "403",
    "unauthorized",
    "forbidden",
    "authentication",
    "api key",
    "api_key",
    "invalid key",
    "credential",
    "permission denied",
    "token expired",
];

const KNOWLEDGE_STORE_PATTERNS: &[&str] = &[
    "pinecone",
    "vector store",
    "vector database",
    "vector db",
    "knowledge base",
    "knowledge store",
    "index not found",
    "retrieval",
    "database unavailable",
];

const PROCESSING_PATTERNS: &[&str] = &[
    "embedding",
    "parse",
    "parsing",
    "deserializ",
    "serializ",
    "decode",
    "invalid json",
    "malformed",
    "dimension",
    "empty reply",
];

/// Category for a raw failure description
pub fn classify_failure(raw: &str) -> ErrorCategory {
    let lower = raw.to_lowercase();
    let checks: [(ErrorCategory, &[&str]); 5] = [
        (ErrorCategory::ServiceOverloaded, OVERLOADED_PATTERNS),
        (ErrorCategory::Connectivity, CONNECTIVITY_PATTERNS),
        (ErrorCategory::Authentication, AUTHENTICATION_PATTERNS),
        (ErrorCategory::KnowledgeStoreUnavailable, KNOWLEDGE_STORE_PATTERNS),
        (ErrorCategory::Processing, PROCESSING_PATTERNS),
    ];

    checks
        .iter()
        .find(|(_, patterns)| patterns.iter().any(|p| lower.contains(p)))
        .map(|(category, _)| *category)
        .unwrap_or(ErrorCategory::Unknown)
}

/// Fixed user-facing sentence for a failure category
pub fn message_for(category: ErrorCategory) -> &'static str {
    match category {
        ErrorCategory::ServiceOverloaded => {
            "Our assistant is handling a lot of requests right now. Please try again in a minute."
        }
        ErrorCategory::Connectivity => {
            "I couldn't reach the service that handles this request. Please check your connection and try again shortly."
        }
        ErrorCategory::Authentication => {
            "I'm unable to access one of the services I rely on at the moment. Please try again later."
        }
        ErrorCategory::KnowledgeStoreUnavailable => {
            "Our medical knowledge base is temporarily unavailable. Please consult a healthcare professional for medical information in the meantime."
        }
        ErrorCategory::Processing => {
            "I had trouble processing that request. Could you rephrase it and try again?"
        }
        ErrorCategory::Unknown => {
            "Something went wrong while preparing your answer. Please try again."
        }
    }
}

/// Instruction shown ahead of any fallback for an urgent utterance
pub fn immediate_attention_instruction(emergency_number: &str) -> String {
    format!(
        "If this is a medical emergency, call emergency services immediately ({}) or go to the nearest emergency room. Do not wait for a reply from this assistant.",
        emergency_number
    )
}

#[derive(Debug, Clone)]
pub struct FallbackConfig {
    pub emergency_number: String,
}

impl Default for FallbackConfig {
    fn default() -> Self {
        Self {
            emergency_number: "1122".to_string(),
        }
    }
}

pub struct FallbackGenerator {
    classifier: Arc<IntentClassifier>,
    config: FallbackConfig,
}

impl FallbackGenerator {
    pub fn new(classifier: Arc<IntentClassifier>, config: FallbackConfig) -> Self {
        Self { classifier, config }
    }

    /// Final text for a failed turn. Never empty.
    pub fn classify_and_fallback(&self, record: &FailureRecord, user_text: &str) -> String {
        warn!(
            "Falling back after {} failure: {}",
            record.category, record.raw_message
        );

        let message = message_for(record.category);
        if self.classifier.is_urgent(user_text) {
            format!(
                "{}\n\n{}",
                immediate_attention_instruction(&self.config.emergency_number),
                message
            )
        } else {
            message.to_string()
        }
    }
}
