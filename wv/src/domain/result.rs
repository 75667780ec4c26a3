//! Strategy output types
//!
//! A strategy fills a budget and reports what it gathered. Expected
//! context-sufficiency problems are carried in the result (`error`,
//! `questions`, `insufficient_context`), never as a Rust error.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Synthetic document keys
///
/// Documents whose key starts with a double underscore are not filesystem
/// paths; the key itself records the provenance of the content.
pub mod keys {
    pub const PLAN: &str = "__plan__";
    pub const FILE_TREE: &str = "__file_tree__";
    pub const SOPS: &str = "__sops__";
    pub const SUMMARY: &str = "__summary__";
    pub const STANDARDS: &str = "__standards__";

    pub fn spec(id: &str) -> String {
        format!("__spec__{id}")
    }

    pub fn entity(id: &str) -> String {
        format!("__entity__{id}")
    }

    pub fn pattern(id: &str) -> String {
        format!("__pattern__{id}")
    }

    pub fn qa_answer(topic: &str, index: usize) -> String {
        format!("__qa_answer__{topic}_{index}")
    }

    /// Whether a document key denotes synthetic (non-path) content
    pub fn is_synthetic(key: &str) -> bool {
        key.starts_with("__")
    }
}

/// How urgently a question blocks progress
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Urgency {
    Low,
    Normal,
    High,
    Blocking,
}

impl Urgency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Urgency::Low => "low",
            Urgency::Normal => "normal",
            Urgency::High => "high",
            Urgency::Blocking => "blocking",
        }
    }
}

/// A question a strategy needs answered before context is sufficient
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Question {
    /// Hierarchical dotted topic, e.g. `requirements.scope`
    pub topic: String,
    pub question: String,
    /// Why the strategy is asking
    pub context: String,
    pub urgency: Urgency,
}

impl Question {
    pub fn new(topic: impl Into<String>, question: impl Into<String>, context: impl Into<String>, urgency: Urgency) -> Self {
        Self {
            topic: topic.into(),
            question: question.into(),
            context: context.into(),
            urgency,
        }
    }
}

/// What a strategy gathered for one request
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StrategyResult {
    /// Graph entity ids included by reference
    pub entities: Vec<String>,

    /// Documents keyed by path or synthetic key; BTreeMap keeps output
    /// deterministic for serialization and tests
    pub documents: BTreeMap<String, String>,

    /// Version-control diffs
    pub diffs: Vec<String>,

    /// Ids of standards rules referenced
    pub sop_ids: Vec<String>,

    /// Rule texts to echo into the LLM prompt; never budget-charged
    pub sop_requirements: Vec<String>,

    /// Whether any source was clipped to fit the budget
    pub truncated: bool,

    /// Non-empty when the strategy could not produce a context at all;
    /// all other fields are unused in that case
    pub error: String,

    /// Inferred problem domains (review)
    pub domains: Vec<String>,

    /// Unanswered questions
    pub questions: Vec<Question>,

    /// Set when questions of high+ urgency exist or scope is ambiguous
    pub insufficient_context: bool,
}

impl StrategyResult {
    /// A result that only carries a failure reason
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            ..Default::default()
        }
    }

    /// Record a question and raise the insufficiency flag when warranted
    pub fn push_question(&mut self, question: Question) {
        if question.urgency >= Urgency::High {
            self.insufficient_context = true;
        }
        self.questions.push(question);
    }
}
