//! Structured-output generation
//!
//! LLMs emit JSON unreliably; everything here exists to coerce and check
//! it. The format-retry loop re-prompts with the validation error and a
//! concrete template until the output parses or the attempt budget runs
//! out.

use std::sync::Arc;

use regex::Regex;
use std::sync::LazyLock;
use thiserror::Error;
use tracing::{debug, warn};

use crate::llm::{ChatMessage, CompletionRequest, LlmClient, LlmError};

mod phases;
mod tasks;

pub use phases::{PhaseGenerator, validate_phase_dependencies};
pub use tasks::{TaskGenerator, normalize_depends_on, validate_task_files};

/// Upper bound on format-correction attempts
pub const MAX_FORMAT_RETRIES: usize = 5;

/// Errors from generation
#[derive(Debug, Error)]
pub enum GenerateError {
    /// The LLM call itself failed; the client owns transport retries
    #[error(transparent)]
    Llm(#[from] LlmError),

    /// The model never produced valid output within the attempt budget
    #[error("format retries exhausted after {attempts} attempts: {last_error}")]
    FormatRetryExhausted { attempts: usize, last_error: String },
}

impl GenerateError {
    pub fn is_retryable(&self) -> bool {
        match self {
            GenerateError::Llm(e) => e.is_retryable(),
            GenerateError::FormatRetryExhausted { .. } => false,
        }
    }
}

static FENCED_JSON: LazyLock<Regex> = LazyLock::new(|| {
    // ```json ... ``` with any (or no) language tag.
    Regex::new(r"(?s)```[a-zA-Z]*\s*\n(\{.*?\})\s*\n?```").unwrap()
});

/// Pull a JSON object out of an LLM response
///
/// Prefers the first fenced code block; falls back to the largest brace
/// substring; yields `None` for prose.
pub fn extract_json(content: &str) -> Option<String> {
    if let Some(captures) = FENCED_JSON.captures(content) {
        return Some(captures[1].to_string());
    }

    let start = content.find('{')?;
    let end = content.rfind('}')?;
    if end <= start {
        return None;
    }
    Some(content[start..=end].to_string())
}

/// Run one generation under the format-retry protocol
///
/// `parse` validates as well as parses; its error text is fed back to the
/// model together with `template`, a concrete example of the expected
/// JSON.
pub async fn generate_with_retry<T>(
    llm: &Arc<dyn LlmClient>,
    mut request: CompletionRequest,
    template: &str,
    parse: impl Fn(&str) -> Result<T, String>,
) -> Result<T, GenerateError> {
    let mut last_error = String::new();

    for attempt in 1..=MAX_FORMAT_RETRIES {
        let response = llm.complete(request.clone()).await?;

        let outcome = match extract_json(&response.content) {
            Some(json) => parse(&json),
            None => Err("response contained no JSON object".to_string()),
        };

        match outcome {
            Ok(value) => {
                debug!(attempt, "structured output accepted");
                return Ok(value);
            }
            Err(error) => {
                warn!(attempt, %error, "structured output rejected");
                last_error = error;
                request.messages.push(ChatMessage::assistant(response.content));
                request.messages.push(ChatMessage::user(format!(
                    "Your previous response was not valid: {last_error}\n\n\
                     Respond with ONLY a JSON object in exactly this shape:\n{template}"
                )));
            }
        }
    }

    Err(GenerateError::FormatRetryExhausted {
        attempts: MAX_FORMAT_RETRIES,
        last_error,
    })
}
