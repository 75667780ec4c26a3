//! Configuration types and loading

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};

/// Main configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// LLM provider configuration
    pub llm: LlmConfig,

    /// Context building
    pub context: ContextConfig,

    /// Standards preamble
    pub standards: StandardsConfig,

    /// Q&A blocking protocol
    pub qa: QaConfig,

    /// Plan coordination
    pub planner: PlannerConfig,
}

impl Config {
    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        let local_config = PathBuf::from(".weaverd.yml");
        if local_config.exists() {
            match Self::load_from_file(&local_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    tracing::warn!("Failed to load config from {}: {}", local_config.display(), e);
                }
            }
        }

        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("weaverd").join("weaverd.yml");
            if user_config.exists() {
                match Self::load_from_file(&user_config) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        tracing::warn!("Failed to load config from {}: {}", user_config.display(), e);
                    }
                }
            }
        }

        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;
        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;
        tracing::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }
}

/// LLM provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Provider name (currently only "anthropic" supported)
    pub provider: String,

    /// Default model when neither capability nor request names one
    pub model: String,

    /// Environment variable containing the API key
    #[serde(rename = "api-key-env")]
    pub api_key_env: String,

    /// API base URL
    #[serde(rename = "base-url")]
    pub base_url: String,

    /// Maximum tokens per response
    #[serde(rename = "max-tokens")]
    pub max_tokens: u32,

    /// Request timeout in milliseconds
    #[serde(rename = "timeout-ms")]
    pub timeout_ms: u64,

    /// Capability name to model routing table
    pub capabilities: HashMap<String, String>,

    /// Model (or model family prefix) to context window size
    #[serde(rename = "model-limits")]
    pub model_limits: HashMap<String, usize>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "anthropic".to_string(),
            model: "claude-sonnet-4-20250514".to_string(),
            api_key_env: "ANTHROPIC_API_KEY".to_string(),
            base_url: "https://api.anthropic.com".to_string(),
            max_tokens: 16384,
            timeout_ms: 300_000,
            capabilities: HashMap::new(),
            model_limits: HashMap::from([
                ("claude-opus-4".to_string(), 200_000),
                ("claude-sonnet-4".to_string(), 200_000),
                ("claude-haiku-4".to_string(), 200_000),
            ]),
        }
    }
}

/// Context builder configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextConfig {
    /// Fallback budget when no model information is available
    #[serde(rename = "default-token-budget")]
    pub default_token_budget: usize,

    /// Safety margin subtracted from a model's raw context window
    #[serde(rename = "headroom-tokens")]
    pub headroom_tokens: usize,

    /// Budget for the first-use graph readiness probe, in milliseconds
    #[serde(rename = "graph-readiness-ms")]
    pub graph_readiness_ms: u64,

    /// Stream holding context build triggers
    pub stream: String,

    /// Durable consumer name
    pub consumer: String,

    /// Trigger subject
    pub subject: String,

    /// Prefix for per-request response subjects
    #[serde(rename = "output-subject-prefix")]
    pub output_subject_prefix: String,

    /// KV bucket for response pickup
    #[serde(rename = "response-bucket")]
    pub response_bucket: String,

    /// Response retention in the bucket, hours
    #[serde(rename = "response-ttl-hours")]
    pub response_ttl_hours: u64,

    /// Default capability for budget sizing when a request has none
    #[serde(rename = "default-capability")]
    pub default_capability: String,

    /// Ceiling on one strategy run, in milliseconds
    #[serde(rename = "context-timeout-ms")]
    pub context_timeout_ms: u64,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            default_token_budget: 8000,
            headroom_tokens: 2048,
            graph_readiness_ms: 15_000,
            stream: "WORKFLOW".to_string(),
            consumer: "context-builder".to_string(),
            subject: "context.build".to_string(),
            output_subject_prefix: "context.out".to_string(),
            response_bucket: "context-responses".to_string(),
            response_ttl_hours: 24,
            default_capability: String::new(),
            context_timeout_ms: 30_000,
        }
    }
}

/// Standards preamble configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StandardsConfig {
    /// Rule file location, relative to the working directory
    pub path: PathBuf,

    /// Token cap for the rendered preamble
    #[serde(rename = "max-tokens")]
    pub max_tokens: usize,

    /// Graph entity id prefix for standards rules
    #[serde(rename = "sop-entity-prefix")]
    pub sop_entity_prefix: String,
}

impl Default for StandardsConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("standards.yml"),
            max_tokens: 1000,
            sop_entity_prefix: "sop.".to_string(),
        }
    }
}

/// Q&A blocking protocol configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QaConfig {
    /// Whether strategies may block on unanswered questions at all
    #[serde(rename = "allow-blocking")]
    pub allow_blocking: bool,

    /// Upper bound on one blocking wait, in seconds
    #[serde(rename = "blocking-timeout-secs")]
    pub blocking_timeout_secs: u64,

    /// Answerer routing table location
    #[serde(rename = "answerers-config-path")]
    pub answerers_config_path: PathBuf,

    /// KV bucket answers are written to, keyed by question id
    #[serde(rename = "answer-bucket")]
    pub answer_bucket: String,

    /// Subject prefix for answer publication
    #[serde(rename = "answer-subject-prefix")]
    pub answer_subject_prefix: String,

    /// Subject prefix questions are routed to
    #[serde(rename = "question-subject-prefix")]
    pub question_subject_prefix: String,
}

impl Default for QaConfig {
    fn default() -> Self {
        Self {
            allow_blocking: true,
            blocking_timeout_secs: 300,
            answerers_config_path: PathBuf::from("answerers.yml"),
            answer_bucket: "question-answers".to_string(),
            answer_subject_prefix: "answers".to_string(),
            question_subject_prefix: "questions".to_string(),
        }
    }
}

/// Plan coordination configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlannerConfig {
    /// Upper bound on concurrent worker planners
    #[serde(rename = "max-concurrent-planners")]
    pub max_concurrent_planners: usize,

    /// Per-planner deadline, seconds; the fan-out deadline is this times
    /// the number of focus areas
    #[serde(rename = "planner-timeout-secs")]
    pub planner_timeout_secs: u64,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_planners: 4,
            planner_timeout_secs: 120,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.llm.provider, "anthropic");
        assert_eq!(config.context.default_token_budget, 8000);
        assert_eq!(config.standards.max_tokens, 1000);
        assert_eq!(config.qa.blocking_timeout_secs, 300);
        assert_eq!(config.planner.max_concurrent_planners, 4);
    }

    #[test]
    fn test_deserialize_config() {
        let yaml = r#"
llm:
  model: claude-opus-4
  api-key-env: MY_API_KEY
  capabilities:
    planning: claude-opus-4

context:
  default-token-budget: 12000
  headroom-tokens: 1024
  response-bucket: ctx-out

qa:
  allow-blocking: false
  blocking-timeout-secs: 30
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.llm.model, "claude-opus-4");
        assert_eq!(config.llm.capabilities.get("planning").unwrap(), "claude-opus-4");
        assert_eq!(config.context.default_token_budget, 12000);
        assert_eq!(config.context.response_bucket, "ctx-out");
        assert!(!config.qa.allow_blocking);
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let yaml = r#"
context:
  default-token-budget: 4000
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.context.default_token_budget, 4000);
        assert_eq!(config.context.headroom_tokens, 2048);
        assert_eq!(config.llm.provider, "anthropic");
    }
}
