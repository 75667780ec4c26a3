//! Anthropic Messages API client
//!
//! Implements the `LlmClient` trait over HTTP. Capability routing is a
//! table lookup from config; an explicit model on the request wins.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use super::{ChatMessage, CompletionRequest, CompletionResponse, LlmClient, LlmError};
use crate::config::LlmConfig;

/// Anthropic API client
#[derive(Debug)]
pub struct AnthropicClient {
    default_model: String,
    capabilities: HashMap<String, String>,
    api_key: String,
    base_url: String,
    http: Client,
    max_tokens: u32,
}

impl AnthropicClient {
    /// Create a new client from configuration
    ///
    /// Reads the API key from the environment variable specified in config.
    pub fn from_config(config: &LlmConfig) -> Result<Self, LlmError> {
        let api_key = std::env::var(&config.api_key_env)
            .map_err(|_| LlmError::InvalidResponse(format!("Environment variable {} not set", config.api_key_env)))?;

        let http = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(LlmError::Network)?;

        Ok(Self {
            default_model: config.model.clone(),
            capabilities: config.capabilities.clone(),
            api_key,
            base_url: config.base_url.clone(),
            http,
            max_tokens: config.max_tokens,
        })
    }

    fn route_model(&self, request: &CompletionRequest) -> String {
        if !request.model.is_empty() {
            return request.model.clone();
        }
        if !request.capability.is_empty()
            && let Some(model) = self.capabilities.get(&request.capability)
        {
            return model.clone();
        }
        self.default_model.clone()
    }

    fn build_request_body(&self, request: &CompletionRequest, model: &str) -> serde_json::Value {
        serde_json::json!({
            "model": model,
            "max_tokens": request.max_tokens.min(self.max_tokens),
            "system": request.system_prompt,
            "messages": convert_messages(&request.messages),
        })
    }
}

fn convert_messages(messages: &[ChatMessage]) -> Vec<serde_json::Value> {
    messages
        .iter()
        .map(|m| {
            serde_json::json!({
                "role": m.role,
                "content": m.content,
            })
        })
        .collect()
}

#[derive(Deserialize)]
struct ApiResponse {
    id: String,
    model: String,
    content: Vec<ApiContent>,
    usage: ApiUsage,
}

#[derive(Deserialize)]
struct ApiContent {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: String,
}

#[derive(Deserialize)]
struct ApiUsage {
    #[serde(default)]
    input_tokens: u64,
    #[serde(default)]
    output_tokens: u64,
}

#[async_trait]
impl LlmClient for AnthropicClient {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let model = self.route_model(&request);
        let body = self.build_request_body(&request, &model);

        let response = self
            .http
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if status.as_u16() == 429 {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .map(Duration::from_secs)
                .unwrap_or(Duration::from_secs(60));
            return Err(LlmError::RateLimited { retry_after });
        }
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(LlmError::ApiError {
                status: status.as_u16(),
                message,
            });
        }

        let api: ApiResponse = response.json().await?;
        let content = api
            .content
            .iter()
            .filter(|c| c.kind == "text")
            .map(|c| c.text.as_str())
            .collect::<Vec<_>>()
            .join("");

        Ok(CompletionResponse {
            content,
            tokens_used: api.usage.input_tokens + api.usage.output_tokens,
            model: api.model,
            request_id: api.id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::Role;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_from_config_reads_api_key_env() {
        let config = LlmConfig {
            api_key_env: "WEAVERD_TEST_API_KEY".to_string(),
            capabilities: HashMap::from([("planning".to_string(), "claude-opus-4".to_string())]),
            ..Default::default()
        };
        // The process environment is shared; #[serial] keeps these tests
        // from racing each other over it.
        unsafe { std::env::set_var("WEAVERD_TEST_API_KEY", "key-for-tests") };
        let client = AnthropicClient::from_config(&config).unwrap();
        unsafe { std::env::remove_var("WEAVERD_TEST_API_KEY") };

        let request = CompletionRequest::for_capability("planning", "", "go");
        assert_eq!(client.route_model(&request), "claude-opus-4");

        let request = CompletionRequest::for_capability("unknown", "", "go");
        assert_eq!(client.route_model(&request), config.model);
    }

    #[test]
    #[serial]
    fn test_from_config_missing_api_key_errors() {
        let config = LlmConfig {
            api_key_env: "WEAVERD_TEST_MISSING_KEY".to_string(),
            ..Default::default()
        };
        unsafe { std::env::remove_var("WEAVERD_TEST_MISSING_KEY") };

        let err = AnthropicClient::from_config(&config).unwrap_err();
        assert!(matches!(err, LlmError::InvalidResponse(_)));
        assert!(err.to_string().contains("WEAVERD_TEST_MISSING_KEY"));
    }

    #[test]
    fn test_convert_messages() {
        let msgs = vec![ChatMessage::user("hi"), ChatMessage::assistant("hello")];
        let converted = convert_messages(&msgs);
        assert_eq!(converted[0]["role"], serde_json::to_value(Role::User).unwrap());
        assert_eq!(converted[1]["content"], "hello");
    }

    #[test]
    fn test_api_response_parse() {
        let json = r#"{
            "id": "msg_01",
            "model": "claude-sonnet-4",
            "content": [{"type": "text", "text": "done"}],
            "usage": {"input_tokens": 12, "output_tokens": 3}
        }"#;
        let api: ApiResponse = serde_json::from_str(json).unwrap();
        assert_eq!(api.id, "msg_01");
        assert_eq!(api.content[0].text, "done");
        assert_eq!(api.usage.input_tokens, 12);
    }
}
