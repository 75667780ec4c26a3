//! Context build processor

use std::sync::Arc;

use async_trait::async_trait;

use crate::builder::ContextBuilder;
use crate::domain::{ContextBuildRequest, ContextBuildResponse};
use crate::processor::{HandleError, ProcessorHooks};

/// Hooks that turn context build triggers into published responses
pub struct ContextHooks {
    builder: Arc<ContextBuilder>,
}

impl ContextHooks {
    pub fn new(builder: Arc<ContextBuilder>) -> Self {
        Self { builder }
    }
}

#[async_trait]
impl ProcessorHooks for ContextHooks {
    type Trigger = ContextBuildRequest;
    type Artifact = ContextBuildResponse;

    fn name(&self) -> &'static str {
        "context-builder"
    }

    fn decode(&self, payload: &[u8]) -> Result<ContextBuildRequest, HandleError> {
        let request: ContextBuildRequest =
            serde_json::from_slice(payload).map_err(|e| HandleError::Unparseable(format!("bad request: {e}")))?;
        request.validate().map_err(|e| HandleError::Invalid(e.to_string()))?;
        Ok(request)
    }

    async fn process(&self, request: &ContextBuildRequest) -> Result<ContextBuildResponse, HandleError> {
        // build() never fails; construction problems ride in the
        // response's error field and still get published.
        Ok(self.builder.build(request).await)
    }

    async fn commit(&self, request: &ContextBuildRequest, response: ContextBuildResponse) -> Result<(), HandleError> {
        self.builder
            .publish(request, &response)
            .await
            .map_err(|e| HandleError::Retryable(format!("response publish failed: {e}")))
    }
}
