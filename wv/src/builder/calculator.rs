//! Budget sizing

use std::sync::Arc;

use tracing::debug;

use crate::domain::ContextBuildRequest;
use crate::llm::CapabilityResolver;

/// Derives the token budget for one request
///
/// Precedence: an explicit budget on the request, then the capability's
/// model, then an explicit model, then the configured default. Model-based
/// budgets subtract the headroom margin.
pub struct BudgetCalculator {
    default_budget: usize,
    headroom: usize,
    resolver: Option<Arc<dyn CapabilityResolver>>,
}

impl BudgetCalculator {
    pub fn new(default_budget: usize, headroom: usize, resolver: Option<Arc<dyn CapabilityResolver>>) -> Self {
        Self {
            default_budget,
            headroom,
            resolver,
        }
    }

    pub fn calculate(&self, req: &ContextBuildRequest) -> usize {
        if req.token_budget > 0 {
            return req.token_budget;
        }

        if let Some(resolver) = &self.resolver {
            if !req.capability.is_empty()
                && let Some(model) = resolver.resolve(&req.capability)
                && let Some(max) = resolver.max_tokens(&model)
            {
                debug!(capability = %req.capability, model = %model, "budget from capability");
                return max.saturating_sub(self.headroom);
            }
            if !req.model.is_empty()
                && let Some(max) = resolver.max_tokens(&req.model)
            {
                debug!(model = %req.model, "budget from model");
                return max.saturating_sub(self.headroom);
            }
        }

        self.default_budget
    }
}
