//! Capability-to-model resolution

use std::collections::HashMap;

/// Resolves abstract capabilities to concrete models and their limits
pub trait CapabilityResolver: Send + Sync {
    /// Model serving this capability, if one is configured
    fn resolve(&self, capability: &str) -> Option<String>;

    /// Raw context window of a model, in tokens
    fn max_tokens(&self, model: &str) -> Option<usize>;
}

/// Table-driven resolver backed by configuration
#[derive(Debug, Clone, Default)]
pub struct ConfigCapabilityResolver {
    capabilities: HashMap<String, String>,
    model_limits: HashMap<String, usize>,
}

impl ConfigCapabilityResolver {
    pub fn new(capabilities: HashMap<String, String>, model_limits: HashMap<String, usize>) -> Self {
        Self {
            capabilities,
            model_limits,
        }
    }
}

impl CapabilityResolver for ConfigCapabilityResolver {
    fn resolve(&self, capability: &str) -> Option<String> {
        self.capabilities.get(capability).cloned()
    }

    fn max_tokens(&self, model: &str) -> Option<usize> {
        // Exact match first, then prefix match so dated model ids still
        // resolve against a family entry.
        self.model_limits.get(model).copied().or_else(|| {
            self.model_limits
                .iter()
                .find(|(family, _)| model.starts_with(family.as_str()))
                .map(|(_, limit)| *limit)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolver() -> ConfigCapabilityResolver {
        let capabilities = HashMap::from([("planning".to_string(), "claude-sonnet-4".to_string())]);
        let model_limits = HashMap::from([("claude-sonnet-4".to_string(), 200_000usize)]);
        ConfigCapabilityResolver::new(capabilities, model_limits)
    }

    #[test]
    fn test_resolve_capability() {
        let r = resolver();
        assert_eq!(r.resolve("planning"), Some("claude-sonnet-4".to_string()));
        assert_eq!(r.resolve("unknown"), None);
    }

    #[test]
    fn test_max_tokens_prefix_match() {
        let r = resolver();
        assert_eq!(r.max_tokens("claude-sonnet-4"), Some(200_000));
        assert_eq!(r.max_tokens("claude-sonnet-4-20250514"), Some(200_000));
        assert_eq!(r.max_tokens("gpt-x"), None);
    }
}
