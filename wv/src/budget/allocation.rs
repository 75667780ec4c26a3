//! Budget allocation tracking
//!
//! One `BudgetAllocation` is owned by a single strategy invocation. It
//! reserves tokens per named source; the caller keeps the content those
//! tokens represent. Insertion order of first successful allocation is
//! preserved and later becomes provenance priority.

use std::collections::HashMap;

use thiserror::Error;

/// Errors from budget operations
#[derive(Debug, Error, PartialEq, Eq)]
pub enum BudgetError {
    #[error("budget exceeded: requested {requested} tokens, {remaining} remaining of {total}")]
    Exceeded {
        requested: usize,
        remaining: usize,
        total: usize,
    },
}

/// Tracks how a fixed token budget is split across named sources
#[derive(Debug, Clone)]
pub struct BudgetAllocation {
    total: usize,
    allocated: usize,
    items: HashMap<String, usize>,
    order: Vec<String>,
}

impl BudgetAllocation {
    /// Create an allocation with the given total budget
    pub fn new(total: usize) -> Self {
        Self {
            total,
            allocated: 0,
            items: HashMap::new(),
            order: Vec::new(),
        }
    }

    /// Reserve `tokens` under `name`, failing if the budget cannot hold it
    ///
    /// Re-allocating an existing name replaces its prior reservation; the
    /// entry keeps its original position in the order. Zero tokens is a
    /// no-op.
    pub fn allocate(&mut self, name: &str, tokens: usize) -> Result<(), BudgetError> {
        if tokens == 0 {
            return Ok(());
        }

        let prior = self.items.get(name).copied().unwrap_or(0);
        let next_allocated = self.allocated - prior + tokens;
        if next_allocated > self.total {
            return Err(BudgetError::Exceeded {
                requested: tokens,
                remaining: self.remaining(),
                total: self.total,
            });
        }

        if !self.items.contains_key(name) {
            self.order.push(name.to_string());
        }
        self.items.insert(name.to_string(), tokens);
        self.allocated = next_allocated;
        Ok(())
    }

    /// Reserve up to `requested` tokens, returning how many were taken
    pub fn try_allocate(&mut self, name: &str, requested: usize) -> usize {
        let actual = requested.min(self.remaining());
        if actual > 0 {
            // Cannot fail: actual fits by construction.
            let _ = self.allocate(name, actual);
        }
        actual
    }

    /// Whether `tokens` more would still fit
    pub fn can_fit(&self, tokens: usize) -> bool {
        self.allocated + tokens <= self.total
    }

    /// Tokens not yet reserved
    pub fn remaining(&self) -> usize {
        self.total - self.allocated
    }

    /// Total budget this allocation was created with
    pub fn total(&self) -> usize {
        self.total
    }

    /// Tokens reserved so far
    pub fn allocated(&self) -> usize {
        self.allocated
    }

    /// Tokens reserved under `name`, if any
    pub fn get(&self, name: &str) -> Option<usize> {
        self.items.get(name).copied()
    }

    /// Source names in order of first successful allocation
    pub fn order(&self) -> &[String] {
        &self.order
    }

    /// (name, tokens) pairs in allocation order
    pub fn ordered_items(&self) -> Vec<(String, usize)> {
        self.order
            .iter()
            .filter_map(|name| self.items.get(name).map(|t| (name.clone(), *t)))
            .collect()
    }

    /// Human-readable percentage breakdown by source, for logs
    pub fn summary(&self) -> String {
        if self.allocated == 0 {
            return format!("0/{} tokens allocated", self.total);
        }

        let mut parts = Vec::with_capacity(self.order.len());
        for (name, tokens) in self.ordered_items() {
            let pct = (tokens as f64 / self.total as f64) * 100.0;
            parts.push(format!("{}: {} ({:.1}%)", name, tokens, pct));
        }
        format!(
            "{}/{} tokens allocated [{}]",
            self.allocated,
            self.total,
            parts.join(", ")
        )
    }
}
