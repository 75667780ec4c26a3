//! Deterministic char-to-token estimation and budget-aware truncation

/// Marker appended to content that was cut to fit a budget
pub const TRUNCATION_MARKER: &str = "\n...[truncated]";

/// Bytes reserved ahead of the marker so the result stays under budget
const MARKER_HEADROOM: usize = 20;

/// Fixed chars-per-token ratio for the estimate
const CHARS_PER_TOKEN: usize = 4;

/// Estimate the token count of a string
///
/// Uses the fixed 4-chars-per-token heuristic. Empty input is zero tokens.
pub fn estimate_tokens(content: &str) -> usize {
    content.len() / CHARS_PER_TOKEN
}

/// Pure, stateless token estimator
#[derive(Debug, Clone, Copy, Default)]
pub struct TokenEstimator;

impl TokenEstimator {
    pub fn new() -> Self {
        Self
    }

    /// Estimate tokens for a piece of content
    pub fn estimate(&self, content: &str) -> usize {
        estimate_tokens(content)
    }

    /// Truncate content to fit within `max_tokens`
    ///
    /// Returns the (possibly truncated) content and whether truncation
    /// occurred. Truncation prefers a newline boundary past the midpoint,
    /// then a space boundary past the midpoint, and always appends the
    /// truncation marker. A non-positive budget yields empty content.
    pub fn truncate_to_tokens(&self, content: &str, max_tokens: usize) -> (String, bool) {
        if max_tokens == 0 {
            return (String::new(), true);
        }

        if self.estimate(content) <= max_tokens {
            return (content.to_string(), false);
        }

        let max_chars = max_tokens * CHARS_PER_TOKEN;
        if max_chars >= content.len() {
            return (content.to_string(), false);
        }

        let budget = max_chars.saturating_sub(MARKER_HEADROOM);
        let cut = floor_char_boundary(content, budget);
        let slice = &content[..cut];

        // Trim to the last newline if it falls past the midpoint, else the
        // last space past the midpoint, else take the raw slice.
        let midpoint = max_chars / 2;
        let boundary = match slice.rfind('\n') {
            Some(pos) if pos > midpoint => pos,
            _ => match slice.rfind(' ') {
                Some(pos) if pos > midpoint => pos,
                _ => slice.len(),
            },
        };

        let mut truncated = slice[..boundary].to_string();
        truncated.push_str(TRUNCATION_MARKER);

        // A budget smaller than the marker itself degenerates to empty.
        if self.estimate(&truncated) > max_tokens {
            return (String::new(), true);
        }
        (truncated, true)
    }
}

/// Largest char boundary not exceeding `index`
fn floor_char_boundary(s: &str, index: usize) -> usize {
    if index >= s.len() {
        return s.len();
    }
    let mut i = index;
    while !s.is_char_boundary(i) {
        i -= 1;
    }
    i
}
