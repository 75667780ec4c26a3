//! Topic keyword extraction

/// Words carrying no signal for matching
const STOP_WORDS: [&str; 30] = [
    "the", "a", "an", "is", "are", "how", "what", "where", "when", "why", "does", "do", "can", "could", "would", "in",
    "on", "at", "to", "for", "of", "with", "and", "or", "but", "it", "this", "that", "these", "those",
];

/// Split a topic into matchable keywords
///
/// Splits on space, dash, underscore, dot, slash, question mark, and
/// comma; drops tokens shorter than three characters and English stop
/// words. Keywords come back lowercased in input order.
pub fn extract_keywords(topic: &str) -> Vec<String> {
    topic
        .split([' ', '-', '_', '.', '/', '?', ','])
        .map(|t| t.trim().to_lowercase())
        .filter(|t| t.len() >= 3)
        .filter(|t| !STOP_WORDS.contains(&t.as_str()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extracts_and_lowercases() {
        assert_eq!(
            extract_keywords("How does the OAuth token-refresh flow work?"),
            vec!["oauth", "token", "refresh", "flow", "work"]
        );
    }

    #[test]
    fn test_drops_short_tokens() {
        assert_eq!(extract_keywords("db io fix"), vec!["fix"]);
    }

    #[test]
    fn test_drops_stop_words() {
        assert!(extract_keywords("what is this for").is_empty());
    }

    #[test]
    fn test_empty_topic() {
        assert!(extract_keywords("").is_empty());
    }
}
