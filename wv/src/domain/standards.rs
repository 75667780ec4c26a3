//! Project standards rule set

use serde::{Deserialize, Serialize};

/// Rule severity, ordered error < warning < info < other for sorting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
    Info,
    #[serde(other)]
    Other,
}

impl Severity {
    /// Sort rank; lower sorts first
    pub fn rank(&self) -> u8 {
        match self {
            Severity::Error => 0,
            Severity::Warning => 1,
            Severity::Info => 2,
            Severity::Other => 3,
        }
    }

    pub fn tag(&self) -> &'static str {
        match self {
            Severity::Error => "ERROR",
            Severity::Warning => "WARNING",
            Severity::Info => "INFO",
            Severity::Other => "NOTE",
        }
    }
}

/// A single project rule
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rule {
    pub text: String,
    #[serde(default = "default_severity")]
    pub severity: Severity,
    #[serde(default)]
    pub id: Option<String>,
}

fn default_severity() -> Severity {
    Severity::Other
}

/// The project-level rule set, parsed from JSON or YAML
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Constitution {
    pub version: String,
    pub rules: Vec<Rule>,
}

impl Constitution {
    /// Rules sorted by severity; the sort is stable so same-severity rules
    /// keep file order
    pub fn rules_by_severity(&self) -> Vec<&Rule> {
        let mut rules: Vec<&Rule> = self.rules.iter().collect();
        rules.sort_by_key(|r| r.severity.rank());
        rules
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(text: &str, severity: Severity) -> Rule {
        Rule {
            text: text.into(),
            severity,
            id: None,
        }
    }

    #[test]
    fn test_severity_sort_is_stable() {
        let constitution = Constitution {
            version: "1".into(),
            rules: vec![
                rule("info-a", Severity::Info),
                rule("err-a", Severity::Error),
                rule("info-b", Severity::Info),
                rule("warn-a", Severity::Warning),
                rule("err-b", Severity::Error),
            ],
        };

        let texts: Vec<&str> = constitution.rules_by_severity().iter().map(|r| r.text.as_str()).collect();
        assert_eq!(texts, vec!["err-a", "err-b", "warn-a", "info-a", "info-b"]);
    }

    #[test]
    fn test_unknown_severity_parses_as_other() {
        let json = r#"{"text": "be kind", "severity": "critical"}"#;
        let rule: Rule = serde_json::from_str(json).unwrap();
        assert_eq!(rule.severity, Severity::Other);
    }

    #[test]
    fn test_constitution_yaml() {
        let yaml = r#"
version: "2"
rules:
  - text: no panics in library code
    severity: error
  - text: prefer small modules
    severity: info
"#;
        let c: Constitution = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(c.version, "2");
        assert_eq!(c.rules.len(), 2);
        assert_eq!(c.rules[0].severity, Severity::Error);
    }
}
