// src/routing/rules.rs
// Declarative escalation rules, loaded from YAML at startup (spec §6).

use crate::domain::{Category, Department, Sentiment, Urgency};
use crate::error::CoreError;
use crate::predict::PredictionTriple;
use serde::Deserialize;
use std::path::Path;

/// One escalation rule as authored in the rules file. Any `when` axis left
/// unset is a wildcard.
#[derive(Debug, Clone, Deserialize)]
pub struct EscalationRuleSpec {
    pub name: String,
    #[serde(default)]
    pub when: WhenSpec,
    pub then: ThenSpec,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct WhenSpec {
    pub urgency: Option<Vec<Urgency>>,
    pub sentiment: Option<Vec<Sentiment>>,
    pub category: Option<Vec<Category>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ThenSpec {
    /// Mandatory: a rule that fires but doesn't say where to route is a
    /// configuration error, not a silent no-op.
    pub department: Department,
    #[serde(default)]
    pub priority_boost: i32,
    #[serde(default)]
    pub escalated: bool,
}

/// A compiled, ready-to-match escalation rule.
#[derive(Debug, Clone)]
pub struct EscalationRule {
    pub name: String,
    pub when: WhenSpec,
    pub then: ThenSpec,
}

impl EscalationRule {
    /// Whether this rule's `when` clause matches the given prediction.
    /// Every specified axis must contain the observed value; an absent axis
    /// is a wildcard.
    pub fn matches(&self, triple: &PredictionTriple) -> bool {
        let urgency_ok = self
            .when
            .urgency
            .as_ref()
            .is_none_or(|set| set.contains(&triple.urgency.urgency));
        let sentiment_ok = self
            .when
            .sentiment
            .as_ref()
            .is_none_or(|set| set.contains(&triple.sentiment.sentiment));
        let category_ok = self
            .when
            .category
            .as_ref()
            .is_none_or(|set| set.contains(&triple.category.category));
        urgency_ok && sentiment_ok && category_ok
    }
}

/// The ordered rule set. First match wins (spec §4.6); an empty set means
/// every inquiry falls through to the default `category_to_department`
/// mapping, which is a valid production configuration (spec §9).
#[derive(Debug, Clone, Default)]
pub struct RoutingRules {
    pub rules: Vec<EscalationRule>,
}

impl RoutingRules {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Parses the declarative YAML rules file (spec §6). Each rule is
    /// compiled in file order; that order is preserved as match precedence.
    pub fn load(path: &Path) -> Result<Self, CoreError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    pub fn parse(yaml: &str) -> Result<Self, CoreError> {
        let specs: Vec<EscalationRuleSpec> = serde_yaml::from_str(yaml)
            .map_err(|e| CoreError::routing_rules(format!("invalid routing rules: {e}")))?;
        let rules = specs
            .into_iter()
            .map(|spec| EscalationRule {
                name: spec.name,
                when: spec.when,
                then: spec.then,
            })
            .collect();
        Ok(Self { rules })
    }

    /// Returns the first matching rule, if any (spec §4.6: "first match wins").
    pub fn first_match(&self, triple: &PredictionTriple) -> Option<&EscalationRule> {
        self.rules.iter().find(|rule| rule.matches(triple))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::predict::category::CategoryResult;
    use crate::predict::sentiment::SentimentResult;
    use crate::predict::urgency::UrgencyResult;
    use std::collections::HashMap;

    fn triple(urgency: Urgency, sentiment: Sentiment, category: Category) -> PredictionTriple {
        PredictionTriple {
            category: CategoryResult {
                category,
                confidence: 0.9,
                all_scores: HashMap::new(),
            },
            sentiment: SentimentResult {
                sentiment,
                confidence: 0.9,
                all_scores: HashMap::new(),
            },
            urgency: UrgencyResult {
                urgency,
                confidence: 0.9,
                all_scores: HashMap::new(),
            },
        }
    }

    const SAMPLE_YAML: &str = r#"
- name: critical_negative_billing
  when:
    urgency: [critical, high]
    sentiment: [negative]
    category: [billing, legal]
  then:
    department: escalation
    priority_boost: 20
    escalated: true
- name: any_critical
  when:
    urgency: [critical]
  then:
    department: escalation
    escalated: true
"#;

    #[test]
    fn first_matching_rule_wins() {
        let rules = RoutingRules::parse(SAMPLE_YAML).unwrap();
        let t = triple(Urgency::Critical, Sentiment::Negative, Category::Billing);
        let matched = rules.first_match(&t).unwrap();
        assert_eq!(matched.name, "critical_negative_billing");
        assert_eq!(matched.then.priority_boost, 20);
    }

    #[test]
    fn falls_through_to_later_rule_when_earlier_does_not_match() {
        let rules = RoutingRules::parse(SAMPLE_YAML).unwrap();
        let t = triple(Urgency::Critical, Sentiment::Positive, Category::Sales);
        let matched = rules.first_match(&t).unwrap();
        assert_eq!(matched.name, "any_critical");
        assert_eq!(matched.then.priority_boost, 0);
    }

    #[test]
    fn no_rule_matches_returns_none() {
        let rules = RoutingRules::parse(SAMPLE_YAML).unwrap();
        let t = triple(Urgency::Low, Sentiment::Neutral, Category::Hr);
        assert!(rules.first_match(&t).is_none());
    }

    #[test]
    fn empty_rules_is_a_valid_configuration() {
        let rules = RoutingRules::empty();
        let t = triple(Urgency::Critical, Sentiment::Negative, Category::Billing);
        assert!(rules.first_match(&t).is_none());
    }

    #[test]
    fn load_reads_rules_from_a_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        std::io::Write::write_all(&mut file, SAMPLE_YAML.as_bytes()).unwrap();

        let rules = RoutingRules::load(file.path()).unwrap();
        let t = triple(Urgency::Critical, Sentiment::Negative, Category::Billing);
        let matched = rules.first_match(&t).unwrap();
        assert_eq!(matched.name, "critical_negative_billing");
    }

    #[test]
    fn load_reports_routing_rules_error_for_malformed_yaml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        std::io::Write::write_all(&mut file, b"not: [valid, rules").unwrap();

        let err = RoutingRules::load(file.path()).unwrap_err();
        assert!(matches!(err, CoreError::RoutingRules(_)));
    }
}
