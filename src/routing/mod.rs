// src/routing/mod.rs
// Routing Engine: priority scoring, escalation rules, consultant assignment (spec §4.6).

pub mod pool;
pub mod rules;

use crate::config::{Config, ScoringWeights};
use crate::domain::Department;
use crate::predict::PredictionTriple;
use chrono::{DateTime, Utc};
use pool::ConsultantPool;
use rules::RoutingRules;
use std::collections::HashSet;

/// The routed output of `RoutingEngine::route` (spec §3: RoutingDecision,
/// minus the persistence-only `decided_at`/inquiry reference which the
/// caller supplies).
#[derive(Debug, Clone)]
pub struct RoutingDecision {
    pub department: Department,
    pub consultant: Option<String>,
    pub priority_score: u8,
    pub escalated: bool,
    pub response_deadline: DateTime<Utc>,
    pub decided_at: DateTime<Utc>,
}

/// Skill tags derived from category, used by `skill_match` assignment.
/// Keeps the department/category coupling out of the Consultant Pool
/// itself (spec §9: "the pool is a pure capability... never calls back").
fn skill_tags_for(category: crate::domain::Category) -> HashSet<String> {
    HashSet::from([category.as_str().to_string()])
}

/// Computes the weighted priority score (spec §4.6), clamped to [0,100] and
/// integer-rounded at the end.
fn priority_score(weights: &ScoringWeights, triple: &PredictionTriple, boost: i32) -> u8 {
    let urgency_w = *weights.urgency.get(&triple.urgency.urgency).unwrap_or(&0);
    let sentiment_w = *weights.sentiment.get(&triple.sentiment.sentiment).unwrap_or(&0);
    let raw = urgency_w + sentiment_w + boost;
    raw.clamp(0, 100) as u8
}

/// Consumes `(text, PredictionTriple)` and emits a `RoutingDecision` (spec
/// §4.6). Holds no mutable state of its own; all mutation lives in the
/// injected `ConsultantPool`.
pub struct RoutingEngine<'a> {
    config: &'a Config,
    rules: &'a RoutingRules,
    pool: &'a ConsultantPool,
}

impl<'a> RoutingEngine<'a> {
    pub fn new(config: &'a Config, rules: &'a RoutingRules, pool: &'a ConsultantPool) -> Self {
        Self { config, rules, pool }
    }

    pub fn route(&self, triple: &PredictionTriple, decided_at: DateTime<Utc>) -> RoutingDecision {
        let matched = self.rules.first_match(triple);

        let (department, boost, escalated) = match matched {
            Some(rule) => (rule.then.department, rule.then.priority_boost, rule.then.escalated),
            None => (triple.category.category.default_department(), 0, false),
        };

        let mut priority_score = priority_score(&self.config.scoring_weights, triple, boost);
        // Invariant (spec §3): escalated ⇒ priority_score ≥ 80. A rule that
        // escalates but under-scores the inquiry still floors to 80 rather
        // than violating the invariant.
        if escalated {
            priority_score = priority_score.max(80);
        }

        let skill_tags = skill_tags_for(triple.category.category);
        let consultant = self
            .pool
            .assign(department, self.config.assignment_strategy, &skill_tags);

        let response_deadline = decided_at + self.config.sla_seconds.get(triple.urgency.urgency);

        RoutingDecision {
            department,
            consultant,
            priority_score,
            escalated,
            response_deadline,
            decided_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Category, Sentiment, Urgency};
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

    #[test]
    fn no_matching_rule_falls_back_to_default_department() {
        let config = Config::default();
        let rules = RoutingRules::empty();
        let pool = ConsultantPool::new();
        let engine = RoutingEngine::new(&config, &rules, &pool);

        let t = triple(Urgency::Low, Sentiment::Neutral, Category::Sales);
        let decision = engine.route(&t, Utc::now());
        assert_eq!(decision.department, Department::Sales);
        assert!(!decision.escalated);
    }

    #[test]
    fn priority_score_is_bounded() {
        let config = Config::default();
        let rules = RoutingRules::empty();
        let pool = ConsultantPool::new();
        let engine = RoutingEngine::new(&config, &rules, &pool);

        let t = triple(Urgency::Critical, Sentiment::Negative, Category::Legal);
        let decision = engine.route(&t, Utc::now());
        assert!(decision.priority_score <= 100);
    }

    #[test]
    fn matched_rule_overrides_default_department_and_escalates() {
        let config = Config::default();
        let rules = RoutingRules::parse(
            r#"
- name: critical_escalation
  when:
    urgency: [critical]
  then:
    department: escalation
    priority_boost: 20
    escalated: true
"#,
        )
        .unwrap();
        let pool = ConsultantPool::new();
        let engine = RoutingEngine::new(&config, &rules, &pool);

        let t = triple(Urgency::Critical, Sentiment::Negative, Category::TechnicalSupport);
        let decision = engine.route(&t, Utc::now());
        assert_eq!(decision.department, Department::Escalation);
        assert!(decision.escalated);
        assert!(decision.priority_score >= 80);
    }

    #[test]
    fn empty_pool_yields_null_consultant() {
        let config = Config::default();
        let rules = RoutingRules::empty();
        let pool = ConsultantPool::new();
        let engine = RoutingEngine::new(&config, &rules, &pool);

        let t = triple(Urgency::Low, Sentiment::Neutral, Category::Hr);
        let decision = engine.route(&t, Utc::now());
        assert!(decision.consultant.is_none());
    }
}
