// src/config/mod.rs
// Central, explicit configuration for the classification and routing core.
//
// Unlike the teacher's ambient `lazy_static! CONFIG`, spec §9 calls for a
// single immutable config record built once and passed into the core at
// construction — so there is no process-global singleton here.

pub mod helpers;

use crate::domain::{Sentiment, Urgency};
use std::collections::HashMap;
use std::time::Duration;

/// Tri-state backend selector for the Predictor Host (spec §4.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UseRuleBased {
    Force,
    Auto,
    Off,
}

impl UseRuleBased {
    fn from_env_str(s: &str) -> Self {
        match s {
            "force" => UseRuleBased::Force,
            "off" => UseRuleBased::Off,
            _ => UseRuleBased::Auto,
        }
    }
}

/// Consultant assignment strategy (spec §4.6, §4.7).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignmentStrategy {
    RoundRobin,
    SkillMatch,
    LeastLoaded,
}

impl AssignmentStrategy {
    fn from_env_str(s: &str) -> Self {
        match s {
            "skill_match" => AssignmentStrategy::SkillMatch,
            "least_loaded" => AssignmentStrategy::LeastLoaded,
            _ => AssignmentStrategy::RoundRobin,
        }
    }
}

/// Weights used by the routing engine's priority score (spec §4.6).
#[derive(Debug, Clone)]
pub struct ScoringWeights {
    pub urgency: HashMap<Urgency, i32>,
    pub sentiment: HashMap<Sentiment, i32>,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        let urgency = HashMap::from([
            (Urgency::Low, 5),
            (Urgency::Medium, 25),
            (Urgency::High, 55),
            (Urgency::Critical, 80),
        ]);
        let sentiment = HashMap::from([
            (Sentiment::Positive, -5),
            (Sentiment::Neutral, 0),
            (Sentiment::Negative, 10),
        ]);
        Self { urgency, sentiment }
    }
}

/// Per-urgency response SLA (spec §4.6).
#[derive(Debug, Clone)]
pub struct SlaSeconds(pub HashMap<Urgency, u64>);

impl Default for SlaSeconds {
    fn default() -> Self {
        Self(HashMap::from([
            (Urgency::Critical, 3600),
            (Urgency::High, 4 * 3600),
            (Urgency::Medium, 24 * 3600),
            (Urgency::Low, 72 * 3600),
        ]))
    }
}

impl SlaSeconds {
    pub fn get(&self, urgency: Urgency) -> Duration {
        Duration::from_secs(*self.0.get(&urgency).unwrap_or(&(24 * 3600)))
    }
}

/// The full, exhaustive configuration surface from spec §6.
#[derive(Debug, Clone)]
pub struct Config {
    pub use_rule_based: UseRuleBased,
    pub learned_memory_threshold_bytes: u64,
    pub batch_limit_rule_based: Option<usize>,
    pub batch_limit_learned: usize,
    pub drain_worker_count: usize,
    pub per_inquiry_timeout: Duration,
    pub drain_soft_deadline: Duration,
    pub max_processing_attempts: u32,
    pub routing_rules_path: Option<String>,
    pub sla_seconds: SlaSeconds,
    pub assignment_strategy: AssignmentStrategy,
    pub scoring_weights: ScoringWeights,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            use_rule_based: UseRuleBased::Auto,
            learned_memory_threshold_bytes: 16 * 1024 * 1024 * 1024,
            batch_limit_rule_based: None,
            batch_limit_learned: 50,
            drain_worker_count: 4,
            per_inquiry_timeout: Duration::from_secs(30),
            drain_soft_deadline: Duration::from_secs(3300),
            max_processing_attempts: 5,
            routing_rules_path: None,
            sla_seconds: SlaSeconds::default(),
            assignment_strategy: AssignmentStrategy::RoundRobin,
            scoring_weights: ScoringWeights::default(),
        }
    }
}

impl Config {
    /// Load configuration from the environment, falling back to the spec's
    /// documented defaults for anything unset.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            use_rule_based: UseRuleBased::from_env_str(&helpers::env_or(
                "USE_RULE_BASED",
                "auto",
            )),
            learned_memory_threshold_bytes: helpers::env_parsed(
                "LEARNED_MEMORY_THRESHOLD_BYTES",
                defaults.learned_memory_threshold_bytes,
            ),
            batch_limit_rule_based: std::env::var("BATCH_LIMIT_RULE_BASED")
                .ok()
                .and_then(|v| v.parse().ok()),
            batch_limit_learned: helpers::env_parsed(
                "BATCH_LIMIT_LEARNED",
                defaults.batch_limit_learned,
            ),
            drain_worker_count: helpers::env_parsed(
                "DRAIN_WORKER_COUNT",
                defaults.drain_worker_count,
            ),
            per_inquiry_timeout: Duration::from_secs(helpers::env_parsed(
                "PER_INQUIRY_TIMEOUT_SECONDS",
                defaults.per_inquiry_timeout.as_secs(),
            )),
            drain_soft_deadline: Duration::from_secs(helpers::env_parsed(
                "DRAIN_SOFT_DEADLINE_SECONDS",
                defaults.drain_soft_deadline.as_secs(),
            )),
            max_processing_attempts: helpers::env_parsed(
                "MAX_PROCESSING_ATTEMPTS",
                defaults.max_processing_attempts,
            ),
            routing_rules_path: std::env::var("ROUTING_RULES_PATH").ok(),
            assignment_strategy: AssignmentStrategy::from_env_str(&helpers::env_or(
                "ASSIGNMENT_STRATEGY",
                "round_robin",
            )),
            ..defaults
        }
    }
}
