// src/predict/mod.rs
// The three independent predictors and the host that owns them (spec §4.2-§4.5).

pub mod category;
pub mod host;
pub mod sentiment;
pub mod urgency;
pub mod zero_shot;

pub use category::CategoryResult;
pub use host::PredictorHost;
pub use sentiment::SentimentResult;
pub use urgency::UrgencyResult;

/// The combined output of the three predictors for one inquiry (spec GLOSSARY:
/// PredictionTriple).
#[derive(Debug, Clone)]
pub struct PredictionTriple {
    pub category: CategoryResult,
    pub sentiment: SentimentResult,
    pub urgency: UrgencyResult,
}

/// Which concrete backend produced a prediction for a modality. Exposed only
/// for metrics/logging; callers never branch on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    Learned,
    RuleBased,
}

impl Backend {
    pub fn as_str(&self) -> &'static str {
        match self {
            Backend::Learned => "learned",
            Backend::RuleBased => "rule_based",
        }
    }
}
