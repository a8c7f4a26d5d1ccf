// src/predict/urgency.rs
// Urgency predictor: canonical text -> (urgency, confidence) (spec §4.4).
// Rule-based only; spec §4.4 names no learned variant for this modality.

use crate::domain::Urgency;
use crate::error::ModelUnavailable;
use crate::normalizer::CanonicalText;
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;

#[derive(Debug, Clone)]
pub struct UrgencyResult {
    pub urgency: Urgency,
    pub confidence: f32,
    pub all_scores: HashMap<Urgency, f32>,
}

#[async_trait]
pub trait UrgencyBackend: Send + Sync {
    async fn predict(&self, text: &CanonicalText) -> Result<UrgencyResult, ModelUnavailable>;
}

/// Ordered rule set (spec §4.4): first matching tier wins, checked from most
/// to least urgent. Each tier's phrases are whole-word/phrase matched,
/// case-insensitive.
struct Tier {
    urgency: Urgency,
    confidence: f32,
    phrases: &'static [&'static str],
}

const TIERS: &[Tier] = &[
    Tier {
        urgency: Urgency::Critical,
        confidence: 0.95,
        phrases: &["urgent", "asap", "emergency", "critical", "immediately", "right now"],
    },
    Tier {
        urgency: Urgency::High,
        confidence: 0.85,
        phrases: &["blocking", "cannot work", "can't work", "down", "outage"],
    },
    Tier {
        urgency: Urgency::Medium,
        confidence: 0.70,
        phrases: &["soon", "today", "this week", "next week"],
    },
];

const DEFAULT_CONFIDENCE: f32 = 0.60;

fn phrase_pattern(phrase: &str) -> String {
    let escaped = regex::escape(phrase);
    if phrase.contains(' ') {
        format!(r"(?i){}", escaped)
    } else {
        format!(r"(?i)\b{}\b", escaped)
    }
}

static COMPILED_TIERS: Lazy<Vec<(Urgency, f32, Vec<Regex>)>> = Lazy::new(|| {
    TIERS
        .iter()
        .map(|tier| {
            let patterns = tier
                .phrases
                .iter()
                .map(|p| Regex::new(&phrase_pattern(p)).expect("urgency pattern is always valid"))
                .collect();
            (tier.urgency, tier.confidence, patterns)
        })
        .collect()
});

fn all_scores_for(urgency: Urgency, confidence: f32) -> HashMap<Urgency, f32> {
    let remainder = (1.0 - confidence).max(0.0) / (Urgency::ALL.len() - 1) as f32;
    Urgency::ALL
        .into_iter()
        .map(|u| if u == urgency { (u, confidence) } else { (u, remainder) })
        .collect()
}

/// Ordered keyword-tier matcher (spec §4.4). Falls through tiers from most
/// to least urgent; anything matching none of them is `Low`.
#[derive(Default)]
pub struct RuleBasedUrgencyPredictor;

impl RuleBasedUrgencyPredictor {
    pub fn new() -> Self {
        Self
    }

    pub fn predict_sync(&self, text: &CanonicalText) -> UrgencyResult {
        for (urgency, confidence, patterns) in COMPILED_TIERS.iter() {
            if patterns.iter().any(|re| re.is_match(&text.full)) {
                return UrgencyResult {
                    urgency: *urgency,
                    confidence: *confidence,
                    all_scores: all_scores_for(*urgency, *confidence),
                };
            }
        }

        UrgencyResult {
            urgency: Urgency::Low,
            confidence: DEFAULT_CONFIDENCE,
            all_scores: all_scores_for(Urgency::Low, DEFAULT_CONFIDENCE),
        }
    }
}

#[async_trait]
impl UrgencyBackend for RuleBasedUrgencyPredictor {
    async fn predict(&self, text: &CanonicalText) -> Result<UrgencyResult, ModelUnavailable> {
        Ok(self.predict_sync(text))
    }
}
