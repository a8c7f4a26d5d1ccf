// src/predict/sentiment.rs
// Sentiment predictor: canonical text -> (sentiment, confidence) (spec §4.3).

use crate::domain::Sentiment;
use crate::error::ModelUnavailable;
use crate::normalizer::CanonicalText;
use crate::predict::zero_shot::ZeroShotClassifier;
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;

#[derive(Debug, Clone)]
pub struct SentimentResult {
    pub sentiment: Sentiment,
    pub confidence: f32,
    pub all_scores: HashMap<Sentiment, f32>,
}

#[async_trait]
pub trait SentimentBackend: Send + Sync {
    async fn predict(&self, text: &CanonicalText) -> Result<SentimentResult, ModelUnavailable>;
}

const POSITIVE_WORDS: &[(&str, f32)] = &[
    ("great", 1.0),
    ("love", 1.5),
    ("excellent", 1.5),
    ("amazing", 1.5),
    ("thank you", 1.0),
    ("thanks", 1.0),
    ("happy", 1.0),
    ("pleased", 1.0),
    ("fantastic", 1.5),
    ("wonderful", 1.5),
    ("appreciate", 1.0),
    ("good", 0.75),
    ("helpful", 1.0),
];

const NEGATIVE_WORDS: &[(&str, f32)] = &[
    ("terrible", 1.5),
    ("awful", 1.5),
    ("hate", 1.5),
    ("angry", 1.25),
    ("frustrated", 1.25),
    ("disappointed", 1.25),
    ("broken", 1.0),
    ("worst", 1.5),
    ("useless", 1.25),
    ("unacceptable", 1.5),
    ("bad", 0.75),
    ("annoyed", 1.0),
    ("complaint", 1.0),
    ("blocking", 1.0),
    ("incorrect", 1.0),
    ("duplicate", 0.75),
    ("error", 0.75),
    ("issue", 0.75),
    ("problem", 0.75),
];

const INTENSIFIERS: &[(&str, f32)] = &[
    ("very", 1.5),
    ("extremely", 2.0),
    ("really", 1.3),
    ("absolutely", 1.75),
    ("so", 1.2),
];

const NEGATORS: &[&str] = &["not", "no", "never", "n't", "without"];

/// How many tokens ahead of a negator still get flipped (spec §4.3: "not good" negates).
const NEGATION_WINDOW: usize = 3;

static WORD: Lazy<Regex> = Lazy::new(|| Regex::new(r"[A-Za-z']+").unwrap());

struct Lexicon {
    positive: HashMap<&'static str, f32>,
    negative: HashMap<&'static str, f32>,
    intensifiers: HashMap<&'static str, f32>,
}

static LEXICON: Lazy<Lexicon> = Lazy::new(|| Lexicon {
    positive: POSITIVE_WORDS.iter().cloned().collect(),
    negative: NEGATIVE_WORDS.iter().cloned().collect(),
    intensifiers: INTENSIFIERS.iter().cloned().collect(),
});

/// Tokenizes lowercase, then walks the token stream tracking:
/// - an active intensifier multiplier that applies to the next polarity word
/// - a negation flag that flips polarity for up to `NEGATION_WINDOW` tokens
///   after a negator (spec §4.3: negation flips sign within a short window)
fn lexicon_scores(text: &str) -> (f32, f32) {
    let lower = text.to_lowercase();
    let tokens: Vec<&str> = WORD.find_iter(&lower).map(|m| m.as_str()).collect();

    let mut positive = 0.0f32;
    let mut negative = 0.0f32;
    let mut intensifier = 1.0f32;
    let mut negation_remaining = 0usize;

    for (i, tok) in tokens.iter().enumerate() {
        if is_negator(tok, tokens.get(i.wrapping_sub(1))) {
            negation_remaining = NEGATION_WINDOW;
            continue;
        }

        if let Some(mult) = LEXICON.intensifiers.get(tok) {
            intensifier = *mult;
            continue;
        }

        let negated = negation_remaining > 0;
        if negation_remaining > 0 {
            negation_remaining -= 1;
        }

        if let Some(weight) = LEXICON.positive.get(tok) {
            let contribution = weight * intensifier;
            if negated {
                negative += contribution;
            } else {
                positive += contribution;
            }
            intensifier = 1.0;
        } else if let Some(weight) = LEXICON.negative.get(tok) {
            let contribution = weight * intensifier;
            if negated {
                positive += contribution;
            } else {
                negative += contribution;
            }
            intensifier = 1.0;
        }
    }

    (positive, negative)
}

fn is_negator(tok: &str, _prev: Option<&&str>) -> bool {
    NEGATORS.contains(&tok) || tok.ends_with("n't")
}

/// Keyword/lexicon scorer with intensifier and negation handling (spec §4.3).
/// Ties (within 1e-6) resolve to `Sentiment::Neutral`.
#[derive(Default)]
pub struct RuleBasedSentimentPredictor;

impl RuleBasedSentimentPredictor {
    pub fn new() -> Self {
        Self
    }

    pub fn predict_sync(&self, text: &CanonicalText) -> SentimentResult {
        let (positive, negative) = lexicon_scores(&text.full);
        let diff = positive - negative;

        let sentiment = if diff.abs() <= 1e-6 {
            Sentiment::Neutral
        } else if diff > 0.0 {
            Sentiment::Positive
        } else {
            Sentiment::Negative
        };

        let magnitude = positive.max(negative).max(1.0);
        let mut all_scores = HashMap::new();
        all_scores.insert(Sentiment::Positive, (positive / (magnitude * 2.0)).min(1.0));
        all_scores.insert(Sentiment::Negative, (negative / (magnitude * 2.0)).min(1.0));
        let used: f32 = all_scores.values().sum();
        all_scores.insert(Sentiment::Neutral, (1.0 - used).max(0.0));

        let confidence = all_scores[&sentiment];

        SentimentResult {
            sentiment,
            confidence,
            all_scores,
        }
    }
}

#[async_trait]
impl SentimentBackend for RuleBasedSentimentPredictor {
    async fn predict(&self, text: &CanonicalText) -> Result<SentimentResult, ModelUnavailable> {
        Ok(self.predict_sync(text))
    }
}

/// Zero-shot entailment over the three sentiment labels (spec §4.3's learned
/// variant). Label order fixed so `ZeroShotClassifier::score_labels`'s
/// output vector lines up with `Sentiment::ALL`.
pub struct LearnedSentimentPredictor {
    classifier: ZeroShotClassifier,
}

impl LearnedSentimentPredictor {
    pub fn new(classifier: ZeroShotClassifier) -> Self {
        Self { classifier }
    }
}

#[async_trait]
impl SentimentBackend for LearnedSentimentPredictor {
    async fn predict(&self, text: &CanonicalText) -> Result<SentimentResult, ModelUnavailable> {
        let labels = ["positive", "neutral", "negative"];
        let raw = self.classifier.score_labels(text.as_str(), &labels)?;

        let max = raw.iter().cloned().fold(f32::MIN, f32::max);
        let exps: Vec<f32> = raw.iter().map(|v| (v - max).exp()).collect();
        let sum: f32 = exps.iter().sum();
        let probs: Vec<f32> = if sum > 0.0 {
            exps.iter().map(|v| v / sum).collect()
        } else {
            vec![1.0 / labels.len() as f32; labels.len()]
        };

        let mut all_scores = HashMap::new();
        all_scores.insert(Sentiment::Positive, probs[0]);
        all_scores.insert(Sentiment::Neutral, probs[1]);
        all_scores.insert(Sentiment::Negative, probs[2]);

        let sentiment = [Sentiment::Positive, Sentiment::Neutral, Sentiment::Negative]
            .into_iter()
            .max_by(|a, b| all_scores[a].partial_cmp(&all_scores[b]).unwrap())
            .unwrap();
        let confidence = all_scores[&sentiment];

        Ok(SentimentResult {
            sentiment,
            confidence,
            all_scores,
        })
    }
}
