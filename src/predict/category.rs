// src/predict/category.rs
// Category predictor: canonical text -> (category, confidence, all_scores) (spec §4.2).

use crate::domain::Category;
use crate::error::ModelUnavailable;
use crate::normalizer::CanonicalText;
use crate::predict::zero_shot::ZeroShotClassifier;
use async_trait::async_trait;
use regex::Regex;
use std::collections::HashMap;

#[derive(Debug, Clone)]
pub struct CategoryResult {
    pub category: Category,
    pub confidence: f32,
    pub all_scores: HashMap<Category, f32>,
}

/// A predictor backend for the category modality. The learned variant is a
/// zero-shot entailment classifier over `Category::ALL` as candidate labels
/// (spec §4.2); it is expected to be slow and heavy, hence `async` and
/// fallible with `ModelUnavailable`.
#[async_trait]
pub trait CategoryBackend: Send + Sync {
    async fn predict(&self, text: &CanonicalText) -> Result<CategoryResult, ModelUnavailable>;
}

/// Picks `argmax(all_scores)`, breaking ties (within 1e-6) in favor of the
/// category that appears earliest in `Category::ALL` (spec §4.2).
pub fn argmax_with_tiebreak(all_scores: &HashMap<Category, f32>) -> Category {
    let mut best = Category::ALL[0];
    let mut best_score = all_scores.get(&best).copied().unwrap_or(0.0);
    for cat in Category::ALL.into_iter().skip(1) {
        let score = all_scores.get(&cat).copied().unwrap_or(0.0);
        if score > best_score + 1e-6 {
            best = cat;
            best_score = score;
        }
    }
    best
}

fn softmax(scores: &HashMap<Category, f32>) -> HashMap<Category, f32> {
    let max = scores.values().cloned().fold(f32::MIN, f32::max);
    let exps: HashMap<Category, f32> = scores
        .iter()
        .map(|(k, v)| (*k, (v - max).exp()))
        .collect();
    let sum: f32 = exps.values().sum();
    if sum <= 0.0 {
        let uniform = 1.0 / Category::ALL.len() as f32;
        return Category::ALL.into_iter().map(|c| (c, uniform)).collect();
    }
    exps.into_iter().map(|(k, v)| (k, v / sum)).collect()
}

/// `(phrase, rarity weight)`. Rarer / more distinctive phrases carry a
/// higher weight so a single strong signal can outweigh several generic
/// ones.
type WeightedKeywords = &'static [(&'static str, f32)];

const TECHNICAL_SUPPORT: WeightedKeywords = &[
    ("login", 2.0),
    ("log in", 2.0),
    ("password", 2.0),
    ("error", 1.5),
    ("bug", 2.0),
    ("crash", 2.5),
    ("not working", 2.0),
    ("authentication", 2.5),
    ("api", 1.5),
    ("server", 1.5),
    ("outage", 2.5),
    ("install", 1.5),
    ("update", 1.0),
    ("sync", 1.5),
    ("slow", 1.0),
    ("broken", 2.0),
];

const BILLING: WeightedKeywords = &[
    ("invoice", 2.5),
    ("charge", 2.0),
    ("charged", 2.0),
    ("refund", 2.5),
    ("payment", 2.0),
    ("subscription", 1.5),
    ("billing", 3.0),
    ("price", 1.5),
    ("overcharged", 3.0),
    ("credit card", 2.0),
    ("receipt", 2.0),
    ("duplicate charge", 3.0),
    ("plan", 1.0),
];

const SALES: WeightedKeywords = &[
    ("demo", 2.5),
    ("pricing", 1.5),
    ("quote", 2.5),
    ("trial", 2.0),
    ("upgrade", 1.5),
    ("enterprise", 2.0),
    ("purchase", 1.5),
    ("discount", 2.0),
    ("schedule a demo", 3.0),
    ("sales", 2.5),
    ("contract", 1.5),
];

const HR: WeightedKeywords = &[
    ("resume", 2.5),
    ("job", 1.5),
    ("career", 2.0),
    ("hiring", 2.5),
    ("interview", 2.0),
    ("employment", 2.0),
    ("benefits", 2.0),
    ("payroll", 2.5),
    ("hr", 2.5),
    ("human resources", 3.0),
];

const LEGAL: WeightedKeywords = &[
    ("lawsuit", 3.0),
    ("legal", 2.5),
    ("compliance", 2.0),
    ("contract", 1.5),
    ("terms of service", 2.5),
    ("gdpr", 2.5),
    ("privacy policy", 2.0),
    ("attorney", 3.0),
    ("subpoena", 3.0),
    ("liability", 2.0),
];

const PRODUCT_FEEDBACK: WeightedKeywords = &[
    ("feature request", 3.0),
    ("suggestion", 2.0),
    ("feedback", 2.5),
    ("would be great", 2.0),
    ("love", 1.0),
    ("thank you", 1.5),
    ("amazing", 1.5),
    ("improve", 1.5),
    ("idea", 1.5),
    ("wish", 1.5),
];

fn keywords_for(category: Category) -> WeightedKeywords {
    match category {
        Category::TechnicalSupport => TECHNICAL_SUPPORT,
        Category::Billing => BILLING,
        Category::Sales => SALES,
        Category::Hr => HR,
        Category::Legal => LEGAL,
        Category::ProductFeedback => PRODUCT_FEEDBACK,
    }
}

fn phrase_regex(phrase: &str) -> Regex {
    let escaped = regex::escape(phrase);
    let pattern = format!(r"(?i)\b{}\b", escaped);
    Regex::new(&pattern).expect("keyword pattern is always valid")
}

/// Keyword-match scorer with per-category weighted keyword lists (spec §4.2).
/// A match in `subject` counts at 2x a match in `body`.
pub struct RuleBasedCategoryPredictor {
    compiled: HashMap<Category, Vec<(Regex, f32)>>,
}

impl RuleBasedCategoryPredictor {
    pub fn new() -> Self {
        let compiled = Category::ALL
            .into_iter()
            .map(|cat| {
                let entries = keywords_for(cat)
                    .iter()
                    .map(|(phrase, weight)| (phrase_regex(phrase), *weight))
                    .collect();
                (cat, entries)
            })
            .collect();
        Self { compiled }
    }

    fn score_text(&self, category: Category, text: &str) -> f32 {
        self.compiled[&category]
            .iter()
            .filter(|(re, _)| re.is_match(text))
            .map(|(_, w)| *w)
            .sum()
    }

    pub fn predict_sync(&self, text: &CanonicalText) -> CategoryResult {
        let raw_scores: HashMap<Category, f32> = Category::ALL
            .into_iter()
            .map(|cat| {
                let subject_score = self.score_text(cat, &text.subject) * 2.0;
                let body_score = self.score_text(cat, &text.body);
                (cat, subject_score + body_score)
            })
            .collect();

        let all_scores = softmax(&raw_scores);
        let category = argmax_with_tiebreak(&all_scores);
        let confidence = all_scores[&category];

        CategoryResult {
            category,
            confidence,
            all_scores,
        }
    }
}

impl Default for RuleBasedCategoryPredictor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CategoryBackend for RuleBasedCategoryPredictor {
    async fn predict(&self, text: &CanonicalText) -> Result<CategoryResult, ModelUnavailable> {
        Ok(self.predict_sync(text))
    }
}

/// Zero-shot entailment over `Category::ALL` as candidate labels (spec
/// §4.2's learned variant).
pub struct LearnedCategoryPredictor {
    classifier: ZeroShotClassifier,
}

impl LearnedCategoryPredictor {
    pub fn new(classifier: ZeroShotClassifier) -> Self {
        Self { classifier }
    }
}

#[async_trait]
impl CategoryBackend for LearnedCategoryPredictor {
    async fn predict(&self, text: &CanonicalText) -> Result<CategoryResult, ModelUnavailable> {
        let labels: Vec<&str> = Category::ALL.iter().map(|c| c.as_str()).collect();
        let raw = self.classifier.score_labels(text.as_str(), &labels)?;

        let raw_scores: HashMap<Category, f32> = Category::ALL
            .into_iter()
            .zip(raw.into_iter())
            .collect();

        let all_scores = softmax(&raw_scores);
        let category = argmax_with_tiebreak(&all_scores);
        let confidence = all_scores[&category];

        Ok(CategoryResult {
            category,
            confidence,
            all_scores,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scores_sum_to_one() {
        let predictor = RuleBasedCategoryPredictor::new();
        let text = crate::normalizer::normalize("login issue", "I cannot log in").unwrap();
        let result = predictor.predict_sync(&text);
        let sum: f32 = result.all_scores.values().sum();
        assert!((sum - 1.0).abs() < 1e-3);
    }

    #[test]
    fn subject_keywords_outweigh_body() {
        let predictor = RuleBasedCategoryPredictor::new();
        let text =
            crate::normalizer::normalize("refund request", "just a general question").unwrap();
        let result = predictor.predict_sync(&text);
        assert_eq!(result.category, Category::Billing);
    }

    #[test]
    fn unrecognized_text_falls_back_to_uniform_tiebreak() {
        let predictor = RuleBasedCategoryPredictor::new();
        let text = crate::normalizer::normalize("hello", "just saying hi").unwrap();
        let result = predictor.predict_sync(&text);
        assert_eq!(result.category, Category::ALL[0]);
    }
}
