// src/predict/host.rs
// Owns the three predictor modalities, lazily loading learned backends and
// falling back to rule-based ones when they're unavailable (spec §4.5).

use crate::config::{Config, UseRuleBased};
use crate::error::{CoreError, ModelUnavailable};
use crate::metrics;
use crate::normalizer::CanonicalText;
use crate::predict::category::{CategoryBackend, LearnedCategoryPredictor, RuleBasedCategoryPredictor};
use crate::predict::sentiment::{LearnedSentimentPredictor, RuleBasedSentimentPredictor, SentimentBackend};
use crate::predict::urgency::{RuleBasedUrgencyPredictor, UrgencyBackend};
use crate::predict::zero_shot::{ZeroShotClassifier, ZeroShotModelSpec};
use crate::predict::PredictionTriple;
use std::fs;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::OnceCell;

/// Reads resident-available memory from `/proc/meminfo` (`MemAvailable`, in
/// kB). Returns `None` on any non-Linux host or parse failure, in which case
/// the host assumes the threshold is satisfied rather than pulling in a
/// systems-info crate for a single number.
fn available_memory_bytes() -> Option<u64> {
    let contents = fs::read_to_string("/proc/meminfo").ok()?;
    for line in contents.lines() {
        if let Some(rest) = line.strip_prefix("MemAvailable:") {
            let kb: u64 = rest.trim().trim_end_matches(" kB").trim().parse().ok()?;
            return Some(kb * 1024);
        }
    }
    None
}

fn memory_probe_ok(config: &Config) -> bool {
    match available_memory_bytes() {
        Some(bytes) => bytes >= config.learned_memory_threshold_bytes,
        None => true,
    }
}

/// Whether the host should attempt to use a learned backend at all, per
/// `use_rule_based` and the memory probe (spec §4.5):
/// - `force`, or `auto` with the probe below threshold: rule-based only.
/// - `auto` with the probe above threshold: attempt learned, fall back
///   permanently on failure.
/// - `off`: learned only, failures are not masked.
fn should_attempt_learned(config: &Config) -> bool {
    match config.use_rule_based {
        UseRuleBased::Force => false,
        UseRuleBased::Off => true,
        UseRuleBased::Auto => memory_probe_ok(config),
    }
}

/// Outcome of resolving a modality's backend for one `predict` call.
enum Resolved<B> {
    /// No learned backend should be used; fall straight to rule-based.
    RuleBasedOnly,
    /// A learned backend is loaded and ready.
    Learned(Arc<B>),
    /// A learned backend was attempted but failed to load. In `auto` mode
    /// this means "already fell back, use rule-based"; in `off` mode it
    /// means "surface as a classification error."
    LoadFailed(ModelUnavailable),
}

/// Flips `flag` from false to true and emits `fallback_activated` exactly
/// once for the transition (spec §4.5, §8 property 6: the event fires once
/// per modality per process, not once per `predict` call). Callers already
/// holding a fallen-back modality see the `compare_exchange` fail and skip
/// the metric silently.
fn mark_fallen_back(flag: &AtomicBool, modality: &str, reason: &str) {
    if flag
        .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
        .is_ok()
    {
        metrics::record_fallback_activated(modality, reason);
    }
}

/// Owns lazily-loaded learned backends for all three modalities and decides,
/// per spec §4.5, whether to use them or fall back to rule-based prediction.
/// Once a learned backend fails to load in `auto` mode, the host falls back
/// to rule-based for the remainder of the process (spec §4.5: "permanent
/// per-process fallback").
pub struct PredictorHost {
    config: Arc<Config>,
    model_spec: ZeroShotModelSpec,

    category_rule_based: RuleBasedCategoryPredictor,
    sentiment_rule_based: RuleBasedSentimentPredictor,
    urgency_rule_based: RuleBasedUrgencyPredictor,

    category_learned: OnceCell<Result<Arc<LearnedCategoryPredictor>, ModelUnavailable>>,
    sentiment_learned: OnceCell<Result<Arc<LearnedSentimentPredictor>, ModelUnavailable>>,

    /// Set permanently (in `auto` mode) the first time the category modality
    /// falls back, whether the trigger was a load failure or an inference
    /// failure on an already-loaded backend. Checked before every later
    /// attempt to use the learned backend (spec §4.5: "permanently switch...
    /// for the process lifetime").
    category_fallen_back: AtomicBool,
    sentiment_fallen_back: AtomicBool,
}

impl PredictorHost {
    pub fn new(config: Arc<Config>, model_spec: ZeroShotModelSpec) -> Self {
        Self {
            config,
            model_spec,
            category_rule_based: RuleBasedCategoryPredictor::new(),
            sentiment_rule_based: RuleBasedSentimentPredictor::new(),
            urgency_rule_based: RuleBasedUrgencyPredictor::new(),
            category_learned: OnceCell::new(),
            sentiment_learned: OnceCell::new(),
            category_fallen_back: AtomicBool::new(false),
            sentiment_fallen_back: AtomicBool::new(false),
        }
    }

    /// Loads the shared zero-shot classifier exactly once, coalescing
    /// concurrent first callers (spec §4.5: "concurrent first-use must not
    /// trigger duplicate loads").
    async fn load_classifier(&self) -> Result<ZeroShotClassifier, ModelUnavailable> {
        let model_dir = self.model_spec.model_dir.clone();
        let load_timeout = self.model_spec.load_timeout;
        let result = tokio::time::timeout(
            load_timeout,
            tokio::task::spawn_blocking(move || ZeroShotClassifier::load(&model_dir)),
        )
        .await;

        match result {
            Ok(Ok(inner)) => inner,
            Ok(Err(_join_err)) => Err(ModelUnavailable::NotPresent(
                "model load task panicked".to_string(),
            )),
            Err(_elapsed) => Err(ModelUnavailable::LoadTimeout(load_timeout)),
        }
    }

    async fn category_backend(&self) -> Resolved<LearnedCategoryPredictor> {
        if !should_attempt_learned(&self.config) {
            return Resolved::RuleBasedOnly;
        }
        // Already permanently fallen back (load or inference failure):
        // don't even consult the cached `Ok` backend again.
        if self.category_fallen_back.load(Ordering::SeqCst) {
            return Resolved::RuleBasedOnly;
        }
        let loaded = self
            .category_learned
            .get_or_init(|| async {
                self.load_classifier()
                    .await
                    .map(|c| Arc::new(LearnedCategoryPredictor::new(c)))
            })
            .await;
        match loaded {
            Ok(backend) => Resolved::Learned(backend.clone()),
            Err(e) => {
                if !self.is_off_mode() {
                    mark_fallen_back(&self.category_fallen_back, "category", &e.to_string());
                }
                Resolved::LoadFailed(e.clone())
            }
        }
    }

    async fn sentiment_backend(&self) -> Resolved<LearnedSentimentPredictor> {
        if !should_attempt_learned(&self.config) {
            return Resolved::RuleBasedOnly;
        }
        if self.sentiment_fallen_back.load(Ordering::SeqCst) {
            return Resolved::RuleBasedOnly;
        }
        let loaded = self
            .sentiment_learned
            .get_or_init(|| async {
                self.load_classifier()
                    .await
                    .map(|c| Arc::new(LearnedSentimentPredictor::new(c)))
            })
            .await;
        match loaded {
            Ok(backend) => Resolved::Learned(backend.clone()),
            Err(e) => {
                if !self.is_off_mode() {
                    mark_fallen_back(&self.sentiment_fallen_back, "sentiment", &e.to_string());
                }
                Resolved::LoadFailed(e.clone())
            }
        }
    }

    fn is_off_mode(&self) -> bool {
        matches!(self.config.use_rule_based, UseRuleBased::Off)
    }

    /// The host's current overall mode (spec §4.8 step 1: "consult the
    /// Predictor Host current mode"). Rule-based once `use_rule_based` rules
    /// out learned backends entirely, or once every learned-capable
    /// modality has already permanently fallen back.
    pub fn current_mode(&self) -> crate::predict::Backend {
        if !should_attempt_learned(&self.config) {
            return crate::predict::Backend::RuleBased;
        }
        let category_fell_back = self.category_fallen_back.load(Ordering::SeqCst);
        let sentiment_fell_back = self.sentiment_fallen_back.load(Ordering::SeqCst);
        if category_fell_back && sentiment_fell_back {
            crate::predict::Backend::RuleBased
        } else {
            crate::predict::Backend::Learned
        }
    }

    /// Opaque identifier of the predictor version set currently in effect
    /// (spec §3: `Prediction::model_identifier`). Best-effort and
    /// non-blocking: it reports `learned` only for a modality whose learned
    /// backend has already been loaded successfully, never triggers a load
    /// itself.
    pub fn model_identifier(&self) -> String {
        let category = if self.category_fallen_back.load(Ordering::SeqCst) {
            "rule_based"
        } else {
            match self.category_learned.get() {
                Some(Ok(_)) => "learned",
                _ => "rule_based",
            }
        };
        let sentiment = if self.sentiment_fallen_back.load(Ordering::SeqCst) {
            "rule_based"
        } else {
            match self.sentiment_learned.get() {
                Some(Ok(_)) => "learned",
                _ => "rule_based",
            }
        };
        format!("category={category},sentiment={sentiment},urgency=rule_based")
    }

    /// Runs all three predictors on `text`, preferring learned backends when
    /// configured and available, falling back to rule-based ones on any
    /// load or inference failure (spec §4.5). In `off` mode a dead learned
    /// backend is surfaced as `ClassificationError` instead of masked.
    /// Urgency is always rule-based (spec §4.4 names no learned variant).
    pub async fn predict(&self, text: &CanonicalText) -> Result<PredictionTriple, CoreError> {
        let category = match self.category_backend().await {
            Resolved::Learned(backend) => match backend.predict(text).await {
                Ok(result) => result,
                Err(e) if self.is_off_mode() => {
                    return Err(CoreError::classification(format!(
                        "category backend dead in off mode: {e}"
                    )))
                }
                Err(e) => {
                    mark_fallen_back(&self.category_fallen_back, "category", &e.to_string());
                    self.category_rule_based.predict(text).await.expect("rule-based is infallible")
                }
            },
            Resolved::LoadFailed(e) if self.is_off_mode() => {
                return Err(CoreError::classification(format!(
                    "category backend dead in off mode: {e}"
                )))
            }
            Resolved::LoadFailed(_) => {
                self.category_rule_based.predict(text).await.expect("rule-based is infallible")
            }
            Resolved::RuleBasedOnly => {
                self.category_rule_based.predict(text).await.expect("rule-based is infallible")
            }
        };

        let sentiment = match self.sentiment_backend().await {
            Resolved::Learned(backend) => match backend.predict(text).await {
                Ok(result) => result,
                Err(e) if self.is_off_mode() => {
                    return Err(CoreError::classification(format!(
                        "sentiment backend dead in off mode: {e}"
                    )))
                }
                Err(e) => {
                    mark_fallen_back(&self.sentiment_fallen_back, "sentiment", &e.to_string());
                    self.sentiment_rule_based.predict(text).await.expect("rule-based is infallible")
                }
            },
            Resolved::LoadFailed(e) if self.is_off_mode() => {
                return Err(CoreError::classification(format!(
                    "sentiment backend dead in off mode: {e}"
                )))
            }
            Resolved::LoadFailed(_) => {
                self.sentiment_rule_based.predict(text).await.expect("rule-based is infallible")
            }
            Resolved::RuleBasedOnly => {
                self.sentiment_rule_based.predict(text).await.expect("rule-based is infallible")
            }
        };

        let urgency = self
            .urgency_rule_based
            .predict(text)
            .await
            .expect("rule-based is infallible");

        Ok(PredictionTriple {
            category,
            sentiment,
            urgency,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalizer::normalize;

    #[tokio::test]
    async fn force_mode_never_attempts_learned_and_still_predicts() {
        let mut config = Config::default();
        config.use_rule_based = UseRuleBased::Force;
        let host = PredictorHost::new(Arc::new(config), ZeroShotModelSpec::new("/nonexistent"));
        let text = normalize("urgent billing issue", "I was charged twice, please refund").unwrap();
        let triple = host.predict(&text).await.unwrap();
        assert_eq!(triple.urgency.urgency, crate::domain::Urgency::Critical);
    }

    #[tokio::test]
    async fn off_mode_surfaces_classification_error_when_model_missing() {
        let mut config = Config::default();
        config.use_rule_based = UseRuleBased::Off;
        let host = PredictorHost::new(Arc::new(config), ZeroShotModelSpec::new("/nonexistent"));
        let text = normalize("refund please", "duplicate charge on my card").unwrap();
        let err = host.predict(&text).await.unwrap_err();
        assert!(matches!(err, CoreError::ClassificationError(_)));
    }

    #[tokio::test]
    async fn auto_mode_falls_back_and_caches_the_fallback() {
        let config = Config::default();
        let host = PredictorHost::new(Arc::new(config), ZeroShotModelSpec::new("/nonexistent"));
        let text = normalize("refund please", "duplicate charge on my card").unwrap();

        let first = host.predict(&text).await.unwrap();
        assert_eq!(first.category.category, crate::domain::Category::Billing);

        let second = host.predict(&text).await.unwrap();
        assert_eq!(second.category.category, crate::domain::Category::Billing);
    }

    #[tokio::test]
    async fn auto_mode_load_failure_sets_permanent_fallback_flag_once() {
        let config = Config::default();
        let host = PredictorHost::new(Arc::new(config), ZeroShotModelSpec::new("/nonexistent"));
        let text = normalize("refund please", "duplicate charge on my card").unwrap();

        assert!(!host.category_fallen_back.load(Ordering::SeqCst));
        host.predict(&text).await.unwrap();
        assert!(host.category_fallen_back.load(Ordering::SeqCst));

        // Repeated calls must not re-attempt the learned backend or re-flip
        // the flag; `current_mode`/`model_identifier` stay rule-based too.
        host.predict(&text).await.unwrap();
        assert!(host.category_fallen_back.load(Ordering::SeqCst));
        assert_eq!(host.current_mode(), crate::predict::Backend::RuleBased);
        assert_eq!(
            host.model_identifier(),
            "category=rule_based,sentiment=rule_based,urgency=rule_based"
        );
    }
}
