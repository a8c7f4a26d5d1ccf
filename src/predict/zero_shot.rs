// src/predict/zero_shot.rs
// Shared zero-shot entailment scorer used by the learned category and
// sentiment backends (spec §4.2, §4.3). Candidate labels are scored via the
// standard MNLI zero-shot trick: each label becomes a hypothesis
// ("This text is about {label}.") and the entailment logit against a
// premise-hypothesis pair is the label's raw score.
//
// Gated behind the `learned-backends` feature (candle + tokenizers are
// heavy, matching spec §4.2's "hundreds of MB resident").

use crate::error::ModelUnavailable;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[cfg(feature = "learned-backends")]
mod imp {
    use super::*;
    use candle_core::{DType, Device, IndexOp, Tensor};
    use candle_nn::VarBuilder;
    use candle_transformers::models::bert::{BertModel, Config as BertConfig};
    use tokenizers::Tokenizer;

    /// A loaded zero-shot entailment model: a BERT-family encoder fine-tuned
    /// on MNLI, plus its tokenizer. Immutable after load, safe to share
    /// across concurrent callers (spec §5: "predictors MUST be safe for
    /// concurrent predict calls after load").
    pub struct ZeroShotClassifier {
        model: BertModel,
        tokenizer: Tokenizer,
        device: Device,
        entailment_index: usize,
    }

    impl ZeroShotClassifier {
        pub fn load(model_dir: &Path) -> Result<Self, ModelUnavailable> {
            let config_path = model_dir.join("config.json");
            let weights_path = model_dir.join("model.safetensors");
            let tokenizer_path = model_dir.join("tokenizer.json");

            if !config_path.exists() || !weights_path.exists() || !tokenizer_path.exists() {
                return Err(ModelUnavailable::NotPresent(format!(
                    "zero-shot model files missing under {}",
                    model_dir.display()
                )));
            }

            let device = Device::Cpu;

            let config_json = std::fs::read_to_string(&config_path)
                .map_err(|e| ModelUnavailable::NotPresent(e.to_string()))?;
            let config: BertConfig = serde_json::from_str(&config_json)
                .map_err(|e| ModelUnavailable::NotPresent(e.to_string()))?;

            let tokenizer = Tokenizer::from_file(&tokenizer_path)
                .map_err(|e| ModelUnavailable::NotPresent(e.to_string()))?;

            let vb = unsafe {
                VarBuilder::from_mmaped_safetensors(&[weights_path], DType::F32, &device)
                    .map_err(|e| ModelUnavailable::OutOfMemory(e.to_string()))?
            };
            let model = BertModel::load(vb, &config)
                .map_err(|e| ModelUnavailable::OutOfMemory(e.to_string()))?;

            Ok(Self {
                model,
                tokenizer,
                device,
                entailment_index: 2, // MNLI label order: contradiction, neutral, entailment
            })
        }

        /// Scores every label as an NLI hypothesis against `premise`, returning
        /// one raw entailment logit per label in `labels` order.
        pub fn score_labels(&self, premise: &str, labels: &[&str]) -> Result<Vec<f32>, ModelUnavailable> {
            let mut scores = Vec::with_capacity(labels.len());
            for label in labels {
                let hypothesis = format!("This text is about {label}.");
                let encoding = self
                    .tokenizer
                    .encode((premise, hypothesis.as_str()), true)
                    .map_err(|e| ModelUnavailable::OutOfMemory(e.to_string()))?;

                let ids = Tensor::new(encoding.get_ids(), &self.device)
                    .and_then(|t| t.unsqueeze(0))
                    .map_err(|e| ModelUnavailable::OutOfMemory(e.to_string()))?;
                let type_ids = Tensor::new(encoding.get_type_ids(), &self.device)
                    .and_then(|t| t.unsqueeze(0))
                    .map_err(|e| ModelUnavailable::OutOfMemory(e.to_string()))?;

                let output = self
                    .model
                    .forward(&ids, &type_ids, None)
                    .map_err(|e| ModelUnavailable::OutOfMemory(e.to_string()))?;

                // Pooled [CLS] logits; entailment_index picks the "entails" class.
                let pooled = output
                    .i((.., 0))
                    .and_then(|t| t.i(self.entailment_index))
                    .and_then(|t| t.to_scalar::<f32>())
                    .map_err(|e| ModelUnavailable::OutOfMemory(e.to_string()))?;

                scores.push(pooled);
            }
            Ok(scores)
        }
    }
}

#[cfg(feature = "learned-backends")]
pub use imp::ZeroShotClassifier;

/// Stand-in used when the crate is built without `learned-backends`. Every
/// load attempt reports the model as not present, which is exactly the
/// signal that drives the predictor host's auto-mode fallback (spec §4.5).
#[cfg(not(feature = "learned-backends"))]
pub struct ZeroShotClassifier;

#[cfg(not(feature = "learned-backends"))]
impl ZeroShotClassifier {
    pub fn load(_model_dir: &Path) -> Result<Self, ModelUnavailable> {
        Err(ModelUnavailable::NotPresent(
            "built without the `learned-backends` feature".to_string(),
        ))
    }

    pub fn score_labels(&self, _premise: &str, _labels: &[&str]) -> Result<Vec<f32>, ModelUnavailable> {
        unreachable!("load() always fails without the learned-backends feature")
    }
}

/// Where on disk a zero-shot model lives, and how long loading it may take
/// before the host treats it as unavailable (spec §4.5: "load timeout").
#[derive(Debug, Clone)]
pub struct ZeroShotModelSpec {
    pub model_dir: PathBuf,
    pub load_timeout: Duration,
}

impl ZeroShotModelSpec {
    pub fn new(model_dir: impl Into<PathBuf>) -> Self {
        Self {
            model_dir: model_dir.into(),
            load_timeout: Duration::from_secs(60),
        }
    }
}
