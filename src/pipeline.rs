// src/pipeline.rs
// The synchronous core (spec §2): normalize -> predict -> route, shared by
// the submit path (`core::InquiryRouter::classify_and_route`) and the batch
// path (`drain::drain_unprocessed`). Pure with respect to persistence - it
// never touches the store itself, so both callers stay in charge of what
// gets written and when.

use crate::config::Config;
use crate::error::CoreResult;
use crate::normalizer;
use crate::persistence::{Prediction, StoredRoutingDecision};
use crate::predict::PredictorHost;
use crate::routing::pool::ConsultantPool;
use crate::routing::rules::RoutingRules;
use crate::routing::RoutingEngine;
use chrono::Utc;

/// Runs text normalization, classification, and routing for one `(subject,
/// body)` pair, returning the records ready to persist. Never fails unless
/// normalization rejects the input or every predictor backend is dead with
/// no fallback (spec §4.1, §4.5).
pub async fn run(
    subject: &str,
    body: &str,
    config: &Config,
    host: &PredictorHost,
    rules: &RoutingRules,
    pool: &ConsultantPool,
) -> CoreResult<(Prediction, StoredRoutingDecision)> {
    let text = normalizer::normalize(subject, body)?;
    let triple = host.predict(&text).await?;

    let engine = RoutingEngine::new(config, rules, pool);
    let decided_at = Utc::now();
    let decision = engine.route(&triple, decided_at);

    let prediction = Prediction {
        category: triple.category.category,
        category_confidence: triple.category.confidence,
        sentiment: triple.sentiment.sentiment,
        sentiment_confidence: triple.sentiment.confidence,
        urgency: triple.urgency.urgency,
        urgency_confidence: triple.urgency.confidence,
        model_identifier: host.model_identifier(),
        classified_at: decided_at,
    };

    crate::metrics::record_classification(prediction.category.as_str(), &prediction.model_identifier);
    crate::metrics::record_routing_decision(decision.department.as_str(), decision.escalated);

    Ok((prediction, decision.into()))
}
