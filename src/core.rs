// src/core.rs
// The four contracts spec §6 promises external collaborators:
// `classify_and_route`, `classify_text`, `drain_unprocessed`, and
// `find_inquiry`/`statistics`. `InquiryRouter` is the single composition
// root a hosting binary constructs once and shares across requests.

use crate::config::Config;
use crate::domain::{Category, Sentiment, Urgency};
use crate::drain::{self, DrainReport};
use crate::error::{CoreError, CoreResult};
use crate::persistence::{InquiryView, Persistence, Prediction, Stats};
use crate::pipeline;
use crate::predict::PredictorHost;
use crate::routing::pool::ConsultantPool;
use crate::routing::rules::RoutingRules;
use crate::routing::RoutingDecision;
use chrono::Utc;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value as Json;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

static EMAIL_SHAPE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9._%+\-]+@[A-Za-z0-9.\-]+\.[A-Za-z]{2,}$").unwrap());

fn validate_email(email: &str) -> CoreResult<()> {
    if EMAIL_SHAPE.is_match(email) {
        Ok(())
    } else {
        Err(CoreError::invalid_input(format!(
            "sender_email {email:?} is not a valid email address"
        )))
    }
}

/// `classify_text`'s result shape (spec §6: "Prediction-shaped result
/// without persisting"). `all_scores` fields are populated only when the
/// caller asks for them - they exist mainly for test/debug callers
/// inspecting the full distribution, not the common case.
#[derive(Debug, Clone)]
pub struct ClassificationOutcome {
    pub category: Category,
    pub category_confidence: f32,
    pub category_all_scores: Option<HashMap<Category, f32>>,
    pub sentiment: Sentiment,
    pub sentiment_confidence: f32,
    pub sentiment_all_scores: Option<HashMap<Sentiment, f32>>,
    pub urgency: Urgency,
    pub urgency_confidence: f32,
    pub urgency_all_scores: Option<HashMap<Urgency, f32>>,
    pub model_identifier: String,
}

/// Composition root for the classification + routing core. Owns (via `Arc`)
/// every collaborator named in spec §2: the Predictor Host, the Routing
/// Engine's rules and Consultant Pool, and the Persistence Interface.
/// Cheap to clone; hand one `Arc<InquiryRouter>` to both the HTTP layer and
/// the batch scheduler.
pub struct InquiryRouter {
    config: Arc<Config>,
    host: Arc<PredictorHost>,
    rules: Arc<RoutingRules>,
    pool: Arc<ConsultantPool>,
    persistence: Arc<dyn Persistence>,
}

impl InquiryRouter {
    pub fn new(
        config: Arc<Config>,
        host: Arc<PredictorHost>,
        rules: Arc<RoutingRules>,
        pool: Arc<ConsultantPool>,
        persistence: Arc<dyn Persistence>,
    ) -> Self {
        Self {
            config,
            host,
            rules,
            pool,
            persistence,
        }
    }

    /// Classifies `subject`/`body` without touching persistence (spec §6:
    /// "For test/debug entry points"). Never routes - this is the
    /// classification pipeline alone, used as a pure unit-test oracle.
    pub async fn classify_text(
        &self,
        subject: &str,
        body: &str,
        include_all_scores: bool,
    ) -> CoreResult<ClassificationOutcome> {
        let text = crate::normalizer::normalize(subject, body)?;
        let triple = self.host.predict(&text).await?;

        Ok(ClassificationOutcome {
            category: triple.category.category,
            category_confidence: triple.category.confidence,
            category_all_scores: include_all_scores.then(|| triple.category.all_scores.clone()),
            sentiment: triple.sentiment.sentiment,
            sentiment_confidence: triple.sentiment.confidence,
            sentiment_all_scores: include_all_scores.then(|| triple.sentiment.all_scores.clone()),
            urgency: triple.urgency.urgency,
            urgency_confidence: triple.urgency.confidence,
            urgency_all_scores: include_all_scores.then(|| triple.urgency.all_scores.clone()),
            model_identifier: self.host.model_identifier(),
        })
    }

    /// The synchronous submit path (spec §6): normalizes, classifies,
    /// routes, and persists all three records atomically.
    ///
    /// Persistence ordering follows spec §7's "never half a result"
    /// guarantee: the inquiry row is inserted first (`processed=false`), so
    /// if classification or routing then fails, the inquiry is left intact
    /// for the drain loop to retry rather than vanishing or persisting a
    /// partial result.
    pub async fn classify_and_route(
        &self,
        subject: &str,
        body: &str,
        sender_email: &str,
        sender_name: Option<&str>,
        metadata: Option<Json>,
    ) -> CoreResult<(Uuid, Prediction, RoutingDecision)> {
        if subject.trim().is_empty() && body.trim().is_empty() {
            return Err(CoreError::invalid_input("subject and body cannot both be empty"));
        }
        validate_email(sender_email)?;

        let inquiry_id = self
            .persistence
            .insert_inquiry(
                subject,
                body,
                sender_email,
                sender_name,
                metadata.unwrap_or(Json::Object(Default::default())),
                Utc::now(),
            )
            .await?;

        let (prediction, stored_decision) =
            pipeline::run(subject, body, &self.config, &self.host, &self.rules, &self.pool).await?;

        match self
            .persistence
            .record_result(inquiry_id, &prediction, &stored_decision)
            .await
        {
            Ok(()) | Err(CoreError::PersistenceConflict(_)) => {}
            Err(e) => return Err(e),
        }

        let decision = RoutingDecision {
            department: stored_decision.department,
            consultant: stored_decision.consultant,
            priority_score: stored_decision.priority_score,
            escalated: stored_decision.escalated,
            response_deadline: stored_decision.response_deadline,
            decided_at: stored_decision.decided_at,
        };

        Ok((inquiry_id, prediction, decision))
    }

    /// The batch path's entry point (spec §6, §4.8).
    pub async fn drain_unprocessed(&self, limit: Option<usize>, batch_size: Option<usize>) -> CoreResult<DrainReport> {
        drain::drain_unprocessed(
            &self.config,
            &self.host,
            &self.rules,
            &self.pool,
            &self.persistence,
            limit,
            batch_size,
        )
        .await
    }

    pub async fn find_inquiry(&self, id: Uuid) -> CoreResult<Option<InquiryView>> {
        self.persistence.find_inquiry(id).await
    }

    pub async fn statistics(&self, days: Option<u32>) -> CoreResult<Stats> {
        self.persistence.statistics(days).await
    }
}
