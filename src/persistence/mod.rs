// src/persistence/mod.rs
// Persistence Interface: the durable contract for inquiries, predictions,
// and routing decisions (spec §3, §4.9).

pub mod sqlite;

use crate::domain::{Category, Department, Sentiment, Urgency};
use crate::error::CoreResult;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value as Json;
use std::collections::HashMap;
use uuid::Uuid;

/// The input entity (spec §3: Inquiry).
#[derive(Debug, Clone)]
pub struct Inquiry {
    pub id: Uuid,
    pub subject: String,
    pub body: String,
    pub sender_email: String,
    pub sender_name: Option<String>,
    pub metadata: Json,
    pub received_at: DateTime<Utc>,
    pub processed: bool,
    pub processing_attempts: u32,
    pub last_error: Option<String>,
    pub poisoned: bool,
}

/// The classifier output entity (spec §3: Prediction).
#[derive(Debug, Clone)]
pub struct Prediction {
    pub category: Category,
    pub category_confidence: f32,
    pub sentiment: Sentiment,
    pub sentiment_confidence: f32,
    pub urgency: Urgency,
    pub urgency_confidence: f32,
    pub model_identifier: String,
    pub classified_at: DateTime<Utc>,
}

/// The routing output entity (spec §3: RoutingDecision), extended with the
/// fields only persistence cares about.
#[derive(Debug, Clone)]
pub struct StoredRoutingDecision {
    pub department: Department,
    pub consultant: Option<String>,
    pub priority_score: u8,
    pub escalated: bool,
    pub response_deadline: DateTime<Utc>,
    pub decided_at: DateTime<Utc>,
}

impl From<crate::routing::RoutingDecision> for StoredRoutingDecision {
    fn from(decision: crate::routing::RoutingDecision) -> Self {
        Self {
            department: decision.department,
            consultant: decision.consultant,
            priority_score: decision.priority_score,
            escalated: decision.escalated,
            response_deadline: decision.response_deadline,
            decided_at: decision.decided_at,
        }
    }
}

/// A combined view returned by `find_inquiry` (spec §6).
#[derive(Debug, Clone)]
pub struct InquiryView {
    pub inquiry: Inquiry,
    pub prediction: Option<Prediction>,
    pub routing_decision: Option<StoredRoutingDecision>,
}

/// `statistics(days)` read model (spec §6).
#[derive(Debug, Clone, Default)]
pub struct Stats {
    pub total: u64,
    pub processed: u64,
    pub per_category_counts: HashMap<Category, u64>,
    pub per_department_counts: HashMap<Department, u64>,
    pub escalation_rate: f64,
}

/// Optional row-level advisory lock token requested by `fetch_unprocessed`
/// (spec §4.9). The sqlite implementation folds this into the same
/// transaction that marks rows in-flight; callers never need to interpret
/// its contents.
#[derive(Debug, Clone, Copy, Default)]
pub struct FetchLock {
    pub acquire: bool,
}

/// The abstract persistence capability the core depends on (spec §4.9).
/// Every mutating method is expected to be transactionally atomic; readers
/// never observe partial writes (spec §5: "ordering guarantees").
#[async_trait]
pub trait Persistence: Send + Sync {
    /// Inserts a new unprocessed inquiry, returning its assigned id.
    async fn insert_inquiry(
        &self,
        subject: &str,
        body: &str,
        sender_email: &str,
        sender_name: Option<&str>,
        metadata: Json,
        received_at: DateTime<Utc>,
    ) -> CoreResult<Uuid>;

    /// Returns up to `limit` inquiries with `processed=false AND
    /// poisoned=false`, ordered by `received_at` ascending.
    async fn fetch_unprocessed(&self, limit: Option<usize>, lock: FetchLock) -> CoreResult<Vec<Inquiry>>;

    /// Atomic write of `Prediction` + `RoutingDecision` + flip of
    /// `processed=true`. Returns `PersistenceConflict` if already processed.
    async fn record_result(
        &self,
        inquiry_id: Uuid,
        prediction: &Prediction,
        decision: &StoredRoutingDecision,
    ) -> CoreResult<()>;

    /// Increments `processing_attempts`, stores `last_error`, and sets
    /// `poisoned=true` once attempts exceed `max_attempts`.
    async fn record_failure(&self, inquiry_id: Uuid, error_reason: &str, max_attempts: u32) -> CoreResult<()>;

    async fn find_inquiry(&self, id: Uuid) -> CoreResult<Option<InquiryView>>;

    async fn statistics(&self, days: Option<u32>) -> CoreResult<Stats>;
}
