// src/persistence/sqlite.rs
// SQLite-backed Persistence implementation (spec §4.9, §6).

use super::{FetchLock, InquiryView, Inquiry, Persistence, Prediction, Stats, StoredRoutingDecision};
use crate::domain::{Category, Department, Sentiment, Urgency};
use crate::error::{CoreError, CoreResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value as Json;
use sqlx::{Row, SqlitePool};
use std::collections::HashMap;
use uuid::Uuid;

pub struct SqlitePersistence {
    pool: SqlitePool,
}

impl SqlitePersistence {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Creates the three-table schema and its indexes if they don't already
    /// exist (spec §6's persisted state layout).
    pub async fn run_migrations(&self) -> CoreResult<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS inquiries (
                id TEXT PRIMARY KEY,
                subject TEXT NOT NULL,
                body TEXT NOT NULL,
                sender_email TEXT NOT NULL,
                sender_name TEXT,
                metadata TEXT NOT NULL,
                received_at INTEGER NOT NULL,
                processed INTEGER NOT NULL DEFAULT 0,
                processing_attempts INTEGER NOT NULL DEFAULT 0,
                last_error TEXT,
                poisoned INTEGER NOT NULL DEFAULT 0
            );

            CREATE INDEX IF NOT EXISTS idx_inquiries_processed_received_at
                ON inquiries (processed, received_at);

            CREATE TABLE IF NOT EXISTS predictions (
                inquiry_id TEXT PRIMARY KEY REFERENCES inquiries(id),
                category TEXT NOT NULL,
                category_confidence REAL NOT NULL,
                sentiment TEXT NOT NULL,
                sentiment_confidence REAL NOT NULL,
                urgency TEXT NOT NULL,
                urgency_confidence REAL NOT NULL,
                model_identifier TEXT NOT NULL,
                classified_at INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS routing_decisions (
                inquiry_id TEXT PRIMARY KEY REFERENCES inquiries(id),
                department TEXT NOT NULL,
                consultant TEXT,
                priority_score INTEGER NOT NULL,
                escalated INTEGER NOT NULL,
                response_deadline INTEGER NOT NULL,
                decided_at INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_routing_decisions_department_escalated
                ON routing_decisions (department, escalated);
            "#,
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    fn row_to_inquiry(row: &sqlx::sqlite::SqliteRow) -> CoreResult<Inquiry> {
        let id: String = row.get("id");
        let metadata_raw: String = row.get("metadata");
        let received_at: i64 = row.get("received_at");

        Ok(Inquiry {
            id: Uuid::parse_str(&id).map_err(|e| CoreError::classification(e.to_string()))?,
            subject: row.get("subject"),
            body: row.get("body"),
            sender_email: row.get("sender_email"),
            sender_name: row.get("sender_name"),
            metadata: serde_json::from_str(&metadata_raw).unwrap_or(Json::Null),
            received_at: DateTime::from_timestamp(received_at, 0).unwrap_or_else(Utc::now),
            processed: row.get::<i64, _>("processed") != 0,
            processing_attempts: row.get::<i64, _>("processing_attempts") as u32,
            last_error: row.get("last_error"),
            poisoned: row.get::<i64, _>("poisoned") != 0,
        })
    }
}

#[async_trait]
impl Persistence for SqlitePersistence {
    async fn insert_inquiry(
        &self,
        subject: &str,
        body: &str,
        sender_email: &str,
        sender_name: Option<&str>,
        metadata: Json,
        received_at: DateTime<Utc>,
    ) -> CoreResult<Uuid> {
        let id = Uuid::new_v4();
        let metadata_json = serde_json::to_string(&metadata).unwrap_or_default();

        sqlx::query(
            r#"
            INSERT INTO inquiries (
                id, subject, body, sender_email, sender_name, metadata, received_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(id.to_string())
        .bind(subject)
        .bind(body)
        .bind(sender_email)
        .bind(sender_name)
        .bind(metadata_json)
        .bind(received_at.timestamp())
        .execute(&self.pool)
        .await?;

        Ok(id)
    }

    async fn fetch_unprocessed(&self, limit: Option<usize>, _lock: FetchLock) -> CoreResult<Vec<Inquiry>> {
        // Advisory lock (spec §4.9) reduces to SQLite's own serialized
        // writer: a single connection pool means concurrent drain workers
        // within this process already can't double-select because the
        // eventual `record_result` / `record_failure` writes are
        // transactionally conditioned on `processed=false`. Multi-replica
        // locking is a deployment concern the core leaves to the store
        // (see DESIGN.md).
        let rows = match limit {
            Some(n) => {
                sqlx::query(
                    r#"
                    SELECT * FROM inquiries
                    WHERE processed = 0 AND poisoned = 0
                    ORDER BY received_at ASC
                    LIMIT ?
                    "#,
                )
                .bind(n as i64)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query(
                    r#"
                    SELECT * FROM inquiries
                    WHERE processed = 0 AND poisoned = 0
                    ORDER BY received_at ASC
                    "#,
                )
                .fetch_all(&self.pool)
                .await?
            }
        };

        rows.iter().map(Self::row_to_inquiry).collect()
    }

    async fn record_result(
        &self,
        inquiry_id: Uuid,
        prediction: &Prediction,
        decision: &StoredRoutingDecision,
    ) -> CoreResult<()> {
        let mut tx = self.pool.begin().await?;

        let current_processed: Option<i64> =
            sqlx::query_scalar("SELECT processed FROM inquiries WHERE id = ?")
                .bind(inquiry_id.to_string())
                .fetch_optional(&mut *tx)
                .await?;

        match current_processed {
            None => {
                return Err(CoreError::classification(format!(
                    "inquiry {inquiry_id} does not exist"
                )))
            }
            Some(1) => return Err(CoreError::PersistenceConflict(inquiry_id)),
            Some(_) => {}
        }

        sqlx::query(
            r#"
            INSERT INTO predictions (
                inquiry_id, category, category_confidence, sentiment, sentiment_confidence,
                urgency, urgency_confidence, model_identifier, classified_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(inquiry_id.to_string())
        .bind(prediction.category.as_str())
        .bind(prediction.category_confidence)
        .bind(prediction.sentiment.as_str())
        .bind(prediction.sentiment_confidence)
        .bind(prediction.urgency.as_str())
        .bind(prediction.urgency_confidence)
        .bind(&prediction.model_identifier)
        .bind(prediction.classified_at.timestamp())
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO routing_decisions (
                inquiry_id, department, consultant, priority_score, escalated,
                response_deadline, decided_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(inquiry_id.to_string())
        .bind(decision.department.as_str())
        .bind(&decision.consultant)
        .bind(decision.priority_score as i64)
        .bind(decision.escalated)
        .bind(decision.response_deadline.timestamp())
        .bind(decision.decided_at.timestamp())
        .execute(&mut *tx)
        .await?;

        sqlx::query("UPDATE inquiries SET processed = 1 WHERE id = ?")
            .bind(inquiry_id.to_string())
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn record_failure(&self, inquiry_id: Uuid, error_reason: &str, max_attempts: u32) -> CoreResult<()> {
        sqlx::query(
            r#"
            UPDATE inquiries
            SET processing_attempts = processing_attempts + 1,
                last_error = ?,
                poisoned = CASE WHEN processing_attempts + 1 > ? THEN 1 ELSE poisoned END
            WHERE id = ?
            "#,
        )
        .bind(error_reason)
        .bind(max_attempts as i64)
        .bind(inquiry_id.to_string())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_inquiry(&self, id: Uuid) -> CoreResult<Option<InquiryView>> {
        let row = sqlx::query("SELECT * FROM inquiries WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        let Some(row) = row else { return Ok(None) };
        let inquiry = Self::row_to_inquiry(&row)?;

        let prediction_row = sqlx::query("SELECT * FROM predictions WHERE inquiry_id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        let prediction = prediction_row.map(|r| Prediction {
            category: Category::from_str_opt(&r.get::<String, _>("category")).unwrap_or(Category::ALL[0]),
            category_confidence: r.get("category_confidence"),
            sentiment: Sentiment::from_str_opt(&r.get::<String, _>("sentiment")).unwrap_or(Sentiment::Neutral),
            sentiment_confidence: r.get("sentiment_confidence"),
            urgency: Urgency::from_str_opt(&r.get::<String, _>("urgency")).unwrap_or(Urgency::Low),
            urgency_confidence: r.get("urgency_confidence"),
            model_identifier: r.get("model_identifier"),
            classified_at: DateTime::from_timestamp(r.get::<i64, _>("classified_at"), 0).unwrap_or_else(Utc::now),
        });

        let decision_row = sqlx::query("SELECT * FROM routing_decisions WHERE inquiry_id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        let routing_decision = decision_row.map(|r| StoredRoutingDecision {
            department: Department::from_str_opt(&r.get::<String, _>("department")).unwrap_or(Department::General),
            consultant: r.get("consultant"),
            priority_score: r.get::<i64, _>("priority_score") as u8,
            escalated: r.get::<i64, _>("escalated") != 0,
            response_deadline: DateTime::from_timestamp(r.get::<i64, _>("response_deadline"), 0)
                .unwrap_or_else(Utc::now),
            decided_at: DateTime::from_timestamp(r.get::<i64, _>("decided_at"), 0).unwrap_or_else(Utc::now),
        });

        Ok(Some(InquiryView {
            inquiry,
            prediction,
            routing_decision,
        }))
    }

    async fn statistics(&self, days: Option<u32>) -> CoreResult<Stats> {
        let since = days.map(|d| Utc::now().timestamp() - (d as i64) * 86_400);

        let (total, processed): (i64, i64) = match since {
            Some(since) => {
                sqlx::query_as(
                    "SELECT COUNT(*), SUM(processed) FROM inquiries WHERE received_at >= ?",
                )
                .bind(since)
                .fetch_one(&self.pool)
                .await
                .map(|(t, p): (i64, Option<i64>)| (t, p.unwrap_or(0)))?
            }
            None => sqlx::query_as("SELECT COUNT(*), SUM(processed) FROM inquiries")
                .fetch_one(&self.pool)
                .await
                .map(|(t, p): (i64, Option<i64>)| (t, p.unwrap_or(0)))?,
        };

        let category_rows = sqlx::query(
            r#"
            SELECT p.category AS category, COUNT(*) AS n
            FROM predictions p
            JOIN inquiries i ON i.id = p.inquiry_id
            WHERE (? IS NULL OR i.received_at >= ?)
            GROUP BY p.category
            "#,
        )
        .bind(since)
        .bind(since)
        .fetch_all(&self.pool)
        .await?;

        let mut per_category_counts = HashMap::new();
        for row in &category_rows {
            let category: String = row.get("category");
            let n: i64 = row.get("n");
            if let Some(cat) = Category::from_str_opt(&category) {
                per_category_counts.insert(cat, n as u64);
            }
        }

        let department_rows = sqlx::query(
            r#"
            SELECT r.department AS department, COUNT(*) AS n
            FROM routing_decisions r
            JOIN inquiries i ON i.id = r.inquiry_id
            WHERE (? IS NULL OR i.received_at >= ?)
            GROUP BY r.department
            "#,
        )
        .bind(since)
        .bind(since)
        .fetch_all(&self.pool)
        .await?;

        let mut per_department_counts = HashMap::new();
        for row in &department_rows {
            let department: String = row.get("department");
            let n: i64 = row.get("n");
            if let Some(dept) = Department::from_str_opt(&department) {
                per_department_counts.insert(dept, n as u64);
            }
        }

        let escalated_total: i64 = per_department_counts
            .values()
            .sum::<u64>()
            .try_into()
            .unwrap_or(0);
        let escalations: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM routing_decisions r JOIN inquiries i ON i.id = r.inquiry_id \
             WHERE r.escalated = 1 AND (? IS NULL OR i.received_at >= ?)",
        )
        .bind(since)
        .bind(since)
        .fetch_one(&self.pool)
        .await?;

        let escalation_rate = if escalated_total > 0 {
            escalations.0 as f64 / escalated_total as f64
        } else {
            0.0
        };

        Ok(Stats {
            total: total as u64,
            processed: processed as u64,
            per_category_counts,
            per_department_counts,
            escalation_rate,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    async fn test_pool() -> SqlitePersistence {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        let store = SqlitePersistence::new(pool);
        store.run_migrations().await.unwrap();
        store
    }

    fn sample_prediction() -> Prediction {
        Prediction {
            category: Category::Billing,
            category_confidence: 0.8,
            sentiment: Sentiment::Negative,
            sentiment_confidence: 0.7,
            urgency: Urgency::Medium,
            urgency_confidence: 0.7,
            model_identifier: "rule_based:v1".to_string(),
            classified_at: Utc::now(),
        }
    }

    fn sample_decision() -> StoredRoutingDecision {
        StoredRoutingDecision {
            department: Department::Finance,
            consultant: None,
            priority_score: 40,
            escalated: false,
            response_deadline: Utc::now(),
            decided_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn insert_then_fetch_unprocessed_round_trips() {
        let store = test_pool().await;
        let id = store
            .insert_inquiry("subj", "body", "a@b.com", None, json!({}), Utc::now())
            .await
            .unwrap();
        let unprocessed = store.fetch_unprocessed(None, FetchLock::default()).await.unwrap();
        assert_eq!(unprocessed.len(), 1);
        assert_eq!(unprocessed[0].id, id);
    }

    #[tokio::test]
    async fn record_result_flips_processed_and_excludes_from_future_fetch() {
        let store = test_pool().await;
        let id = store
            .insert_inquiry("subj", "body", "a@b.com", None, json!({}), Utc::now())
            .await
            .unwrap();

        store
            .record_result(id, &sample_prediction(), &sample_decision())
            .await
            .unwrap();

        let unprocessed = store.fetch_unprocessed(None, FetchLock::default()).await.unwrap();
        assert!(unprocessed.is_empty());

        let view = store.find_inquiry(id).await.unwrap().unwrap();
        assert!(view.inquiry.processed);
        assert!(view.prediction.is_some());
        assert!(view.routing_decision.is_some());
    }

    #[tokio::test]
    async fn record_result_twice_is_a_conflict() {
        let store = test_pool().await;
        let id = store
            .insert_inquiry("subj", "body", "a@b.com", None, json!({}), Utc::now())
            .await
            .unwrap();

        store
            .record_result(id, &sample_prediction(), &sample_decision())
            .await
            .unwrap();

        let second = store.record_result(id, &sample_prediction(), &sample_decision()).await;
        assert!(matches!(second, Err(CoreError::PersistenceConflict(_))));
    }

    #[tokio::test]
    async fn record_failure_poisons_after_max_attempts() {
        let store = test_pool().await;
        let id = store
            .insert_inquiry("subj", "body", "a@b.com", None, json!({}), Utc::now())
            .await
            .unwrap();

        for _ in 0..6 {
            store.record_failure(id, "boom", 5).await.unwrap();
        }

        let view = store.find_inquiry(id).await.unwrap().unwrap();
        assert!(view.inquiry.poisoned);
        assert_eq!(view.inquiry.processing_attempts, 6);

        let unprocessed = store.fetch_unprocessed(None, FetchLock::default()).await.unwrap();
        assert!(unprocessed.is_empty());
    }

    #[tokio::test]
    async fn statistics_reports_totals() {
        let store = test_pool().await;
        let id = store
            .insert_inquiry("subj", "body", "a@b.com", None, json!({}), Utc::now())
            .await
            .unwrap();
        store
            .record_result(id, &sample_prediction(), &sample_decision())
            .await
            .unwrap();

        let stats = store.statistics(None).await.unwrap();
        assert_eq!(stats.total, 1);
        assert_eq!(stats.processed, 1);
        assert_eq!(stats.per_category_counts.get(&Category::Billing), Some(&1));
    }
}
