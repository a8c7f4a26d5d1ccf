// src/drain.rs
// The Batch Drain Loop (spec §4.8): fetch unprocessed inquiries under a
// mode-dependent limit, process them with bounded concurrency and a
// per-inquiry timeout, and record results or failures. Also hosts the
// scheduler that ticks this on an interval, in the teacher's
// `tasks::TaskManager` style (`examples/ConaryLabs-Mira/backend/src/tasks/mod.rs`):
// one `tokio::spawn`'d interval loop with a `JoinHandle` the caller can abort.

use crate::config::Config;
use crate::error::CoreResult;
use crate::metrics::{self, DrainSummary};
use crate::persistence::{FetchLock, Inquiry, Persistence};
use crate::pipeline;
use crate::predict::{Backend, PredictorHost};
use crate::routing::pool::ConsultantPool;
use crate::routing::rules::RoutingRules;
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio::time;
use tracing::{error, info, warn};

/// Outcome of a single drain invocation (spec §4.8 step 5).
#[derive(Debug, Clone, Copy, Default)]
pub struct DrainReport {
    pub fetched: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub skipped_inflight: u64,
    pub poisoned: u64,
    pub elapsed: Duration,
}

enum Outcome {
    Succeeded,
    Failed,
    Poisoned,
    SkippedDeadline,
}

/// Chooses `BATCH_LIMIT` per spec §4.8 step 1: unbounded for rule-based
/// drains (cheap), capped for learned drains (the resource bottleneck).
fn batch_limit_for_mode(config: &Config, mode: Backend) -> Option<usize> {
    match mode {
        Backend::RuleBased => config.batch_limit_rule_based,
        Backend::Learned => Some(config.batch_limit_learned),
    }
}

async fn process_one(
    inquiry: Inquiry,
    config: Arc<Config>,
    host: Arc<PredictorHost>,
    rules: Arc<RoutingRules>,
    pool: Arc<ConsultantPool>,
    persistence: Arc<dyn Persistence>,
    per_inquiry_timeout: Duration,
    max_attempts: u32,
    invocation_deadline: Instant,
) -> Outcome {
    if Instant::now() >= invocation_deadline {
        return Outcome::SkippedDeadline;
    }

    let id = inquiry.id;
    let started = Instant::now();

    let pipeline_result = time::timeout(
        per_inquiry_timeout,
        pipeline::run(&inquiry.subject, &inquiry.body, &config, &host, &rules, &pool),
    )
    .await;

    let result: CoreResult<_> = match pipeline_result {
        Ok(inner) => inner,
        Err(_elapsed) => {
            warn!(inquiry_id = %id, timeout_seconds = per_inquiry_timeout.as_secs(), "per-inquiry processing timed out");
            Err(crate::error::CoreError::Timeout(per_inquiry_timeout))
        }
    };

    let outcome = match result {
        Ok((prediction, decision)) => match persistence.record_result(id, &prediction, &decision).await {
            Ok(()) => Outcome::Succeeded,
            Err(crate::error::CoreError::PersistenceConflict(_)) => Outcome::Succeeded,
            Err(e) => {
                warn!(inquiry_id = %id, error = %e, "failed to record result");
                record_failure(&persistence, &inquiry, &e.to_string(), max_attempts).await
            }
        },
        Err(e) => {
            error!(inquiry_id = %id, error = %e, "per-inquiry classification/routing failed");
            record_failure(&persistence, &inquiry, &e.to_string(), max_attempts).await
        }
    };

    metrics::record_inquiry_processing_duration(started.elapsed());
    outcome
}

async fn record_failure(persistence: &Arc<dyn Persistence>, inquiry: &Inquiry, reason: &str, max_attempts: u32) -> Outcome {
    if let Err(e) = persistence.record_failure(inquiry.id, reason, max_attempts).await {
        error!(inquiry_id = %inquiry.id, error = %e, "failed to record failure (processing_attempts not advanced)");
        return Outcome::Failed;
    }
    if inquiry.processing_attempts + 1 > max_attempts {
        Outcome::Poisoned
    } else {
        Outcome::Failed
    }
}

/// One drain invocation (spec §4.8). Idempotent: running it again with no
/// new unprocessed inquiries reports `fetched=0` and changes nothing (spec
/// §8 property 7).
pub async fn drain_unprocessed(
    config: &Arc<Config>,
    host: &Arc<PredictorHost>,
    rules: &Arc<RoutingRules>,
    pool: &Arc<ConsultantPool>,
    persistence: &Arc<dyn Persistence>,
    limit_override: Option<usize>,
    batch_size_override: Option<usize>,
) -> CoreResult<DrainReport> {
    let start = Instant::now();
    let mode = host.current_mode();

    let limit = limit_override.or_else(|| batch_limit_for_mode(config, mode));
    let worker_count = batch_size_override.unwrap_or(config.drain_worker_count).max(1);
    let invocation_deadline = start + config.drain_soft_deadline;

    let inquiries = persistence
        .fetch_unprocessed(limit, FetchLock { acquire: true })
        .await?;
    let fetched = inquiries.len() as u64;

    info!(fetched, mode = mode.as_str(), limit = ?limit, workers = worker_count, "drain invocation starting");

    let persistence_arc = persistence.clone();
    let per_inquiry_timeout = config.per_inquiry_timeout;
    let max_attempts = config.max_processing_attempts;

    let outcomes: Vec<Outcome> = stream::iter(inquiries.into_iter())
        .map(|inquiry| {
            let config = config.clone();
            let host = host.clone();
            let rules = rules.clone();
            let pool = pool.clone();
            let persistence = persistence_arc.clone();
            async move {
                process_one(
                    inquiry,
                    config,
                    host,
                    rules,
                    pool,
                    persistence,
                    per_inquiry_timeout,
                    max_attempts,
                    invocation_deadline,
                )
                .await
            }
        })
        .buffer_unordered(worker_count)
        .collect()
        .await;

    let mut succeeded = 0u64;
    let mut failed = 0u64;
    let mut skipped_inflight = 0u64;
    let mut poisoned = 0u64;
    for outcome in outcomes {
        match outcome {
            Outcome::Succeeded => succeeded += 1,
            Outcome::Failed => failed += 1,
            Outcome::Poisoned => {
                failed += 1;
                poisoned += 1;
            }
            Outcome::SkippedDeadline => skipped_inflight += 1,
        }
    }

    let elapsed = start.elapsed();
    metrics::record_drain_summary(DrainSummary {
        fetched,
        succeeded,
        failed,
        skipped_inflight,
        poisoned,
    });

    info!(
        fetched, succeeded, failed, skipped_inflight, poisoned, elapsed_ms = elapsed.as_millis() as u64,
        "drain invocation complete"
    );

    Ok(DrainReport {
        fetched,
        succeeded,
        failed,
        skipped_inflight,
        poisoned,
        elapsed,
    })
}

/// Periodically ticks `drain_unprocessed` on a schedule (hourly by default,
/// spec §4.8). Mirrors the teacher's `TaskManager`: a `tokio::spawn`'d
/// interval loop whose `JoinHandle` the owner can abort for a graceful
/// shutdown.
pub struct DrainScheduler {
    handle: JoinHandle<()>,
}

impl DrainScheduler {
    /// Starts the scheduler. `interval` is typically one hour; the first
    /// tick fires after one full interval, matching
    /// `tokio::time::interval`'s default behavior.
    pub fn start(router: Arc<crate::core::InquiryRouter>, interval: Duration) -> Self {
        let handle = tokio::spawn(async move {
            let mut ticker = time::interval(interval);
            ticker.set_missed_tick_behavior(time::MissedTickBehavior::Skip);

            loop {
                ticker.tick().await;
                match router.drain_unprocessed(None, None).await {
                    Ok(report) => {
                        info!(
                            fetched = report.fetched,
                            succeeded = report.succeeded,
                            failed = report.failed,
                            poisoned = report.poisoned,
                            "scheduled drain complete"
                        );
                    }
                    Err(e) => {
                        error!(error = %e, "scheduled drain failed to run");
                    }
                }
            }
        });

        Self { handle }
    }

    /// Aborts the scheduler loop. In-flight per-inquiry work inside the
    /// current drain invocation is also aborted (spec names no guarantee of
    /// draining in-flight work on shutdown beyond "no partial writes",
    /// which `record_result`'s atomic transaction already ensures).
    pub fn shutdown(self) {
        self.handle.abort();
    }
}
