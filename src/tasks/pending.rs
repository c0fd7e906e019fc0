use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::core::state::AppState;
use crate::schemas::events::AnswerSubmissionEvent;
use crate::services::lock::LockCoordinator;
use crate::services::question_cache::QuestionCache;
use crate::tasks::consumers::{self, GradingStatus};
use crate::tasks::{DEAD_LETTER_QUEUE, PENDING_GRADING_QUEUE};

// Upper bound on entries handled per tick so a large backlog cannot keep
// one tick running past the next interval.
const DRAIN_LIMIT_PER_TICK: usize = 64;

/// An answer event parked because its grading lock was busy, with the
/// number of retry attempts already spent on it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct PendingEnvelope {
    #[serde(default)]
    pub(crate) attempts: u32,
    pub(crate) event: AnswerSubmissionEvent,
}

/// Where a still-contended entry goes after one more failed attempt.
#[derive(Debug)]
enum Redelivery {
    Requeue(PendingEnvelope),
    DeadLetter(PendingEnvelope),
}

fn next_redelivery(mut envelope: PendingEnvelope, max_attempts: u32) -> Redelivery {
    envelope.attempts += 1;
    if envelope.attempts >= max_attempts {
        Redelivery::DeadLetter(envelope)
    } else {
        Redelivery::Requeue(envelope)
    }
}

/// Park an event on the pending queue.
pub(crate) async fn defer(
    state: &AppState,
    event: &AnswerSubmissionEvent,
    attempts: u32,
) -> Result<()> {
    let envelope = PendingEnvelope { attempts, event: event.clone() };
    let json = serde_json::to_string(&envelope).context("Failed to serialize pending entry")?;
    state
        .redis()
        .queue_push(PENDING_GRADING_QUEUE, &json)
        .await
        .context("Failed to park pending entry")?;
    Ok(())
}

/// Periodically re-attempt parked events. Each tick snapshots a slice of
/// the pending queue, re-runs the locked grading path for every entry, and
/// re-parks the still-contended ones with their attempt count bumped. One
/// failed attempt per tick: a re-parked entry is never popped again until
/// the next interval, so the retry budget spans at least
/// `max_attempts * interval` of wall time before the entry is
/// dead-lettered.
pub(crate) async fn retry_loop(
    state: AppState,
    cache: QuestionCache,
    locks: LockCoordinator,
    mut shutdown: watch::Receiver<bool>,
) {
    let interval = state.settings().consumer().pending_retry_interval();
    tracing::info!(interval_seconds = interval.as_secs(), "Pending retry loop started");

    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            _ = tokio::time::sleep(interval) => {}
        }

        if let Err(err) = drain_pending(&state, &cache, &locks).await {
            tracing::error!(error = %err, "Pending retry pass failed");
        }
    }

    tracing::info!("Pending retry loop stopped");
}

async fn drain_pending(
    state: &AppState,
    cache: &QuestionCache,
    locks: &LockCoordinator,
) -> Result<()> {
    let max_attempts = state.settings().consumer().pending_max_attempts;

    // Pop the batch before processing anything; entries re-parked below
    // land behind this snapshot and wait for the next tick.
    let mut batch = Vec::new();
    while batch.len() < DRAIN_LIMIT_PER_TICK {
        match state.redis().queue_pop(PENDING_GRADING_QUEUE).await? {
            Some(payload) => batch.push(payload),
            None => break,
        }
    }

    for payload in batch {
        let envelope: PendingEnvelope = match serde_json::from_str(&payload) {
            Ok(envelope) => envelope,
            Err(err) => {
                tracing::error!(error = %err, "Malformed pending entry dropped");
                metrics::counter!("pending_retries_total", "status" => "malformed").increment(1);
                continue;
            }
        };

        match consumers::grade_event(state, cache, locks, &envelope.event).await {
            Ok(GradingStatus::Completed(total_score)) => {
                metrics::counter!("pending_retries_total", "status" => "success").increment(1);
                tracing::info!(
                    student_id = %envelope.event.student_id,
                    subject = %envelope.event.subject,
                    attempts = envelope.attempts,
                    total_score,
                    "Parked event graded on retry"
                );
            }
            Ok(GradingStatus::Deferred) => match next_redelivery(envelope, max_attempts) {
                Redelivery::Requeue(envelope) => {
                    defer(state, &envelope.event, envelope.attempts).await?;
                }
                Redelivery::DeadLetter(envelope) => {
                    let json = serde_json::to_string(&envelope)
                        .context("Failed to serialize dead-letter entry")?;
                    state.redis().queue_push(DEAD_LETTER_QUEUE, &json).await?;
                    metrics::counter!("pending_retries_total", "status" => "dead_letter")
                        .increment(1);
                    tracing::error!(
                        student_id = %envelope.event.student_id,
                        subject = %envelope.event.subject,
                        attempts = envelope.attempts,
                        "Retry budget exhausted; event dead-lettered"
                    );
                }
            },
            Err(err) => {
                metrics::counter!("pending_retries_total", "status" => "failed").increment(1);
                tracing::error!(
                    student_id = %envelope.event.student_id,
                    subject = %envelope.event.subject,
                    error = %err,
                    "Retry of parked event failed; dropping"
                );
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn envelope(attempts: u32) -> PendingEnvelope {
        PendingEnvelope {
            attempts,
            event: AnswerSubmissionEvent {
                student_id: "s1".to_string(),
                student_name: String::new(),
                subject: "math".to_string(),
                answers: Vec::new(),
                total_score: 0.0,
            },
        }
    }

    #[test]
    fn envelope_round_trips_with_attempts() {
        let payload = r#"{
            "attempts": 2,
            "event": {"student_id": "s1", "subject": "math", "answers": []}
        }"#;

        let envelope: PendingEnvelope = serde_json::from_str(payload).expect("decode");
        assert_eq!(envelope.attempts, 2);
        assert_eq!(envelope.event.student_id, "s1");

        let json = serde_json::to_string(&envelope).expect("encode");
        let back: PendingEnvelope = serde_json::from_str(&json).expect("redecode");
        assert_eq!(back.attempts, 2);
    }

    #[test]
    fn envelope_defaults_attempts_to_zero() {
        let payload = r#"{"event": {"student_id": "s1", "subject": "math"}}"#;
        let envelope: PendingEnvelope = serde_json::from_str(payload).expect("decode");
        assert_eq!(envelope.attempts, 0);
    }

    #[test]
    fn redelivery_requeues_below_the_attempt_budget() {
        match next_redelivery(envelope(0), 5) {
            Redelivery::Requeue(envelope) => assert_eq!(envelope.attempts, 1),
            other => panic!("expected requeue, got {other:?}"),
        }
        match next_redelivery(envelope(3), 5) {
            Redelivery::Requeue(envelope) => assert_eq!(envelope.attempts, 4),
            other => panic!("expected requeue, got {other:?}"),
        }
    }

    #[test]
    fn redelivery_dead_letters_once_the_budget_is_spent() {
        match next_redelivery(envelope(4), 5) {
            Redelivery::DeadLetter(envelope) => assert_eq!(envelope.attempts, 5),
            other => panic!("expected dead letter, got {other:?}"),
        }
    }
}
