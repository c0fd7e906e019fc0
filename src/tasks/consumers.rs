use std::time::Duration;

use anyhow::{Context, Result};
use tokio::time::Instant;
use uuid::Uuid;

use crate::core::state::AppState;
use crate::core::time::primitive_now_utc;
use crate::repositories;
use crate::schemas::corrections::CorrectionBatch;
use crate::schemas::events::{self, AnswerSubmissionEvent};
use crate::services::corrections;
use crate::services::grading;
use crate::services::lock::{grading_lock_key, LockCoordinator, LockOutcome};
use crate::services::question_cache::QuestionCache;
use crate::services::responses;
use crate::services::student_images;
use crate::tasks::pending;

/// Terminal state of one grading attempt. `Deferred` means the per-student
/// lock stayed busy for the whole wait window and nothing was graded.
#[derive(Debug)]
pub(crate) enum GradingStatus {
    Completed(f64),
    Deferred,
}

/// Decode and grade one answer event from the inbound queue. A deferred
/// event is parked on the pending queue for the retry loop.
pub(crate) async fn handle_answer_event(
    state: &AppState,
    cache: &QuestionCache,
    locks: &LockCoordinator,
    payload: &str,
) -> Result<GradingStatus> {
    let event = events::decode_answer_event(payload)?;
    let status = grade_event(state, cache, locks, &event).await?;

    if matches!(status, GradingStatus::Deferred) {
        pending::defer(state, &event, 0).await?;
        tracing::info!(
            student_id = %event.student_id,
            subject = %event.subject,
            "Grading lock busy; event parked for retry"
        );
    }

    Ok(status)
}

/// Grade one event under the per-`(student, subject)` lock: resolve the
/// student row, load the question set through the cache, grade, and merge
/// the results into the aggregate. Shared by the live consumer and the
/// pending retry loop.
pub(crate) async fn grade_event(
    state: &AppState,
    cache: &QuestionCache,
    locks: &LockCoordinator,
    event: &AnswerSubmissionEvent,
) -> Result<GradingStatus> {
    let student = repositories::students::upsert(
        state.db(),
        &event.student_id,
        &event.student_name,
        primitive_now_utc(),
    )
    .await
    .context("Failed to resolve student")?;

    let grading_cfg = state.settings().grading();
    let key = grading_lock_key(&student.student_id, &event.subject);
    let started = Instant::now();

    let outcome = locks
        .try_with_lock(&key, grading_cfg.lock_wait(), grading_cfg.lock_lease(), || {
            grade_locked(state, cache, event, grading_cfg.confidence_threshold)
        })
        .await?;

    match outcome {
        LockOutcome::Completed(total_score) => {
            metrics::histogram!("grading_duration_seconds")
                .record(started.elapsed().as_secs_f64());
            tracing::info!(
                student_id = %event.student_id,
                subject = %event.subject,
                total_score,
                "Answers graded"
            );
            Ok(GradingStatus::Completed(total_score))
        }
        LockOutcome::NotAcquired => Ok(GradingStatus::Deferred),
    }
}

async fn grade_locked(
    state: &AppState,
    cache: &QuestionCache,
    event: &AnswerSubmissionEvent,
    confidence_threshold: f64,
) -> Result<f64> {
    let questions = cache.get_questions(state.db(), &event.subject).await?;
    let submissions = event.to_submissions();
    let outcome = grading::grade(&event.subject, &submissions, &questions, confidence_threshold);
    let total_score = outcome.total_score;

    responses::upsert_and_merge(state.db(), &event.student_id, &event.subject, outcome.graded)
        .await?;

    Ok(total_score)
}

/// Apply a batch of manual corrections. Corrections adjust existing
/// aggregates by score delta and never take the grading lock.
pub(crate) async fn handle_correction_event(
    state: &AppState,
    cache: &QuestionCache,
    payload: &str,
) -> Result<()> {
    let batch: CorrectionBatch = serde_json::from_str(payload)
        .map_err(|err| crate::services::GradingError::MalformedEvent(err.to_string()))?;

    corrections::apply_corrections(state.db(), cache, batch).await?;
    Ok(())
}

/// Drop the cached question set for an edited subject. The payload is the
/// bare subject name.
pub(crate) async fn handle_exam_update(cache: &QuestionCache, payload: &str) -> Result<()> {
    let subject = payload.trim();
    if subject.is_empty() {
        return Ok(());
    }

    cache.invalidate(subject).await?;
    tracing::info!(subject, "Question cache invalidated");
    Ok(())
}

/// Store a low-confidence image batch for manual review, one row per
/// subject, replacing any previous batch.
pub(crate) async fn handle_low_confidence_event(state: &AppState, payload: &str) -> Result<()> {
    let event = events::decode_low_confidence_event(payload)?;

    repositories::low_confidence_images::upsert_by_subject(
        state.db(),
        &Uuid::new_v4().to_string(),
        &event.subject,
        event.exam_date.as_deref(),
        &event.images,
        primitive_now_utc(),
    )
    .await
    .context("Failed to store low-confidence batch")?;

    tracing::info!(
        subject = %event.subject,
        images = event.images.len(),
        "Low-confidence image batch stored"
    );
    Ok(())
}

/// Cache and persist a batch of unattributed student-identity images.
pub(crate) async fn handle_student_id_event(state: &AppState, payload: &str) -> Result<()> {
    let event = events::decode_student_id_event(payload)?;
    let images_cfg = state.settings().images();

    student_images::store_batch(
        state.redis(),
        &images_cfg.image_dir,
        Duration::from_secs(images_cfg.student_id_cache_ttl_seconds),
        &event,
    )
    .await?;

    tracing::info!(
        subject = %event.subject,
        images = event.images.len(),
        "Student-id image batch stored"
    );
    Ok(())
}
