use anyhow::Result;
use tokio::sync::watch;

use crate::core::shutdown::shutdown_signal;
use crate::core::state::AppState;
use crate::services::lock::LockCoordinator;
use crate::services::question_cache::QuestionCache;
use crate::tasks::consumers::{self, GradingStatus};
use crate::tasks::{
    pending, ANSWER_EVENTS_QUEUE, CORRECTIONS_QUEUE, EXAM_UPDATES_QUEUE,
    LOW_CONFIDENCE_IMAGES_QUEUE, STUDENT_ID_IMAGES_QUEUE,
};

/// Spawn all consumer loops and block until a shutdown signal, then wind
/// them down through the shared watch channel.
pub(crate) async fn run(state: AppState) -> Result<()> {
    let cache =
        QuestionCache::new(state.redis().clone(), state.settings().grading().question_cache_ttl());
    let locks = LockCoordinator::new(state.redis().clone());

    let health = state.redis().health().await;
    tracing::info!(redis = ?health, "Starting consumers");

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let mut workers = Vec::with_capacity(6);
    workers.push(tokio::spawn(answer_loop(
        state.clone(),
        cache.clone(),
        locks.clone(),
        shutdown_rx.clone(),
    )));
    workers.push(tokio::spawn(low_confidence_loop(state.clone(), shutdown_rx.clone())));
    workers.push(tokio::spawn(student_id_loop(state.clone(), shutdown_rx.clone())));
    workers.push(tokio::spawn(correction_loop(state.clone(), cache.clone(), shutdown_rx.clone())));
    workers.push(tokio::spawn(exam_update_loop(
        state.clone(),
        cache.clone(),
        shutdown_rx.clone(),
    )));
    workers.push(tokio::spawn(pending::retry_loop(state.clone(), cache, locks, shutdown_rx)));

    shutdown_signal().await;
    tracing::info!("Shutdown signal received; stopping consumers");

    if shutdown_tx.send(true).is_err() {
        tracing::warn!("All consumers already stopped");
    }

    for worker in workers {
        if let Err(err) = worker.await {
            tracing::error!(error = %err, "Consumer task panicked");
        }
    }

    tracing::info!("All consumers stopped");
    Ok(())
}

async fn answer_loop(
    state: AppState,
    cache: QuestionCache,
    locks: LockCoordinator,
    mut shutdown: watch::Receiver<bool>,
) {
    let poll = state.settings().consumer().poll_interval();
    tracing::info!(queue = ANSWER_EVENTS_QUEUE, "Answer consumer started");

    loop {
        if *shutdown.borrow() {
            break;
        }

        match state.redis().queue_pop(ANSWER_EVENTS_QUEUE).await {
            Ok(Some(payload)) => {
                match consumers::handle_answer_event(&state, &cache, &locks, &payload).await {
                    Ok(GradingStatus::Completed(_)) => {
                        metrics::counter!("grading_events_total", "status" => "success")
                            .increment(1);
                    }
                    Ok(GradingStatus::Deferred) => {
                        metrics::counter!("grading_events_total", "status" => "deferred")
                            .increment(1);
                    }
                    Err(err) => {
                        metrics::counter!("grading_events_total", "status" => "failed")
                            .increment(1);
                        tracing::error!(error = %err, "Answer event failed");
                    }
                }
                continue;
            }
            Ok(None) => {}
            Err(err) => {
                tracing::error!(error = %err, "Failed to poll answer queue");
            }
        }

        tokio::select! {
            _ = shutdown.changed() => break,
            _ = tokio::time::sleep(poll) => {}
        }
    }

    tracing::info!("Answer consumer stopped");
}

async fn low_confidence_loop(state: AppState, mut shutdown: watch::Receiver<bool>) {
    let poll = state.settings().consumer().poll_interval();
    tracing::info!(queue = LOW_CONFIDENCE_IMAGES_QUEUE, "Low-confidence image consumer started");

    loop {
        if *shutdown.borrow() {
            break;
        }

        match state.redis().queue_pop(LOW_CONFIDENCE_IMAGES_QUEUE).await {
            Ok(Some(payload)) => {
                if let Err(err) = consumers::handle_low_confidence_event(&state, &payload).await {
                    tracing::error!(error = %err, "Low-confidence image event failed");
                }
                continue;
            }
            Ok(None) => {}
            Err(err) => {
                tracing::error!(error = %err, "Failed to poll low-confidence image queue");
            }
        }

        tokio::select! {
            _ = shutdown.changed() => break,
            _ = tokio::time::sleep(poll) => {}
        }
    }

    tracing::info!("Low-confidence image consumer stopped");
}

async fn correction_loop(
    state: AppState,
    cache: QuestionCache,
    mut shutdown: watch::Receiver<bool>,
) {
    let poll = state.settings().consumer().poll_interval();
    tracing::info!(queue = CORRECTIONS_QUEUE, "Correction consumer started");

    loop {
        if *shutdown.borrow() {
            break;
        }

        match state.redis().queue_pop(CORRECTIONS_QUEUE).await {
            Ok(Some(payload)) => {
                if let Err(err) =
                    consumers::handle_correction_event(&state, &cache, &payload).await
                {
                    tracing::error!(error = %err, "Correction batch failed");
                }
                continue;
            }
            Ok(None) => {}
            Err(err) => {
                tracing::error!(error = %err, "Failed to poll correction queue");
            }
        }

        tokio::select! {
            _ = shutdown.changed() => break,
            _ = tokio::time::sleep(poll) => {}
        }
    }

    tracing::info!("Correction consumer stopped");
}

async fn exam_update_loop(
    state: AppState,
    cache: QuestionCache,
    mut shutdown: watch::Receiver<bool>,
) {
    let poll = state.settings().consumer().poll_interval();
    tracing::info!(queue = EXAM_UPDATES_QUEUE, "Exam update consumer started");

    loop {
        if *shutdown.borrow() {
            break;
        }

        match state.redis().queue_pop(EXAM_UPDATES_QUEUE).await {
            Ok(Some(payload)) => {
                if let Err(err) = consumers::handle_exam_update(&cache, &payload).await {
                    tracing::error!(error = %err, "Exam update failed");
                }
                continue;
            }
            Ok(None) => {}
            Err(err) => {
                tracing::error!(error = %err, "Failed to poll exam update queue");
            }
        }

        tokio::select! {
            _ = shutdown.changed() => break,
            _ = tokio::time::sleep(poll) => {}
        }
    }

    tracing::info!("Exam update consumer stopped");
}

async fn student_id_loop(state: AppState, mut shutdown: watch::Receiver<bool>) {
    let poll = state.settings().consumer().poll_interval();
    tracing::info!(queue = STUDENT_ID_IMAGES_QUEUE, "Student-id image consumer started");

    loop {
        if *shutdown.borrow() {
            break;
        }

        match state.redis().queue_pop(STUDENT_ID_IMAGES_QUEUE).await {
            Ok(Some(payload)) => {
                if let Err(err) = consumers::handle_student_id_event(&state, &payload).await {
                    tracing::error!(error = %err, "Student-id image event failed");
                }
                continue;
            }
            Ok(None) => {}
            Err(err) => {
                tracing::error!(error = %err, "Failed to poll student-id image queue");
            }
        }

        tokio::select! {
            _ = shutdown.changed() => break,
            _ = tokio::time::sleep(poll) => {}
        }
    }

    tracing::info!("Student-id image consumer stopped");
}
