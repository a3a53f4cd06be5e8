// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Retry, dead-letter, and timeout behavior.

use crate::prelude::*;
use arkham_core::event::names;
use arkham_engine::EngineError;
use arkham_events::EventFilter;
use arkham_worker::{FnHandler, WorkerConfig};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

#[tokio::test(start_paused = true)]
async fn failing_job_exhausts_retries_and_dead_letters() {
    let fx = fixture().await;
    register_failing(&fx, "cpu-light", "handler exploded");

    let err = fx
        .service
        .enqueue_and_wait("cpu-light", json!({}), 1, Some(Duration::from_secs(30)))
        .await
        .unwrap_err();
    let EngineError::JobFailed { job_id, error } = err else {
        panic!("expected JobFailed");
    };
    assert_eq!(error, "handler exploded");

    // retry_count climbed to max_retries before the terminal failure.
    let fields = fx.substrate.job_get(&job_id).await.unwrap().unwrap();
    assert_eq!(fields.get("status").map(String::as_str), Some("failed"));
    assert_eq!(fields.get("retry_count").map(String::as_str), Some("2"));

    // The job landed on the pool's dead-letter list.
    assert_eq!(
        fx.substrate.dead_letter_all("cpu-light").await.unwrap(),
        vec![job_id.clone()]
    );

    // The terminal failure was bridged to the bus.
    let events = fx.events.clone();
    assert!(
        wait_until(
            move || {
                events.event_count(&EventFilter {
                    event_type: Some(names::WORKER_JOB_FAILED.to_string()),
                    ..Default::default()
                }) >= 1
            },
            2_000,
        )
        .await
    );
}

#[tokio::test(start_paused = true)]
async fn timed_out_handler_is_retried_then_failed() {
    let fx = fixture().await;
    fx.service.register_worker(
        "cpu-heavy",
        Arc::new(FnHandler::new(|_, _| async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok::<Value, _>(json!({}))
        })),
        WorkerConfig {
            job_timeout: Duration::from_secs(1),
            max_retries: 1,
            ..fast_config()
        },
    );

    let err = fx
        .service
        .enqueue_and_wait("cpu-heavy", json!({}), 1, Some(Duration::from_secs(30)))
        .await
        .unwrap_err();
    let EngineError::JobFailed { job_id, error } = err else {
        panic!("expected JobFailed");
    };
    assert!(error.contains("timed out"));

    let fields = fx.substrate.job_get(&job_id).await.unwrap().unwrap();
    assert_eq!(fields.get("retry_count").map(String::as_str), Some("1"));
    assert!(fields.get("error").unwrap().contains("timed out"));
}

#[tokio::test(start_paused = true)]
async fn requeues_degrade_priority_scores() {
    let fx = fixture().await;

    let attempts: Arc<parking_lot::Mutex<u32>> = Default::default();
    let counter = Arc::clone(&attempts);
    fx.service.register_worker(
        "cpu-light",
        Arc::new(FnHandler::new(move |_, _| {
            let counter = Arc::clone(&counter);
            async move {
                let mut attempts = counter.lock();
                *attempts += 1;
                if *attempts < 3 {
                    Err("transient".into())
                } else {
                    Ok(json!({"attempt": *attempts}))
                }
            }
        })),
        fast_config(),
    );

    // Two transient failures requeue with scores 10 and 11, then success.
    let result = fx
        .service
        .enqueue_and_wait("cpu-light", json!({}), 1, Some(Duration::from_secs(30)))
        .await
        .unwrap();
    assert_eq!(result, json!({"attempt": 3}));
    assert_eq!(*attempts.lock(), 3);
}
