// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Cancellation, scaling, and graceful shutdown.

use crate::prelude::*;
use arkham_engine::EngineError;
use arkham_worker::FnHandler;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

#[tokio::test(start_paused = true)]
async fn cancelling_a_pending_job_is_idempotent() {
    let fx = fixture().await;

    // No handler on io-file, so the job stays queued.
    let job = fx
        .service
        .enqueue("io-file", "spec-cancel", json!({}), 1)
        .await
        .unwrap();

    assert!(fx.service.cancel_job(&job.id).await.unwrap());
    assert_eq!(fx.substrate.queue_len("io-file").await.unwrap(), 0);
    let fields = fx.substrate.job_get("spec-cancel").await.unwrap().unwrap();
    assert_eq!(fields.get("status").map(String::as_str), Some("cancelled"));

    // Repeat is a no-op success; the wait observes the cancellation.
    assert!(fx.service.cancel_job(&job.id).await.unwrap());
    let err = fx
        .service
        .wait_for_result(&job.id, Duration::from_secs(1))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::JobCancelled(_)));
}

#[tokio::test(start_paused = true)]
async fn wait_timeout_raises_but_does_not_cancel() {
    let fx = fixture().await;
    let job = fx
        .service
        .enqueue("io-file", "spec-wait", json!({}), 1)
        .await
        .unwrap();

    let err = fx
        .service
        .wait_for_result(&job.id, Duration::from_secs(1))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::WaitTimeout { .. }));

    // The job is untouched: still pending, still queued.
    let fields = fx.substrate.job_get("spec-wait").await.unwrap().unwrap();
    assert_eq!(fields.get("status").map(String::as_str), Some("pending"));
    assert_eq!(fx.substrate.queue_len("io-file").await.unwrap(), 1);
}

#[tokio::test(start_paused = true)]
async fn burst_of_enqueues_scales_exactly_once() {
    let fx = fixture().await;
    register_echo(&fx, "cpu-light");

    let mut job_ids = Vec::new();
    for i in 0..5 {
        let job = fx
            .service
            .enqueue("cpu-light", format!("burst-{i}"), json!({"msg": i}), 1)
            .await
            .unwrap();
        job_ids.push(job.id);
    }

    assert_eq!(fx.service.get_worker_count("cpu-light"), 1);
    for job_id in &job_ids {
        fx.service
            .wait_for_result(job_id, Duration::from_secs(10))
            .await
            .unwrap();
    }
    assert_eq!(fx.service.get_worker_count("cpu-light"), 1);
}

#[tokio::test(start_paused = true)]
async fn graceful_shutdown_lets_the_current_job_finish() {
    let fx = fixture().await;
    fx.service.register_worker(
        "cpu-light",
        Arc::new(FnHandler::new(|_, _| async {
            tokio::time::sleep(Duration::from_secs(2)).await;
            Ok::<Value, _>(json!({"finished": true}))
        })),
        fast_config(),
    );

    let job = fx
        .service
        .enqueue("cpu-light", "spec-grace", json!({}), 1)
        .await
        .unwrap();

    // Let the worker pick the job up, then shut the service down.
    let substrate = fx.substrate.clone();
    assert!(
        wait_until(
            move || {
                futures_util::FutureExt::now_or_never(substrate.job_get("spec-grace"))
                    .and_then(|r| r.ok())
                    .flatten()
                    .is_some_and(|f| f.get("status").map(String::as_str) == Some("active"))
            },
            2_000,
        )
        .await
    );

    fx.service.shutdown().await;

    // The in-flight job completed before the worker exited, and the worker
    // deregistered on the way out.
    let fields = fx.substrate.job_get("spec-grace").await.unwrap().unwrap();
    assert_eq!(fields.get("status").map(String::as_str), Some("completed"));
    assert!(fx.substrate.registry_scan().await.unwrap().is_empty());
    assert_eq!(fx.service.get_worker_count("cpu-light"), 0);

    // Tracker still knows the job; only the bridge is gone.
    assert!(fx.service.get_job(&job.id).is_some());
}

#[tokio::test(start_paused = true)]
async fn scale_down_stops_surplus_workers() {
    let fx = fixture().await;
    register_echo(&fx, "cpu-ner"); // max_workers: 8

    fx.service.scale("cpu-ner", 3).await.unwrap();
    assert_eq!(fx.service.get_worker_count("cpu-ner"), 3);

    let outcome = fx.service.scale("cpu-ner", 1).await.unwrap();
    assert_eq!(outcome.previous, 3);
    assert_eq!(outcome.target, 1);
    assert_eq!(fx.service.get_worker_count("cpu-ner"), 1);
}
