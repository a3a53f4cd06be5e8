// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! End-to-end dispatch: enqueue → auto-scale → process → event bridge.

use crate::prelude::*;
use arkham_core::event::names;
use arkham_core::{with_trace_id, JobStatus};
use arkham_events::EventFilter;
use serde_json::json;
use std::time::Duration;

#[tokio::test(start_paused = true)]
async fn enqueue_and_wait_round_trips_through_a_worker() {
    let fx = fixture().await;
    register_echo(&fx, "cpu-light");

    let result = fx
        .service
        .enqueue_and_wait(
            "cpu-light",
            json!({"msg": "hi"}),
            1,
            Some(Duration::from_secs(5)),
        )
        .await
        .unwrap();
    assert_eq!(result, json!({"echo": "hi"}));

    // One worker spawned by auto-scale; the completion event reached the
    // bus via the bridge with the worker-service source.
    assert_eq!(fx.service.get_worker_count("cpu-light"), 1);
    let events = fx.events.clone();
    assert!(
        wait_until(
            move || {
                events
                    .get_events(&EventFilter {
                        event_type: Some(names::WORKER_JOB_COMPLETED.to_string()),
                        source: Some("worker-service".to_string()),
                        ..Default::default()
                    })
                    .first()
                    .is_some_and(|e| e.payload["result"] == json!({"echo": "hi"}))
            },
            2_000,
        )
        .await
    );
}

#[tokio::test(start_paused = true)]
async fn job_hash_records_the_full_transition() {
    let fx = fixture().await;
    register_echo(&fx, "cpu-light");

    let job = fx
        .service
        .enqueue("cpu-light", "spec-job", json!({"msg": "x"}), 1)
        .await
        .unwrap();
    assert_eq!(job.status, JobStatus::Pending);

    fx.service
        .wait_for_result(&job.id, Duration::from_secs(5))
        .await
        .unwrap();

    let fields = fx.substrate.job_get("spec-job").await.unwrap().unwrap();
    assert_eq!(fields.get("status").map(String::as_str), Some("completed"));
    // Exactly one worker took the job and stamped both timestamps.
    assert!(fields.get("worker_id").is_some_and(|w| w.starts_with("cpu-light-")));
    assert!(fields.contains_key("started_at"));
    assert!(fields.contains_key("completed_at"));
}

#[tokio::test(start_paused = true)]
async fn priorities_dequeue_lowest_score_first() {
    let fx = fixture().await;

    // Seed both jobs before any worker exists, then register the handler:
    // the first poll must take the higher-priority job.
    let order: std::sync::Arc<parking_lot::Mutex<Vec<String>>> = Default::default();
    let sink = std::sync::Arc::clone(&order);

    fx.service
        .enqueue("cpu-ner", "low-prio", json!({}), 5)
        .await
        .unwrap();
    fx.service
        .enqueue("cpu-ner", "high-prio", json!({}), 1)
        .await
        .unwrap();

    fx.service.register_worker(
        "cpu-ner",
        std::sync::Arc::new(arkham_worker::FnHandler::new(move |job_id: arkham_core::JobId, _| {
            let sink = std::sync::Arc::clone(&sink);
            async move {
                sink.lock().push(job_id.to_string());
                Ok(json!({}))
            }
        })),
        fast_config(),
    );
    fx.service.scale("cpu-ner", 1).await.unwrap();

    fx.service
        .wait_for_result(&"high-prio".into(), Duration::from_secs(5))
        .await
        .unwrap();
    fx.service
        .wait_for_result(&"low-prio".into(), Duration::from_secs(5))
        .await
        .unwrap();

    assert_eq!(*order.lock(), vec!["high-prio".to_string(), "low-prio".to_string()]);
}

#[tokio::test(start_paused = true)]
async fn trace_id_flows_from_caller_to_bus_event() {
    let fx = fixture().await;
    register_echo(&fx, "cpu-light");

    let service = fx.service.clone();
    with_trace_id("trace-e2e", async move {
        service
            .enqueue_and_wait("cpu-light", json!({"msg": "t"}), 1, Some(Duration::from_secs(5)))
            .await
            .unwrap();
    })
    .await;

    let events = fx.events.clone();
    assert!(
        wait_until(
            move || {
                events
                    .get_events(&EventFilter {
                        event_type: Some(names::WORKER_JOB_COMPLETED.to_string()),
                        ..Default::default()
                    })
                    .first()
                    .is_some_and(|e| e.trace_id.as_deref() == Some("trace-e2e"))
            },
            2_000,
        )
        .await
    );
}
