// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::launcher::LocalLauncher;
use arkham_events::EventFilter;
use arkham_substrate::MemorySubstrate;
use arkham_worker::FnHandler;

fn fast_worker_config() -> WorkerConfig {
    WorkerConfig {
        poll_interval: Duration::from_millis(50),
        heartbeat_interval: Duration::from_secs(1),
        idle_timeout: Duration::from_secs(60),
        job_timeout: Duration::from_secs(5),
        max_retries: 2,
        ..WorkerConfig::named("TestWorker")
    }
}

async fn service() -> (Arc<WorkerService>, MemorySubstrate, Arc<EventBus>) {
    let substrate = MemorySubstrate::new();
    let events = Arc::new(EventBus::new());
    let handlers = HandlerRegistry::new();
    let launcher = Arc::new(LocalLauncher::new(
        Arc::new(substrate.clone()),
        handlers.clone(),
    ));
    let config = ServiceConfig {
        wait_poll_interval: Duration::from_millis(50),
        stop_grace: Duration::from_secs(1),
        shutdown_grace: Duration::from_secs(5),
        ..ServiceConfig::default()
    };
    let service = Arc::new(WorkerService::new(
        config,
        Some(Arc::new(substrate.clone())),
        Arc::clone(&events),
        handlers,
        launcher,
    ));
    service.start_bridge();
    // Don't publish until the bridge is listening.
    while substrate.subscriber_count() == 0 {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
    (service, substrate, events)
}

fn register_echo(service: &WorkerService, pool: &str) {
    service.register_worker(
        pool,
        Arc::new(FnHandler::new(|_, payload: Value| async move {
            Ok(json!({"echo": payload["msg"]}))
        })),
        fast_worker_config(),
    );
}

async fn wait_until(mut cond: impl FnMut() -> bool, max_ms: u64) -> bool {
    let deadline = tokio::time::Instant::now() + Duration::from_millis(max_ms);
    loop {
        if cond() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

#[tokio::test(start_paused = true)]
async fn enqueue_rejects_unknown_pool() {
    let (service, _, _) = service().await;
    let err = service
        .enqueue("no-such-pool", "j-1", json!({}), 1)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::UnknownPool(_)));
}

#[tokio::test(start_paused = true)]
async fn happy_path_dispatch_round_trip() {
    let (service, _, events) = service().await;
    register_echo(&service, "cpu-light");

    let result = service
        .enqueue_and_wait(
            "cpu-light",
            json!({"msg": "hi"}),
            1,
            Some(Duration::from_secs(5)),
        )
        .await
        .unwrap();
    assert_eq!(result, json!({"echo": "hi"}));

    // The bridge re-emitted the completion on the bus.
    assert!(
        wait_until(
            || {
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

    // One worker was auto-spawned.
    assert_eq!(service.get_worker_count("cpu-light"), 1);
    assert!(events
        .get_events(&EventFilter {
            event_type: Some(names::WORKER_STARTED.to_string()),
            ..Default::default()
        })
        .len()
        == 1);
}

#[tokio::test(start_paused = true)]
async fn rapid_enqueues_spawn_exactly_one_worker() {
    let (service, _, _) = service().await;
    register_echo(&service, "cpu-light");

    let first = service
        .enqueue("cpu-light", "j-1", json!({"msg": "a"}), 1)
        .await
        .unwrap();
    let second = service
        .enqueue("cpu-light", "j-2", json!({"msg": "b"}), 1)
        .await
        .unwrap();
    assert_eq!(service.get_worker_count("cpu-light"), 1);

    let a = service
        .wait_for_result(&first.id, Duration::from_secs(5))
        .await
        .unwrap();
    let b = service
        .wait_for_result(&second.id, Duration::from_secs(5))
        .await
        .unwrap();
    assert_eq!(a, json!({"echo": "a"}));
    assert_eq!(b, json!({"echo": "b"}));
    assert_eq!(service.get_worker_count("cpu-light"), 1);
}

#[tokio::test(start_paused = true)]
async fn scale_clips_to_pool_cap() {
    let (service, _, events) = service().await;
    register_echo(&service, "cpu-archive"); // max_workers: 2

    let outcome = service.scale("cpu-archive", 5).await.unwrap();
    assert_eq!(outcome.target, 2);
    assert!(outcome.current <= 2);
    assert_eq!(service.get_target_count("cpu-archive"), 2);

    let scaled = events.get_events(&EventFilter {
        event_type: Some(names::WORKER_POOL_SCALED.to_string()),
        ..Default::default()
    });
    assert_eq!(scaled[0].payload["new_count"], 2);

    // Scale back down to zero stops the workers.
    let outcome = service.scale("cpu-archive", 0).await.unwrap();
    assert_eq!(outcome.target, 0);
    assert_eq!(service.get_worker_count("cpu-archive"), 0);
}

#[tokio::test(start_paused = true)]
async fn start_worker_without_handler_is_failure_result() {
    let (service, _, _) = service().await;
    let outcome = service.start_worker("cpu-light").await.unwrap();
    match outcome {
        StartOutcome::Failed { reason } => {
            assert!(reason.contains("No worker implementation"));
        }
        StartOutcome::Started { .. } => panic!("should not start without a handler"),
    }
}

#[tokio::test(start_paused = true)]
async fn cancel_pending_job_removes_from_queue() {
    let (service, substrate, events) = service().await;

    // io-db has no handler, so the job stays pending.
    let job = service.enqueue("io-db", "j-c", json!({}), 1).await.unwrap();
    assert_eq!(substrate.queue_len("io-db").await.unwrap(), 1);

    assert!(service.cancel_job(&job.id).await.unwrap());
    assert_eq!(substrate.queue_len("io-db").await.unwrap(), 0);

    let fields = substrate.job_get("j-c").await.unwrap().unwrap();
    assert_eq!(fields.get("status").map(String::as_str), Some("cancelled"));
    assert!(fields.contains_key("completed_at"));

    // Idempotent: repeated cancellation is a no-op success.
    assert!(service.cancel_job(&job.id).await.unwrap());

    let cancelled = events.get_events(&EventFilter {
        event_type: Some(names::WORKER_JOB_CANCELLED.to_string()),
        ..Default::default()
    });
    assert_eq!(cancelled.len(), 1);
    assert_eq!(cancelled[0].payload["job_id"], "j-c");
}

#[tokio::test(start_paused = true)]
async fn cancel_unknown_job_is_an_error() {
    let (service, _, _) = service().await;
    assert!(service.cancel_job(&JobId::new("ghost")).await.is_err());
}

#[tokio::test(start_paused = true)]
async fn cancel_active_job_skips_completion() {
    let (service, substrate, _) = service().await;
    service.register_worker(
        "cpu-light",
        Arc::new(FnHandler::new(|_, _| async move {
            tokio::time::sleep(Duration::from_secs(2)).await;
            Ok(json!({"done": true}))
        })),
        fast_worker_config(),
    );

    let job = service
        .enqueue("cpu-light", "j-active", json!({}), 1)
        .await
        .unwrap();

    // Let the worker pop the job, then cancel mid-flight.
    let sub = substrate.clone();
    assert!(
        wait_until(
            || {
                futures_util::FutureExt::now_or_never(sub.job_get("j-active"))
                    .and_then(|r| r.ok())
                    .flatten()
                    .and_then(|f| f.get("worker_id").cloned())
                    .is_some()
            },
            2_000,
        )
        .await
    );
    assert!(service.cancel_job(&job.id).await.unwrap());

    let err = service
        .wait_for_result(&job.id, Duration::from_secs(5))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::JobCancelled(_)));

    // The handler finished after cancellation; its write was skipped.
    tokio::time::sleep(Duration::from_secs(3)).await;
    let fields = substrate.job_get("j-active").await.unwrap().unwrap();
    assert_eq!(fields.get("status").map(String::as_str), Some("cancelled"));
    assert!(!fields.contains_key("result"));
}

#[tokio::test(start_paused = true)]
async fn wait_for_result_times_out_promptly() {
    let (service, _, _) = service().await;
    let job = service.enqueue("io-db", "j-w", json!({}), 1).await.unwrap();

    let started = tokio::time::Instant::now();
    let err = service
        .wait_for_result(&job.id, Duration::from_secs(1))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::WaitTimeout { .. }));
    // Within timeout + one poll interval.
    assert!(started.elapsed() < Duration::from_millis(1_200));
}

#[tokio::test(start_paused = true)]
async fn clear_queue_drops_pending_jobs() {
    let (service, substrate, events) = service().await;
    service.enqueue("io-db", "j-1", json!({}), 1).await.unwrap();
    service.enqueue("io-db", "j-2", json!({}), 2).await.unwrap();

    let cleared = service.clear_queue("io-db", None).await.unwrap();
    assert_eq!(cleared, 2);
    assert_eq!(substrate.queue_len("io-db").await.unwrap(), 0);
    assert!(substrate.job_get("j-1").await.unwrap().is_none());
    assert!(service.get_job(&JobId::new("j-1")).is_none());

    let event = events.get_events(&EventFilter {
        event_type: Some(names::WORKER_QUEUE_CLEARED.to_string()),
        ..Default::default()
    });
    assert_eq!(event[0].payload["count"], 2);
}

#[tokio::test(start_paused = true)]
async fn failed_jobs_can_be_retried_under_new_ids() {
    let (service, _, events) = service().await;
    service.register_worker(
        "cpu-light",
        Arc::new(FnHandler::new(|_, _| async {
            Err::<Value, _>(arkham_worker::HandlerError::new("nope"))
        })),
        fast_worker_config(), // max_retries: 2
    );

    let err = service
        .enqueue_and_wait("cpu-light", json!({"msg": "x"}), 1, Some(Duration::from_secs(30)))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::JobFailed { .. }));

    // The wait may have resolved from the substrate before the bridge
    // caught the tracker up; retry scans the tracker.
    let svc = Arc::clone(&service);
    assert!(
        wait_until(
            move || !svc.get_jobs(Some("cpu-light"), Some(JobStatus::Failed), 10).is_empty(),
            2_000,
        )
        .await
    );

    let retried = service.retry_failed_jobs("cpu-light", None).await.unwrap();
    assert_eq!(retried.len(), 1);
    let (original, new_id) = &retried[0];
    assert!(new_id.as_str().starts_with(&format!("{original}-retry-")));

    // Original dropped from tracking; replacement tracked.
    assert!(service.get_job(original).is_none());
    assert!(service.get_job(new_id).is_some());

    let event = events.get_events(&EventFilter {
        event_type: Some(names::WORKER_JOBS_RETRIED.to_string()),
        ..Default::default()
    });
    assert_eq!(event[0].payload["count"], 1);
}

#[tokio::test(start_paused = true)]
async fn stop_all_workers_empties_the_pool() {
    let (service, _, events) = service().await;
    register_echo(&service, "cpu-light");
    service.scale("cpu-light", 2).await.unwrap();
    assert_eq!(service.get_worker_count("cpu-light"), 2);

    let stopped = service.stop_all_workers(Some("cpu-light")).await.unwrap();
    assert_eq!(stopped.len(), 2);
    assert_eq!(service.get_worker_count("cpu-light"), 0);

    let stops = events.get_events(&EventFilter {
        event_type: Some(names::WORKER_STOPPED.to_string()),
        ..Default::default()
    });
    assert_eq!(stops.len(), 2);
}

#[tokio::test(start_paused = true)]
async fn degraded_mode_tracks_in_memory_only() {
    let events = Arc::new(EventBus::new());
    let handlers = HandlerRegistry::new();
    let launcher = Arc::new(LocalLauncher::new(
        Arc::new(MemorySubstrate::new()),
        handlers.clone(),
    ));
    let service = WorkerService::new(
        ServiceConfig::default(),
        None,
        events,
        handlers,
        launcher,
    );

    assert!(!service.is_available());
    let job = service
        .enqueue("cpu-light", "j-mem", json!({}), 1)
        .await
        .unwrap();
    assert_eq!(job.status, JobStatus::Pending);
    assert!(service.get_job(&job.id).is_some());
}

#[tokio::test(start_paused = true)]
async fn bridge_survives_decode_errors() {
    let (service, substrate, events) = service().await;
    let job = service.enqueue("io-db", "j-b", json!({}), 1).await.unwrap();

    substrate
        .publish(arkham_substrate::keys::EVENTS_CHANNEL, "{corrupt")
        .await
        .unwrap();

    let mut envelope = QueueEvent::new(names::WORKER_JOB_COMPLETED);
    envelope.job_id = Some("j-b".to_string());
    envelope.result = Some(json!({"ok": true}));
    substrate
        .publish(
            arkham_substrate::keys::EVENTS_CHANNEL,
            &serde_json::to_string(&envelope).unwrap(),
        )
        .await
        .unwrap();

    assert!(
        wait_until(
            || {
                service
                    .get_job(&job.id)
                    .is_some_and(|j| j.status == JobStatus::Completed)
            },
            2_000,
        )
        .await
    );
    assert_eq!(
        events.event_count(&EventFilter {
            event_type: Some(names::WORKER_JOB_COMPLETED.to_string()),
            ..Default::default()
        }),
        1
    );
}

#[tokio::test(start_paused = true)]
async fn queue_stats_combine_substrate_and_tracker() {
    let (service, _, _) = service().await;
    service.enqueue("io-db", "j-1", json!({}), 1).await.unwrap();
    service.enqueue("io-db", "j-2", json!({}), 1).await.unwrap();

    let stats = service.get_pool_stats("io-db").await.unwrap();
    assert_eq!(stats.pending, 2);
    assert_eq!(stats.active, 0);
    assert_eq!(stats.max_workers, 10);

    let all = service.get_queue_stats().await.unwrap();
    assert_eq!(all.len(), 14);
}

#[tokio::test(start_paused = true)]
async fn dequeue_pops_highest_priority_and_marks_active() {
    let (service, substrate, _) = service().await;
    service.enqueue("io-db", "j-low", json!({}), 5).await.unwrap();
    service.enqueue("io-db", "j-high", json!({}), 1).await.unwrap();

    let job = service.dequeue("io-db").await.unwrap().unwrap();
    assert_eq!(job.id, "j-high");
    assert_eq!(job.status, JobStatus::Active);
    assert!(job.started_at.is_some());

    let fields = substrate.job_get("j-high").await.unwrap().unwrap();
    assert_eq!(fields.get("status").map(String::as_str), Some("active"));

    // Second pop returns the remaining job; third finds the queue empty.
    assert_eq!(service.dequeue("io-db").await.unwrap().unwrap().id, "j-low");
    assert!(service.dequeue("io-db").await.unwrap().is_none());
}

#[tokio::test(start_paused = true)]
async fn shutdown_stops_workers_within_grace() {
    let (service, _, _) = service().await;
    register_echo(&service, "cpu-light");
    service.scale("cpu-light", 1).await.unwrap();
    assert_eq!(service.get_worker_count("cpu-light"), 1);

    service.shutdown().await;
    assert_eq!(service.get_worker_count("cpu-light"), 0);
}
