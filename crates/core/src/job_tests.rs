// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use serde_json::json;

fn test_job() -> Job {
    Job::new(
        "job-1",
        "cpu-light",
        json!({"msg": "hi"}),
        1,
        Utc::now(),
    )
}

#[test]
fn new_job_is_pending() {
    let job = test_job();
    assert_eq!(job.status, JobStatus::Pending);
    assert_eq!(job.retry_count, 0);
    assert!(job.worker_id.is_none());
    assert!(job.started_at.is_none());
    assert!(!job.is_terminal());
}

#[yare::parameterized(
    pending   = { JobStatus::Pending, false },
    active    = { JobStatus::Active, false },
    completed = { JobStatus::Completed, true },
    failed    = { JobStatus::Failed, true },
    cancelled = { JobStatus::Cancelled, true },
)]
fn terminal_statuses(status: JobStatus, terminal: bool) {
    assert_eq!(status.is_terminal(), terminal);
}

#[yare::parameterized(
    pending   = { JobStatus::Pending, "pending" },
    active    = { JobStatus::Active, "active" },
    completed = { JobStatus::Completed, "completed" },
    failed    = { JobStatus::Failed, "failed" },
    cancelled = { JobStatus::Cancelled, "cancelled" },
)]
fn status_string_round_trip(status: JobStatus, s: &str) {
    assert_eq!(status.to_string(), s);
    assert_eq!(JobStatus::parse(s), Some(status));
}

#[test]
fn status_parse_rejects_unknown() {
    assert_eq!(JobStatus::parse("exploded"), None);
}

#[test]
fn fields_round_trip() {
    let mut job = test_job();
    job.status = JobStatus::Completed;
    job.started_at = Some(Utc::now());
    job.completed_at = Some(Utc::now());
    job.result = Some(json!({"echo": "hi"}));
    job.retry_count = 2;
    job.worker_id = Some(crate::worker::WorkerId::new("cpu-light-abcd1234"));

    let fields = job.to_fields();
    let back = Job::from_fields(job.id.clone(), &fields).unwrap();

    assert_eq!(back.pool, "cpu-light");
    assert_eq!(back.payload, job.payload);
    assert_eq!(back.status, JobStatus::Completed);
    assert_eq!(back.result, job.result);
    assert_eq!(back.retry_count, 2);
    assert_eq!(back.worker_id, job.worker_id);
    assert_eq!(
        back.completed_at.map(|t| t.timestamp_millis()),
        job.completed_at.map(|t| t.timestamp_millis()),
    );
}

#[test]
fn pending_job_omits_unset_fields() {
    let fields = test_job().to_fields();
    assert!(!fields.contains_key("started_at"));
    assert!(!fields.contains_key("completed_at"));
    assert!(!fields.contains_key("result"));
    assert!(!fields.contains_key("error"));
    assert!(!fields.contains_key("worker_id"));
}

#[test]
fn from_fields_requires_pool() {
    let err = Job::from_fields(JobId::new("j"), &HashMap::new()).unwrap_err();
    assert!(matches!(err, FieldError::Missing("pool")));
}

#[test]
fn from_fields_tolerates_sparse_hash() {
    let fields = HashMap::from([("pool".to_string(), "io-file".to_string())]);
    let job = Job::from_fields(JobId::new("j"), &fields).unwrap();
    assert_eq!(job.status, JobStatus::Pending);
    assert_eq!(job.priority, 1);
    assert_eq!(job.payload, serde_json::json!({}));
}

#[test]
fn from_fields_rejects_bad_payload() {
    let fields = HashMap::from([
        ("pool".to_string(), "io-file".to_string()),
        ("payload".to_string(), "{not json".to_string()),
    ]);
    let err = Job::from_fields(JobId::new("j"), &fields).unwrap_err();
    assert!(matches!(err, FieldError::Invalid { field: "payload", .. }));
}
