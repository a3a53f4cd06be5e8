// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn key_formats_are_stable() {
    assert_eq!(queue("cpu-light"), "arkham:queue:cpu-light");
    assert_eq!(job("job-1"), "arkham:job:job-1");
    assert_eq!(worker("cpu-light-ab12cd34"), "arkham:worker:cpu-light-ab12cd34");
    assert_eq!(pool_workers("gpu-embed"), "arkham:pool:gpu-embed:workers");
    assert_eq!(dead_letter("cpu-light"), "arkham:dlq:cpu-light");
    assert_eq!(EVENTS_CHANNEL, "arkham:events");
}

#[test]
fn worker_prefix_matches_scan_pattern() {
    let key = worker("w-1");
    assert!(key.starts_with(WORKER_KEY_PREFIX));
    assert_eq!(key.strip_prefix(WORKER_KEY_PREFIX), Some("w-1"));
    assert_eq!(WORKER_SCAN_PATTERN, format!("{WORKER_KEY_PREFIX}*"));
}
