// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[tokio::test]
async fn trace_id_visible_inside_scope() {
    assert_eq!(current_trace_id(), None);

    with_trace_id("trace-abc", async {
        assert_eq!(current_trace_id().as_deref(), Some("trace-abc"));
    })
    .await;

    assert_eq!(current_trace_id(), None);
}

#[tokio::test]
async fn nested_scopes_shadow() {
    with_trace_id("outer", async {
        with_trace_id("inner", async {
            assert_eq!(current_trace_id().as_deref(), Some("inner"));
        })
        .await;
        assert_eq!(current_trace_id().as_deref(), Some("outer"));
    })
    .await;
}

#[tokio::test]
async fn spawned_tasks_do_not_inherit() {
    with_trace_id("outer", async {
        let handle = tokio::spawn(async { current_trace_id() });
        assert_eq!(handle.await.unwrap(), None);
    })
    .await;
}
