// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use serde_json::json;

#[tokio::test]
async fn fn_handler_invokes_closure() {
    let handler = FnHandler::new(|job_id: JobId, payload: serde_json::Value| async move {
        Ok(json!({"job": job_id.as_str(), "echo": payload["msg"]}))
    });

    let result = handler
        .process(&JobId::new("j-1"), json!({"msg": "hi"}))
        .await
        .unwrap();
    assert_eq!(result, json!({"job": "j-1", "echo": "hi"}));
}

#[test]
fn registry_register_and_lookup() {
    let registry = HandlerRegistry::new();
    assert!(!registry.contains("cpu-light"));
    assert!(registry.handler("cpu-light").is_none());

    registry.register(
        "cpu-light",
        Arc::new(FnHandler::new(|_, payload| async move { Ok(payload) })),
    );

    assert!(registry.contains("cpu-light"));
    assert!(registry.handler("cpu-light").is_some());
    assert_eq!(registry.pools(), vec!["cpu-light".to_string()]);
    assert_eq!(registry.config("cpu-light").unwrap().max_retries, 3);
}

#[test]
fn register_with_config_overrides() {
    let registry = HandlerRegistry::new();
    let config = WorkerConfig {
        max_retries: 1,
        ..WorkerConfig::named("SpecialWorker")
    };
    registry.register_with_config(
        "gpu-embed",
        Arc::new(FnHandler::new(|_, _| async { Ok(json!({})) })),
        config,
    );

    let stored = registry.config("gpu-embed").unwrap();
    assert_eq!(stored.name, "SpecialWorker");
    assert_eq!(stored.max_retries, 1);
}

#[test]
fn unregister_removes_entry() {
    let registry = HandlerRegistry::new();
    registry.register(
        "cpu-light",
        Arc::new(FnHandler::new(|_, _| async { Ok(json!({})) })),
    );
    assert!(registry.unregister("cpu-light"));
    assert!(!registry.unregister("cpu-light"));
    assert!(!registry.contains("cpu-light"));
}

#[test]
fn handler_error_from_str() {
    let err: HandlerError = "boom".into();
    assert_eq!(err.to_string(), "boom");
}
