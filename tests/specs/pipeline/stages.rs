// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Pipeline specs: stage dispatch over real workers.

use crate::prelude::*;
use arkham_core::{PipelineContext, StageStatus};
use arkham_pipeline::PipelineCoordinator;
use arkham_worker::FnHandler;
use serde_json::{json, Value};
use std::sync::Arc;

#[tokio::test(start_paused = true)]
async fn full_pipeline_threads_context_through_stages() {
    let fx = fixture().await;

    fx.service.register_worker(
        "cpu-extract",
        Arc::new(FnHandler::new(|_, payload: Value| async move {
            assert_eq!(payload["job_type"], "ingest_file");
            Ok(json!({
                "page_count": 3,
                "page_paths": ["/p/1.png", "/p/2.png", "/p/3.png"],
                "has_text": false,
                "file_type": "document",
            }))
        })),
        fast_config(),
    );
    fx.service.register_worker(
        "gpu-paddle",
        Arc::new(FnHandler::new(|_, payload: Value| async move {
            // OCR sees the page paths ingested upstream.
            assert_eq!(payload["page_paths"].as_array().unwrap().len(), 3);
            Ok(json!({"pages_processed": 3}))
        })),
        fast_config(),
    );
    fx.service.register_worker(
        "cpu-ner",
        Arc::new(FnHandler::new(|_, _| async move {
            Ok(json!({"entities_found": 12, "entity_types": {"PERSON": 7, "ORG": 5}}))
        })),
        fast_config(),
    );
    fx.service.register_worker(
        "gpu-embed",
        Arc::new(FnHandler::new(|_, _| async move {
            Ok(json!({"chunks_embedded": 40}))
        })),
        fast_config(),
    );

    let coordinator =
        PipelineCoordinator::new(Some(fx.service.clone()), Some(fx.events.clone()));
    let context = PipelineContext::from_value(json!({
        "document_id": "doc-e2e",
        "file_path": "/tmp/case.pdf",
        "filename": "case.pdf",
    }));

    let results = coordinator.process(context, None, None).await.unwrap();

    assert_eq!(results.len(), 4);
    assert!(results["ingest"].success());
    assert_eq!(results["ingest"].output["page_count"], 3);
    assert!(results["ocr"].success());
    assert_eq!(results["ocr"].output["pages_processed"], 3);
    assert!(results["parse"].success());
    assert_eq!(results["parse"].output["entities_found"], 12);
    assert!(results["embed"].success());
    assert_eq!(results["embed"].output["chunks_embedded"], 40);
}

#[tokio::test(start_paused = true)]
async fn documents_with_text_skip_ocr() {
    let fx = fixture().await;

    fx.service.register_worker(
        "cpu-extract",
        Arc::new(FnHandler::new(|_, _| async move {
            Ok(json!({"page_count": 1, "has_text": true}))
        })),
        fast_config(),
    );

    let coordinator =
        PipelineCoordinator::new(Some(fx.service.clone()), Some(fx.events.clone()));
    let context = PipelineContext::from_value(json!({
        "document_id": "doc-text",
        "file_path": "/tmp/native.pdf",
        "filename": "native.pdf",
    }));

    let results = coordinator.process(context, None, None).await.unwrap();

    assert_eq!(results["ocr"].status, StageStatus::Skipped);
    // Downstream stages still ran.
    assert!(results["parse"].success());
    assert!(results["embed"].success());
}

#[tokio::test(start_paused = true)]
async fn missing_input_short_circuits_before_any_dispatch() {
    let fx = fixture().await;
    register_echo(&fx, "cpu-extract");

    let coordinator =
        PipelineCoordinator::new(Some(fx.service.clone()), Some(fx.events.clone()));
    let results = coordinator
        .process(PipelineContext::new(), None, None)
        .await
        .unwrap();

    assert_eq!(results.len(), 1);
    assert_eq!(results["ingest"].status, StageStatus::Failed);
    assert_eq!(results["ingest"].error.as_deref(), Some("Validation failed"));

    // No job reached any pool.
    assert!(fx.service.get_jobs(None, None, 100).is_empty());
    for pool in ["cpu-extract", "io-file", "gpu-paddle"] {
        assert_eq!(fx.substrate.queue_len(pool).await.unwrap(), 0);
    }
}
