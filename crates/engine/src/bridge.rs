// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Pub/sub bridge: substrate event channel → in-process event bus.
//!
//! Workers publish job lifecycle events on the shared channel; this task
//! updates the dispatcher's job tracker and re-emits each event on the bus
//! with `source = "worker-service"`. Decode errors are skipped; losing the
//! subscription triggers an exponential-backoff resubscribe, since a
//! long-running host cannot tolerate a silent bridge failure.

use crate::service::WorkerService;
use arkham_core::event::QueueEvent;
use arkham_substrate::keys;
use futures_util::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

const INITIAL_BACKOFF: Duration = Duration::from_millis(250);
const MAX_BACKOFF: Duration = Duration::from_secs(10);

/// Run the bridge until the token is cancelled.
pub async fn run(service: Arc<WorkerService>, token: CancellationToken) {
    let Some(substrate) = service.substrate() else {
        return;
    };
    let mut backoff = INITIAL_BACKOFF;

    loop {
        if token.is_cancelled() {
            return;
        }

        match substrate.subscribe(keys::EVENTS_CHANNEL).await {
            Ok(mut stream) => {
                tracing::info!("pub/sub bridge subscribed");
                backoff = INITIAL_BACKOFF;

                loop {
                    tokio::select! {
                        _ = token.cancelled() => return,
                        message = stream.next() => match message {
                            Some(raw) => handle_message(&service, &raw).await,
                            None => {
                                tracing::warn!("pub/sub stream ended, resubscribing");
                                break;
                            }
                        }
                    }
                }
            }
            Err(error) => {
                tracing::warn!(%error, "pub/sub subscribe failed");
            }
        }

        tokio::select! {
            _ = token.cancelled() => return,
            _ = tokio::time::sleep(backoff) => {}
        }
        backoff = (backoff * 2).min(MAX_BACKOFF);
    }
}

/// Decode one message, update the tracker, re-emit on the bus.
/// Malformed messages are logged and skipped.
async fn handle_message(service: &WorkerService, raw: &str) {
    let event: QueueEvent = match serde_json::from_str(raw) {
        Ok(event) => event,
        Err(error) => {
            tracing::warn!(%error, "undecodable pub/sub message");
            return;
        }
    };

    service.apply_queue_event(&event);

    let payload = event.payload();
    service
        .events()
        .emit(event.event.clone(), payload, "worker-service")
        .await;
    tracing::debug!(event = %event.event, "bridged event to bus");
}
