// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The in-process event bus.
//!
//! Subscribers register a glob pattern over event type names. Emission
//! stamps a monotonic sequence and the ambient trace id, records the event
//! in a bounded newest-first history, then delivers to a snapshot of the
//! matching subscribers. Subscriber faults are logged with the emission
//! site and never propagate back to the emitter.

use arkham_core::event::pattern_matches;
use arkham_core::trace::current_trace_id;
use arkham_core::BusEvent;
use chrono::Utc;
use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::VecDeque;
use std::future::Future;
use std::panic::{AssertUnwindSafe, Location};
use std::sync::Arc;

/// Boxed error returned by subscriber callbacks.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// A subscriber callback. Invoked in the emitter's execution context; the
/// returned future is awaited before the next subscriber is delivered.
pub type EventCallback =
    Arc<dyn Fn(BusEvent) -> BoxFuture<'static, Result<(), BoxError>> + Send + Sync>;

/// Handle identifying one subscription, for `unsubscribe`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

struct Subscription {
    id: SubscriptionId,
    pattern: String,
    callback: EventCallback,
}

/// Filter for history queries. `event_type` may contain globs.
#[derive(Debug, Clone)]
pub struct EventFilter {
    pub source: Option<String>,
    pub event_type: Option<String>,
    pub limit: usize,
    pub offset: usize,
}

impl Default for EventFilter {
    fn default() -> Self {
        Self { source: None, event_type: None, limit: 100, offset: 0 }
    }
}

impl EventFilter {
    fn matches(&self, event: &BusEvent) -> bool {
        if let Some(source) = &self.source {
            if &event.source != source {
                return false;
            }
        }
        if let Some(event_type) = &self.event_type {
            if event_type.contains('*') || event_type.contains('?') {
                if !pattern_matches(event_type, &event.event_type) {
                    return false;
                }
            } else if &event.event_type != event_type {
                return false;
            }
        }
        true
    }
}

/// Default bounded history capacity.
pub const DEFAULT_HISTORY_CAPACITY: usize = 1000;

struct BusInner {
    subscribers: Vec<Subscription>,
    history: VecDeque<BusEvent>,
    capacity: usize,
    sequence: u64,
    next_subscription: u64,
}

/// In-process event bus. Cheap to clone via `Arc`.
pub struct EventBus {
    inner: Mutex<BusInner>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_HISTORY_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(BusInner {
                subscribers: Vec::new(),
                history: VecDeque::new(),
                capacity,
                sequence: 0,
                next_subscription: 0,
            }),
        }
    }

    /// Subscribe a callback to event types matching `pattern`.
    pub fn subscribe(&self, pattern: impl Into<String>, callback: EventCallback) -> SubscriptionId {
        let mut inner = self.inner.lock();
        inner.next_subscription += 1;
        let id = SubscriptionId(inner.next_subscription);
        inner.subscribers.push(Subscription { id, pattern: pattern.into(), callback });
        id
    }

    /// Subscribe a plain async closure; wraps it into an [`EventCallback`].
    pub fn subscribe_fn<F, Fut>(&self, pattern: impl Into<String>, f: F) -> SubscriptionId
    where
        F: Fn(BusEvent) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), BoxError>> + Send + 'static,
    {
        self.subscribe(pattern, Arc::new(move |event| f(event).boxed()))
    }

    /// Remove a subscription. Returns false when the id is unknown.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut inner = self.inner.lock();
        let before = inner.subscribers.len();
        inner.subscribers.retain(|s| s.id != id);
        inner.subscribers.len() < before
    }

    /// Number of live subscriptions.
    pub fn subscription_count(&self) -> usize {
        self.inner.lock().subscribers.len()
    }

    /// Emit an event: assign the next sequence, stamp timestamp and ambient
    /// trace id, record in history, then deliver to matching subscribers.
    ///
    /// Returns the stamped event.
    #[track_caller]
    pub fn emit(
        &self,
        event_type: impl Into<String>,
        payload: Value,
        source: impl Into<String>,
    ) -> impl Future<Output = BusEvent> + '_ {
        let site = Location::caller();
        let event_type = event_type.into();
        let source = source.into();
        async move { self.emit_from(event_type, payload, source, site).await }
    }

    async fn emit_from(
        &self,
        event_type: String,
        mut payload: Value,
        source: String,
        site: &'static Location<'static>,
    ) -> BusEvent {
        // Ambient trace id wins; fall back to one carried in the payload.
        let trace_id = current_trace_id().or_else(|| {
            payload
                .get("trace_id")
                .and_then(Value::as_str)
                .map(String::from)
        });
        if let (Some(trace_id), Value::Object(map)) = (&trace_id, &mut payload) {
            map.entry("trace_id".to_string())
                .or_insert_with(|| Value::String(trace_id.clone()));
        }

        let (event, matching) = {
            let mut inner = self.inner.lock();
            inner.sequence += 1;
            let event = BusEvent {
                event_type,
                payload,
                source,
                timestamp: Utc::now(),
                sequence: inner.sequence,
                trace_id,
            };

            inner.history.push_front(event.clone());
            while inner.history.len() > inner.capacity {
                inner.history.pop_back();
            }

            // Snapshot the matching subscribers so a callback that
            // subscribes or unsubscribes does not perturb this fan-out.
            let matching: Vec<(String, EventCallback)> = inner
                .subscribers
                .iter()
                .filter(|s| pattern_matches(&s.pattern, &event.event_type))
                .map(|s| (s.pattern.clone(), Arc::clone(&s.callback)))
                .collect();
            (event, matching)
        };

        for (pattern, callback) in matching {
            let delivery = AssertUnwindSafe(callback(event.clone())).catch_unwind();
            match delivery.await {
                Ok(Ok(())) => {}
                Ok(Err(error)) => {
                    tracing::error!(
                        event_type = %event.event_type,
                        source = %event.source,
                        pattern = %pattern,
                        emitted_from = %site,
                        %error,
                        "event callback failed"
                    );
                }
                Err(_panic) => {
                    tracing::error!(
                        event_type = %event.event_type,
                        source = %event.source,
                        pattern = %pattern,
                        emitted_from = %site,
                        "event callback panicked"
                    );
                }
            }
        }

        event
    }

    /// Filtered view of history, newest first.
    pub fn get_events(&self, filter: &EventFilter) -> Vec<BusEvent> {
        let inner = self.inner.lock();
        inner
            .history
            .iter()
            .filter(|e| filter.matches(e))
            .skip(filter.offset)
            .take(filter.limit)
            .cloned()
            .collect()
    }

    /// Count of history events matching the filter (ignores limit/offset).
    pub fn event_count(&self, filter: &EventFilter) -> usize {
        let inner = self.inner.lock();
        inner.history.iter().filter(|e| filter.matches(e)).count()
    }

    /// Distinct event types seen, sorted.
    pub fn get_event_types(&self) -> Vec<String> {
        let inner = self.inner.lock();
        let mut types: Vec<String> =
            inner.history.iter().map(|e| e.event_type.clone()).collect();
        types.sort();
        types.dedup();
        types
    }

    /// Distinct event sources seen, sorted.
    pub fn get_event_sources(&self) -> Vec<String> {
        let inner = self.inner.lock();
        let mut sources: Vec<String> = inner.history.iter().map(|e| e.source.clone()).collect();
        sources.sort();
        sources.dedup();
        sources
    }

    /// Drop the history ring. Returns how many events were dropped.
    pub fn clear_history(&self) -> usize {
        let mut inner = self.inner.lock();
        let count = inner.history.len();
        inner.history.clear();
        count
    }

    /// Current history length (≤ capacity).
    pub fn history_len(&self) -> usize {
        self.inner.lock().history.len()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[path = "bus_tests.rs"]
mod tests;
