// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! arkham-events: In-process publish/subscribe with pattern matching.

pub mod bus;

pub use bus::{BoxError, EventBus, EventCallback, EventFilter, SubscriptionId};
