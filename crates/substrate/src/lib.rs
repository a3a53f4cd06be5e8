// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! arkham-substrate: Typed adapter over the external key/value queue store.
//!
//! This crate is the only component that knows the concrete substrate
//! (Redis). Everything above it works against the [`Substrate`] trait:
//! sorted-set priority queues, per-job hashes, the worker registry with TTL,
//! dead-letter lists, and the shared pub/sub event channel.

pub mod adapter;
pub mod error;
pub mod keys;
pub mod redis;

#[cfg(any(test, feature = "test-support"))]
pub mod memory;

pub use adapter::{MessageStream, Substrate};
pub use error::SubstrateError;
#[cfg(any(test, feature = "test-support"))]
pub use memory::MemorySubstrate;
pub use self::redis::RedisSubstrate;
