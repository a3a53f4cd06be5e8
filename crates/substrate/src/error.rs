// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Substrate error types.

use thiserror::Error;

/// Errors surfaced by substrate operations.
#[derive(Debug, Error)]
pub enum SubstrateError {
    /// The substrate cannot be reached. Callers may degrade to in-process
    /// tracking or surface the error.
    #[error("substrate unavailable: {0}")]
    Unavailable(String),
    /// The substrate answered with something we could not interpret.
    #[error("substrate protocol error: {0}")]
    Protocol(String),
    /// The pub/sub subscription ended.
    #[error("subscription closed: {0}")]
    SubscriptionClosed(String),
}

impl From<redis::RedisError> for SubstrateError {
    fn from(err: redis::RedisError) -> Self {
        if err.is_io_error() || err.is_connection_refusal() || err.is_connection_dropped() {
            SubstrateError::Unavailable(err.to_string())
        } else {
            SubstrateError::Protocol(err.to_string())
        }
    }
}
