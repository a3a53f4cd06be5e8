// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Host process error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum HostError {
    #[error("configuration error: {0}")]
    Config(String),
    #[error("host already bootstrapped in this process")]
    AlreadyBootstrapped,
    #[error("port {0} is in use")]
    PortInUse(u16),
    #[error("no handler registered for pool {0}")]
    HandlerMissing(String),
    #[error(transparent)]
    Substrate(#[from] arkham_substrate::SubstrateError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
