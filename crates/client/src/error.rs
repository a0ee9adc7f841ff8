// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Client-side failures
//!
//! These never reach callers: a failed open yields a null transaction and a
//! failed write silently disables the transaction.

use thiserror::Error;
use ust_core::MessageError;

#[derive(Debug, Error)]
pub(crate) enum ClientError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Protocol error: {0}")]
    Message(#[from] MessageError),

    #[error("connection closed by router")]
    Closed,

    #[error("router speaks protocol {0:?}")]
    VersionMismatch(Vec<String>),

    #[error("router rejected credentials")]
    AuthenticationFailed,

    #[error("router rejected command: {0}")]
    Rejected(String),

    #[error("unexpected reply {0:?}")]
    UnexpectedReply(Vec<String>),
}

impl ClientError {
    /// Whether the router could not be reached or the connection broke
    ///
    /// These start the reconnect backoff; a rejected command does not.
    pub(crate) fn is_transport_failure(&self) -> bool {
        !matches!(self, ClientError::Rejected(_))
    }
}
