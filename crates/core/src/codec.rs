// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Base64 helpers for opaque payload fields (exception messages, backtraces)

use base64::{engine::general_purpose::STANDARD as BASE64_STANDARD, Engine};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid base64: {0}")]
pub struct CodecError(String);

pub fn encode(input: &[u8]) -> String {
    BASE64_STANDARD.encode(input)
}

pub fn decode(input: &str) -> Result<Vec<u8>, CodecError> {
    BASE64_STANDARD
        .decode(input)
        .map_err(|e| CodecError(e.to_string()))
}
