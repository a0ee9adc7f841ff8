// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Base-36 ("hexatri") timestamp encoding
//!
//! Timestamps travel on the wire and land in sink files as lowercase base-36
//! renderings of a microsecond count. Present-day values are ten digits wide.

use thiserror::Error;

const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Errors from parsing an encoded timestamp
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TimestampError {
    #[error("timestamp is empty")]
    Empty,
    #[error("invalid base-36 digit {0:?} in timestamp")]
    InvalidDigit(char),
    #[error("timestamp overflows 64 bits")]
    Overflow,
}

/// Encode a value in lowercase base 36
pub fn encode(mut value: u64) -> String {
    if value == 0 {
        return "0".to_string();
    }
    let mut buf = Vec::with_capacity(13);
    while value > 0 {
        buf.push(DIGITS[(value % 36) as usize]);
        value /= 36;
    }
    buf.reverse();
    buf.into_iter().map(char::from).collect()
}

/// Decode a base-36 value; upper-case digits are accepted
pub fn decode(text: &str) -> Result<u64, TimestampError> {
    if text.is_empty() {
        return Err(TimestampError::Empty);
    }
    text.chars().try_fold(0u64, |acc, c| {
        let digit = c.to_digit(36).ok_or(TimestampError::InvalidDigit(c))?;
        acc.checked_mul(36)
            .and_then(|v| v.checked_add(u64::from(digit)))
            .ok_or(TimestampError::Overflow)
    })
}

#[cfg(test)]
#[path = "timestamp_tests.rs"]
mod tests;
