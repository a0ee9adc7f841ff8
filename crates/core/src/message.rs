// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Wire framing shared by the router and its clients
//!
//! Two frame kinds travel on a connection:
//! - array messages: 2-byte big-endian body length, then each field followed
//!   by a NUL byte
//! - scalar messages: 4-byte big-endian length, then raw bytes
//!
//! Blocking read/write helpers live here for the client; the router has async
//! equivalents built on the same encode/decode functions.

use std::io::{self, Read, Write};

use thiserror::Error;

/// Largest array message body
pub const MAX_ARRAY_BODY: usize = u16::MAX as usize;

/// Errors from encoding or decoding frames
#[derive(Debug, Error)]
pub enum MessageError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("connection closed mid-message")]
    Truncated,

    #[error("message of {len} bytes exceeds limit of {max}")]
    TooLarge { len: usize, max: usize },

    #[error("field contains a NUL byte")]
    NulInField,

    #[error("array message body is not NUL-terminated")]
    Unterminated,

    #[error("array message is not valid UTF-8")]
    InvalidUtf8,
}

/// Encode an array message including its length header
pub fn encode_array<S: AsRef<str>>(fields: &[S]) -> Result<Vec<u8>, MessageError> {
    let body_len: usize = fields.iter().map(|f| f.as_ref().len() + 1).sum();
    if body_len > MAX_ARRAY_BODY {
        return Err(MessageError::TooLarge {
            len: body_len,
            max: MAX_ARRAY_BODY,
        });
    }
    let mut out = Vec::with_capacity(2 + body_len);
    out.extend_from_slice(&(body_len as u16).to_be_bytes());
    for field in fields {
        let field = field.as_ref();
        if field.contains('\0') {
            return Err(MessageError::NulInField);
        }
        out.extend_from_slice(field.as_bytes());
        out.push(0);
    }
    Ok(out)
}

/// Decode an array message body (without the length header)
pub fn decode_array_body(body: &[u8]) -> Result<Vec<String>, MessageError> {
    if body.is_empty() {
        return Ok(Vec::new());
    }
    let body = body.strip_suffix(&[0]).ok_or(MessageError::Unterminated)?;
    body.split(|b| *b == 0)
        .map(|field| {
            std::str::from_utf8(field)
                .map(str::to_string)
                .map_err(|_| MessageError::InvalidUtf8)
        })
        .collect()
}

/// Encode a scalar message including its length header
pub fn encode_scalar(data: &[u8]) -> Result<Vec<u8>, MessageError> {
    let len = u32::try_from(data.len()).map_err(|_| MessageError::TooLarge {
        len: data.len(),
        max: u32::MAX as usize,
    })?;
    let mut out = Vec::with_capacity(4 + data.len());
    out.extend_from_slice(&len.to_be_bytes());
    out.extend_from_slice(data);
    Ok(out)
}

/// Fill `buf`, returning `false` on a clean EOF before the first byte
fn read_header<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<bool, MessageError> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) if filled == 0 => return Ok(false),
            Ok(0) => return Err(MessageError::Truncated),
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e.into()),
        }
    }
    Ok(true)
}

fn read_body<R: Read>(reader: &mut R, len: usize) -> Result<Vec<u8>, MessageError> {
    let mut body = vec![0u8; len];
    reader.read_exact(&mut body).map_err(|e| match e.kind() {
        io::ErrorKind::UnexpectedEof => MessageError::Truncated,
        _ => MessageError::Io(e),
    })?;
    Ok(body)
}

/// Read one array message; `None` when the peer closed the connection
pub fn read_array<R: Read>(reader: &mut R) -> Result<Option<Vec<String>>, MessageError> {
    let mut header = [0u8; 2];
    if !read_header(reader, &mut header)? {
        return Ok(None);
    }
    let body = read_body(reader, u16::from_be_bytes(header) as usize)?;
    decode_array_body(&body).map(Some)
}

pub fn write_array<W: Write, S: AsRef<str>>(
    writer: &mut W,
    fields: &[S],
) -> Result<(), MessageError> {
    writer.write_all(&encode_array(fields)?)?;
    Ok(())
}

/// Read one scalar message; `None` when the peer closed the connection
pub fn read_scalar<R: Read>(
    reader: &mut R,
    max_size: usize,
) -> Result<Option<Vec<u8>>, MessageError> {
    let mut header = [0u8; 4];
    if !read_header(reader, &mut header)? {
        return Ok(None);
    }
    let len = u32::from_be_bytes(header) as usize;
    if len > max_size {
        return Err(MessageError::TooLarge { len, max: max_size });
    }
    read_body(reader, len).map(Some)
}

pub fn write_scalar<W: Write>(writer: &mut W, data: &[u8]) -> Result<(), MessageError> {
    writer.write_all(&encode_scalar(data)?)?;
    Ok(())
}

#[cfg(test)]
#[path = "message_tests.rs"]
mod tests;
