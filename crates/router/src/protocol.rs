// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Async framing for router connections
//!
//! Frames are the array and scalar messages from [`ust_core::message`]. A
//! clean EOF before the first header byte is reported as
//! [`ProtocolError::ConnectionClosed`]; EOF anywhere else is truncation.

use std::future::Future;
use std::io;
use std::time::Duration;

use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use ust_core::message::{self, MessageError};

/// Timeout for handshake reads and reply writes
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Errors from reading or writing frames
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("connection closed")]
    ConnectionClosed,

    #[error("timed out")]
    Timeout,

    #[error("malformed message: {0}")]
    Message(#[from] MessageError),
}

async fn read_header<R: AsyncRead + Unpin>(
    reader: &mut R,
    buf: &mut [u8],
) -> Result<(), ProtocolError> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]).await? {
            0 if filled == 0 => return Err(ProtocolError::ConnectionClosed),
            0 => return Err(MessageError::Truncated.into()),
            n => filled += n,
        }
    }
    Ok(())
}

async fn read_body<R: AsyncRead + Unpin>(
    reader: &mut R,
    len: usize,
) -> Result<Vec<u8>, ProtocolError> {
    let mut body = vec![0u8; len];
    reader.read_exact(&mut body).await.map_err(|e| match e.kind() {
        io::ErrorKind::UnexpectedEof => ProtocolError::Message(MessageError::Truncated),
        _ => ProtocolError::Io(e),
    })?;
    Ok(body)
}

/// Read one array message
pub async fn read_array<R: AsyncRead + Unpin>(
    reader: &mut R,
) -> Result<Vec<String>, ProtocolError> {
    let mut header = [0u8; 2];
    read_header(reader, &mut header).await?;
    let body = read_body(reader, u16::from_be_bytes(header) as usize).await?;
    Ok(message::decode_array_body(&body)?)
}

/// Read one scalar message of at most `max_size` bytes
pub async fn read_scalar<R: AsyncRead + Unpin>(
    reader: &mut R,
    max_size: usize,
) -> Result<Vec<u8>, ProtocolError> {
    let mut header = [0u8; 4];
    read_header(reader, &mut header).await?;
    let len = u32::from_be_bytes(header) as usize;
    if len > max_size {
        return Err(MessageError::TooLarge { len, max: max_size }.into());
    }
    read_body(reader, len).await
}

/// Write one array message and flush it
pub async fn write_array<W: AsyncWrite + Unpin, S: AsRef<str>>(
    writer: &mut W,
    fields: &[S],
) -> Result<(), ProtocolError> {
    let frame = message::encode_array(fields)?;
    writer.write_all(&frame).await?;
    writer.flush().await?;
    Ok(())
}

/// Bound an I/O future by `timeout`
pub async fn with_timeout<T, F>(timeout: Duration, fut: F) -> Result<T, ProtocolError>
where
    F: Future<Output = Result<T, ProtocolError>>,
{
    tokio::time::timeout(timeout, fut)
        .await
        .map_err(|_| ProtocolError::Timeout)?
}

#[cfg(test)]
#[path = "protocol_tests.rs"]
mod tests;
