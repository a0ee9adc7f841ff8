// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Blocking connection to the router

use std::io::{self, Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::os::unix::net::UnixStream;
use std::time::Duration;

use ust_core::message;
use ust_core::{Address, PROTOCOL_VERSION};

use crate::error::ClientError;

// Timeout configuration (env vars in milliseconds)
fn parse_duration_ms(var: &str) -> Option<Duration> {
    std::env::var(var)
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .map(Duration::from_millis)
}

/// Timeout for establishing a TCP connection
pub fn timeout_connect() -> Duration {
    parse_duration_ms("UST_TIMEOUT_CONNECT_MS").unwrap_or(Duration::from_secs(5))
}

/// Timeout for each read or write on an established connection
pub fn timeout_io() -> Duration {
    parse_duration_ms("UST_TIMEOUT_IO_MS").unwrap_or(Duration::from_secs(5))
}

enum Stream {
    Unix(UnixStream),
    Tcp(TcpStream),
}

impl Stream {
    fn connect(address: &Address) -> io::Result<Self> {
        match address {
            Address::Unix(path) => UnixStream::connect(path).map(Stream::Unix),
            Address::Tcp { host, port } => {
                let mut last_error = None;
                for addr in (host.as_str(), *port).to_socket_addrs()? {
                    match TcpStream::connect_timeout(&addr, timeout_connect()) {
                        Ok(stream) => {
                            stream.set_nodelay(true)?;
                            return Ok(Stream::Tcp(stream));
                        }
                        Err(e) => last_error = Some(e),
                    }
                }
                Err(last_error.unwrap_or_else(|| {
                    io::Error::new(io::ErrorKind::NotFound, format!("{host} did not resolve"))
                }))
            }
        }
    }

    fn set_timeouts(&self, timeout: Duration) -> io::Result<()> {
        match self {
            Stream::Unix(s) => {
                s.set_read_timeout(Some(timeout))?;
                s.set_write_timeout(Some(timeout))
            }
            Stream::Tcp(s) => {
                s.set_read_timeout(Some(timeout))?;
                s.set_write_timeout(Some(timeout))
            }
        }
    }
}

impl Read for Stream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Stream::Unix(s) => s.read(buf),
            Stream::Tcp(s) => s.read(buf),
        }
    }
}

impl Write for Stream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Stream::Unix(s) => s.write(buf),
            Stream::Tcp(s) => s.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Stream::Unix(s) => s.flush(),
            Stream::Tcp(s) => s.flush(),
        }
    }
}

/// An authenticated, initialized connection
pub(crate) struct Connection {
    stream: Stream,
}

impl Connection {
    /// Connect, authenticate and send `init`
    pub(crate) fn open(
        address: &Address,
        username: &str,
        password: &str,
        node_name: &str,
    ) -> Result<Self, ClientError> {
        let stream = Stream::connect(address)?;
        stream.set_timeouts(timeout_io())?;
        let mut connection = Self { stream };

        let greeting = connection.receive()?;
        if greeting.len() != 2 || greeting[0] != "version" || greeting[1] != PROTOCOL_VERSION {
            return Err(ClientError::VersionMismatch(greeting));
        }

        let mut frames = message::encode_scalar(username.as_bytes())?;
        frames.extend(message::encode_scalar(password.as_bytes())?);
        connection.write(&frames)?;
        match connection.receive()?.as_slice() {
            [status, ok] if status == "status" && ok == "ok" => {}
            _ => return Err(ClientError::AuthenticationFailed),
        }

        connection.request(&["init", node_name])?;
        Ok(connection)
    }

    /// Send a command without waiting for a reply
    pub(crate) fn send(&mut self, fields: &[&str]) -> Result<(), ClientError> {
        let frame = message::encode_array(fields)?;
        self.write(&frame)
    }

    /// Send a command followed by a scalar payload
    pub(crate) fn send_with_payload(
        &mut self,
        fields: &[&str],
        payload: &[u8],
    ) -> Result<(), ClientError> {
        let mut frames = message::encode_array(fields)?;
        frames.extend(message::encode_scalar(payload)?);
        self.write(&frames)
    }

    /// Send a command and return the fields after `status ok`
    pub(crate) fn request(&mut self, fields: &[&str]) -> Result<Vec<String>, ClientError> {
        self.send(fields)?;
        self.receive_ok()
    }

    pub(crate) fn receive_ok(&mut self) -> Result<Vec<String>, ClientError> {
        let mut reply = self.receive()?;
        if reply.len() >= 2 && reply[0] == "status" && reply[1] == "ok" {
            return Ok(reply.split_off(2));
        }
        if reply.len() >= 2 && reply[0] == "error" {
            return Err(ClientError::Rejected(reply.swap_remove(1)));
        }
        Err(ClientError::UnexpectedReply(reply))
    }

    fn receive(&mut self) -> Result<Vec<String>, ClientError> {
        message::read_array(&mut self.stream)?.ok_or(ClientError::Closed)
    }

    fn write(&mut self, data: &[u8]) -> Result<(), ClientError> {
        self.stream.write_all(data)?;
        self.stream.flush()?;
        Ok(())
    }
}
